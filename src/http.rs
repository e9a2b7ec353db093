//! HTTP client wrapper for talking to OAI-PMH providers.

use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::Result;

/// User agent string identifying this harvester.
const USER_AGENT: &str = concat!("oai-harvester/", env!("CARGO_PKG_VERSION"));

/// Create a configured HTTP client.
///
/// # Arguments
/// * `timeout` - Per-request timeout; OAI providers can take minutes to
///   materialize a large page
///
/// # Returns
/// A `reqwest::blocking::Client` configured with the timeout and user agent.
pub fn create_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Fetch one OAI-PMH response body.
///
/// Transport failures and non-success statuses return an error without
/// retrying: a failed page aborts the run, and the scheduler's next tick
/// is the retry.
///
/// # Arguments
/// * `client` - HTTP client to use
/// * `url` - Full request URL including verb and arguments
///
/// # Returns
/// The response body as text.
pub fn fetch_xml(client: &Client, url: &str) -> Result<String> {
    tracing::debug!(url, "Requesting");
    let response = client.get(url).send()?.error_for_status()?;
    let body = response.text()?;
    tracing::debug!(bytes = body.len(), "Response received");
    Ok(body)
}
