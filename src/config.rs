//! Configuration constants and validation functions for the harvester.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use url::Url;

use crate::error::{HarvesterError, Result};

/// Default HTTP timeout for provider requests.
///
/// OAI providers can take minutes to materialize a large page, so this is
/// deliberately generous. Each scheduled job may override it.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(180);

/// Number of zip archives retained per job, newest first.
pub const ZIP_BACKUP_DEPTH: usize = 3;

/// Record count at which a job is flagged for operator attention.
///
/// A provider that returns this many records in one run is likely larger
/// than the harvester was tuned for.
pub const RECORD_COUNT_WARN_CEILING: usize = 30_000;

/// 24-hour run-at time pattern: H:MM or HH:MM.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static RUN_AT_TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]?\d|2[0-3]):([0-5]\d)$").expect("valid regex"));

/// Validate and parse a provider base URL.
///
/// # Returns
/// * `Ok(Url)` if the URL parses and uses the http or https scheme
/// * `Err(HarvesterError::InvalidBaseUrl)` otherwise
///
/// # Examples
/// ```
/// use oai_harvester::config::validate_base_url;
///
/// assert!(validate_base_url("http://repo.example.org/oai/provider").is_ok());
/// assert!(validate_base_url("ftp://repo.example.org").is_err());
/// ```
pub fn validate_base_url(base_url: &str) -> Result<Url> {
    let url =
        Url::parse(base_url).map_err(|_| HarvesterError::InvalidBaseUrl(base_url.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(HarvesterError::InvalidBaseUrl(base_url.to_string()));
    }
    Ok(url)
}

/// Validate a 24-hour run-at time string such as "23:15".
///
/// # Returns
/// * `Ok((hour, minute))` if valid
/// * `Err(HarvesterError::InvalidRunAtTime)` if invalid
///
/// # Examples
/// ```
/// use oai_harvester::config::validate_run_at_time;
///
/// assert_eq!(validate_run_at_time("23:15").unwrap(), (23, 15));
/// assert!(validate_run_at_time("24:00").is_err());
/// ```
pub fn validate_run_at_time(time: &str) -> Result<(u32, u32)> {
    let caps = RUN_AT_TIME_PATTERN
        .captures(time.trim())
        .ok_or_else(|| HarvesterError::InvalidRunAtTime(time.to_string()))?;
    let hour = caps[1]
        .parse::<u32>()
        .map_err(|_| HarvesterError::InvalidRunAtTime(time.to_string()))?;
    let minute = caps[2]
        .parse::<u32>()
        .map_err(|_| HarvesterError::InvalidRunAtTime(time.to_string()))?;
    Ok((hour, minute))
}
