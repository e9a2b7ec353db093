//! Harvest client driving the OAI-PMH request/response state machine.
//!
//! A run starts with Identify (granularity and deletion support), then
//! walks the resumption-token chain page by page, feeding each record to
//! the sink as soon as its page is parsed. Flow control is entirely the
//! provider's: a follow-up request carries only the verb and the token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::Client;
use url::Url;

use crate::config::{validate_base_url, DEFAULT_HTTP_TIMEOUT};
use crate::datestamp::{format_datestamp, Granularity};
use crate::error::{HarvesterError, Result};
use crate::http::{create_client, fetch_xml};
use crate::protocol::{
    parse_identify, parse_list_metadata_formats, parse_page, DeletionProbe, IdentifyDeletionProbe,
    IdentifyInfo, Page, Verb,
};
use crate::types::{HarvestParams, HarvestRun, RecordSink, RunStatus};

/// OAI-PMH harvest client for one run.
///
/// The kill flag is per client: once set it stops every page loop this
/// client drives, so create one client per run when cancellation
/// matters.
pub struct HarvestClient {
    http: Client,
    probe: Box<dyn DeletionProbe>,
    kill: Arc<AtomicBool>,
}

impl HarvestClient {
    /// Create a client with the default timeout and deletion probe.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a client with a custom HTTP timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: create_client(timeout)?,
            probe: Box::new(IdentifyDeletionProbe),
            kill: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replace the deletion probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Box<dyn DeletionProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Handle that can stop this client's harvest from another thread.
    #[must_use]
    pub fn kill_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.kill)
    }

    /// Stop the harvest at the next page boundary.
    pub fn kill(&self) {
        self.kill.store(true, Ordering::Relaxed);
    }

    /// Run one harvest, feeding records to `sink`.
    ///
    /// Never panics and never returns an error: every failure mode is
    /// folded into the returned run report. A provider answering
    /// noRecordsMatch (or noSetHierarchy) yields a successful run with
    /// zero records.
    pub fn harvest(&self, params: &HarvestParams, sink: &mut dyn RecordSink) -> HarvestRun {
        let mut run = HarvestRun {
            job_uid: 0,
            start_time: Utc::now(),
            records: 0,
            pages: 0,
            status: RunStatus::Succeeded,
            output_dir: None,
            zip_file: None,
            last_token: None,
            error: None,
        };

        match self.run_harvest(params, sink, &mut run) {
            Ok(()) => {
                tracing::info!(
                    records = run.records,
                    pages = run.pages,
                    "Harvest complete"
                );
            }
            Err(error) if error.is_empty_result() => {
                tracing::info!(%error, "Provider reported an empty result set");
            }
            Err(error) => {
                run.status = if run.records == 0 {
                    RunStatus::Failed
                } else {
                    RunStatus::PartiallyFailed
                };
                let context = format!("Aborted on page {}: {error}", run.pages + 1);
                tracing::error!(
                    records = run.records,
                    last_token = run.last_token.as_deref().unwrap_or("-"),
                    "{context}"
                );
                run.error = Some(context);
            }
        }
        run
    }

    fn run_harvest(
        &self,
        params: &HarvestParams,
        sink: &mut dyn RecordSink,
        run: &mut HarvestRun,
    ) -> Result<()> {
        let base_url = validate_base_url(&params.base_url)?;

        let identify_xml = fetch_xml(&self.http, identify_url(&base_url).as_str())?;
        let info = parse_identify(&identify_xml)?;
        tracing::debug!(
            granularity = info.granularity.as_str(),
            deleted_record = info.deleted_record.as_str(),
            "Identify complete"
        );

        let full = decide_full(params, &info, self.probe.as_ref());
        sink.begin(full)?;

        let prefixes = match &params.metadata_prefix {
            Some(prefix) => vec![prefix.clone()],
            None => {
                let formats_xml =
                    fetch_xml(&self.http, list_formats_url(&base_url).as_str())?;
                parse_list_metadata_formats(&formats_xml)?
            }
        };

        for prefix in &prefixes {
            sink.begin_format(prefix)?;
            match self.harvest_format(params, &base_url, &info, prefix, full, sink, run) {
                Ok(()) => {}
                // One empty format must not abort the remaining formats
                Err(error) if prefixes.len() > 1 && error.is_empty_result() => {
                    tracing::debug!(prefix, "No records for format");
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn harvest_format(
        &self,
        params: &HarvestParams,
        base_url: &Url,
        info: &IdentifyInfo,
        prefix: &str,
        full: bool,
        sink: &mut dyn RecordSink,
        run: &mut HarvestRun,
    ) -> Result<()> {
        let first_url = list_url(base_url, params, info.granularity, prefix, full);
        let mut cursor = PageCursor::new(&self.http, base_url, params.verb, first_url);

        loop {
            if self.kill.load(Ordering::Relaxed) {
                return Err(HarvesterError::Killed {
                    pages: run.pages,
                    records: run.records,
                });
            }
            let Some(page) = cursor.next_page()? else {
                break;
            };
            run.pages += 1;
            run.last_token = cursor.current_token().map(str::to_string);
            tracing::debug!(page = run.pages, records = page.records.len(), "Page parsed");

            for record in &page.records {
                sink.accept(record)?;
                run.records += 1;
            }
        }
        Ok(())
    }
}

/// Lazily walks one resumption-token chain. Finite: ends when a page
/// carries no (or an empty) token. Recreate the cursor to restart the
/// chain from the beginning.
struct PageCursor<'a> {
    http: &'a Client,
    base_url: &'a Url,
    verb: Verb,
    first_url: Option<Url>,
    current_token: Option<String>,
    next_token: Option<String>,
    done: bool,
}

impl<'a> PageCursor<'a> {
    fn new(http: &'a Client, base_url: &'a Url, verb: Verb, first_url: Url) -> Self {
        Self {
            http,
            base_url,
            verb,
            first_url: Some(first_url),
            current_token: None,
            next_token: None,
            done: false,
        }
    }

    /// Token that fetched the most recent page, if it was a follow-up.
    fn current_token(&self) -> Option<&str> {
        self.current_token.as_deref()
    }

    /// Fetch and parse the next page, or `None` at the end of the chain.
    fn next_page(&mut self) -> Result<Option<Page>> {
        if self.done {
            return Ok(None);
        }

        let url = match self.first_url.take() {
            Some(url) => url,
            None => match self.next_token.take() {
                Some(token) => {
                    let url = resumption_url(self.base_url, self.verb, &token);
                    self.current_token = Some(token);
                    url
                }
                None => {
                    self.done = true;
                    return Ok(None);
                }
            },
        };

        let xml = fetch_xml(self.http, url.as_str())?;
        let page = parse_page(&xml, self.verb)?;
        self.next_token = page.resumption_token.clone();
        if self.next_token.is_none() {
            self.done = true;
        }
        Ok(Some(page))
    }
}

/// Whether this run is a full harvest. An explicit `harvest_all` always
/// wins; otherwise the run escalates when the caller asked for it and
/// the probe finds no deletion support.
fn decide_full(params: &HarvestParams, info: &IdentifyInfo, probe: &dyn DeletionProbe) -> bool {
    if params.harvest_all {
        return true;
    }
    if params.harvest_all_if_no_deleted_record && !probe.supports_deletions(info) {
        tracing::info!("Provider does not track deletions, escalating to full harvest");
        return true;
    }
    false
}

fn identify_url(base_url: &Url) -> Url {
    let mut url = base_url.clone();
    url.query_pairs_mut()
        .append_pair("verb", Verb::Identify.as_str());
    url
}

fn list_formats_url(base_url: &Url) -> Url {
    let mut url = base_url.clone();
    url.query_pairs_mut()
        .append_pair("verb", Verb::ListMetadataFormats.as_str());
    url
}

/// First request of a chain: verb, metadataPrefix, and the optional
/// set/from/until arguments. A full harvest drops the datestamp window.
fn list_url(
    base_url: &Url,
    params: &HarvestParams,
    granularity: Granularity,
    prefix: &str,
    full: bool,
) -> Url {
    let mut url = base_url.clone();
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("verb", params.verb.as_str());
        query.append_pair("metadataPrefix", prefix);
        if let Some(set) = &params.set_spec {
            query.append_pair("set", set);
        }
        if !full {
            if let Some(from) = params.from {
                query.append_pair("from", &format_datestamp(from, granularity));
            }
            if let Some(until) = params.until {
                query.append_pair("until", &format_datestamp(until, granularity));
            }
        }
    }
    url
}

/// Follow-up request: the token replaces every other argument.
fn resumption_url(base_url: &Url, verb: Verb, token: &str) -> Url {
    let mut url = base_url.clone();
    url.query_pairs_mut()
        .append_pair("verb", verb.as_str())
        .append_pair("resumptionToken", token);
    url
}
