//! Core data types for harvest runs.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::protocol::Verb;

/// One metadata record pulled from a provider.
///
/// Records are transient: the client creates them page by page and the
/// sink consumes them immediately. The on-disk artifact written by the
/// output manager is the durable copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestedRecord {
    /// OAI identifier, as sent by the provider (not encoded).
    pub identifier: String,

    /// Provider datestamp for the record, verbatim.
    pub datestamp: Option<String>,

    /// setSpecs this record belongs to. May be empty.
    pub sets: Vec<String>,

    /// Native metadata payload, opaque to the engine. Empty for deletion
    /// markers and for ListIdentifiers harvests.
    pub payload: String,

    /// True if the provider marked this record deleted.
    pub deleted: bool,
}

impl HarvestedRecord {
    /// Create a live record.
    #[must_use]
    pub fn new(identifier: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            datestamp: None,
            sets: Vec::new(),
            payload: payload.into(),
            deleted: false,
        }
    }

    /// Create a deletion marker.
    #[must_use]
    pub fn deleted(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            datestamp: None,
            sets: Vec::new(),
            payload: String::new(),
            deleted: true,
        }
    }
}

/// Terminal status of one harvest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The resumption-token chain completed, or the provider reported an
    /// empty result set.
    Succeeded,
    /// The run aborted before emitting any record.
    Failed,
    /// The run aborted mid-chain after records were already emitted; the
    /// sink holds whatever was produced.
    PartiallyFailed,
}

impl RunStatus {
    /// Label for logs and CLI output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::PartiallyFailed => "partially-failed",
        }
    }
}

/// Report of one harvest execution. Transient, never persisted.
#[derive(Debug, Clone)]
pub struct HarvestRun {
    /// Uid of the scheduled job, or 0 for one-shot harvests.
    pub job_uid: u64,

    /// When the run started. On success this becomes the job's
    /// `last_harvest_time`, so a slow run cannot open a coverage gap.
    pub start_time: DateTime<Utc>,

    /// Records emitted, including deletion markers.
    pub records: usize,

    /// Pages fetched (initial request plus token follow-ups).
    pub pages: usize,

    /// Terminal status.
    pub status: RunStatus,

    /// Where the output manager wrote this run, if one was attached.
    pub output_dir: Option<PathBuf>,

    /// Zip archive produced for the run, relative to the zip base.
    pub zip_file: Option<String>,

    /// Last resumption token that produced a successful page, kept so a
    /// failure can be debugged without replaying the whole run.
    pub last_token: Option<String>,

    /// Failure message for failed or partially-failed runs.
    pub error: Option<String>,
}

/// Arguments for one harvest run.
#[derive(Debug, Clone)]
pub struct HarvestParams {
    /// Provider base URL, e.g. "http://www.dlese.org/oai/provider".
    pub base_url: String,

    /// metadataPrefix to harvest, or `None` to harvest every format the
    /// provider advertises.
    pub metadata_prefix: Option<String>,

    /// setSpec to harvest, or `None` for the whole repository.
    pub set_spec: Option<String>,

    /// Lower datestamp bound, normally the prior run's start time.
    pub from: Option<DateTime<Utc>>,

    /// Upper datestamp bound.
    pub until: Option<DateTime<Utc>>,

    /// Ignore the incremental window and harvest everything.
    pub harvest_all: bool,

    /// Escalate to a full harvest when the provider gives no evidence it
    /// tracks deletions.
    pub harvest_all_if_no_deleted_record: bool,

    /// ListRecords (full payloads) or ListIdentifiers (headers only).
    pub verb: Verb,
}

impl HarvestParams {
    /// Create params for a plain ListRecords harvest of every record.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            metadata_prefix: None,
            set_spec: None,
            from: None,
            until: None,
            harvest_all: false,
            harvest_all_if_no_deleted_record: false,
            verb: Verb::ListRecords,
        }
    }

    /// Set the metadataPrefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metadata_prefix = Some(prefix.into());
        self
    }

    /// Set the setSpec.
    #[must_use]
    pub fn with_set(mut self, set_spec: impl Into<String>) -> Self {
        self.set_spec = Some(set_spec.into());
        self
    }
}

/// Consumer of harvested records, fed as each page is parsed.
pub trait RecordSink {
    /// Called once before the first page, after the client has settled
    /// whether the run is incremental or full.
    fn begin(&mut self, full_harvest: bool) -> Result<()> {
        let _ = full_harvest;
        Ok(())
    }

    /// Called before the records of each metadata format. A run with a
    /// configured metadataPrefix sees this exactly once; a
    /// harvest-every-format run sees it once per advertised prefix.
    fn begin_format(&mut self, metadata_prefix: &str) -> Result<()> {
        let _ = metadata_prefix;
        Ok(())
    }

    /// Consume one record.
    fn accept(&mut self, record: &HarvestedRecord) -> Result<()>;
}

/// Sink that buffers records in memory, for callers that want results
/// returned rather than written to disk.
#[derive(Debug, Default)]
pub struct RecordBuffer {
    /// Records in arrival order.
    pub records: Vec<HarvestedRecord>,
}

impl RecordBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for RecordBuffer {
    fn accept(&mut self, record: &HarvestedRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_labels() {
        assert_eq!(RunStatus::Succeeded.as_str(), "succeeded");
        assert_eq!(RunStatus::Failed.as_str(), "failed");
        assert_eq!(RunStatus::PartiallyFailed.as_str(), "partially-failed");
    }

    #[test]
    fn test_deleted_marker() {
        let rec = HarvestedRecord::deleted("oai:x:1");
        assert!(rec.deleted);
        assert!(rec.payload.is_empty());
    }

    #[test]
    fn test_record_buffer_collects() {
        let mut buf = RecordBuffer::new();
        buf.accept(&HarvestedRecord::new("oai:x:1", "<dc/>")).unwrap();
        buf.accept(&HarvestedRecord::deleted("oai:x:2")).unwrap();
        assert_eq!(buf.records.len(), 2);
        assert_eq!(buf.records[0].identifier, "oai:x:1");
        assert!(buf.records[1].deleted);
    }

    #[test]
    fn test_params_builder() {
        let p = HarvestParams::new("http://repo.example.org/oai")
            .with_prefix("oai_dc")
            .with_set("testset");
        assert_eq!(p.metadata_prefix.as_deref(), Some("oai_dc"));
        assert_eq!(p.set_spec.as_deref(), Some("testset"));
        assert_eq!(p.verb, Verb::ListRecords);
        assert!(!p.harvest_all);
    }
}
