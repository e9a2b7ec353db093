//! Scheduled harvest jobs and their recurrence math.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Local, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RECORD_COUNT_WARN_CEILING;
use crate::protocol::Verb;
use crate::types::HarvestParams;

/// Units for interval recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalGranularity {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
}

/// When a job recurs. The two modes are mutually exclusive by
/// construction: a job either repeats a fixed interval after its last
/// success, or fires at a wall-clock time every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    /// Repeat `every` units after the last successful run.
    Interval {
        every: u32,
        granularity: IntervalGranularity,
    },
    /// Fire once a day at hour:minute (24-hour clock, local time).
    DailyAt { hour: u32, minute: u32 },
}

impl Recurrence {
    /// Parse a daily recurrence from a 24-hour "HH:MM" string.
    pub fn daily_at(time: &str) -> crate::error::Result<Self> {
        let (hour, minute) = crate::config::validate_run_at_time(time)?;
        Ok(Self::DailyAt { hour, minute })
    }
}

/// One recurring harvest job, persisted between daemon restarts.
///
/// Bookkeeping fields (`last_harvest_time`, `num_harvested_last`, the
/// backup pointers) advance only on a successful run, so a failed run is
/// retried over the same window at the next due time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledHarvest {
    /// Unique job id, issued by the scheduler's id generator.
    pub uid: u64,

    /// Display name for logs and listings.
    pub repository_name: String,

    /// Provider base URL.
    pub base_url: String,

    /// metadataPrefix, or `None` to harvest every advertised format.
    #[serde(default)]
    pub metadata_prefix: Option<String>,

    /// setSpec, or `None` for the whole repository.
    #[serde(default)]
    pub set_spec: Option<String>,

    /// When the job recurs.
    #[serde(with = "serde_yaml_ng::with::singleton_map")]
    pub recurrence: Recurrence,

    /// Disabled jobs are skipped by the tick; an in-flight run is never
    /// interrupted by disabling.
    pub enabled: bool,

    /// Root directory for this job's output.
    pub harvest_dir: PathBuf,

    /// Bucket records into one subdirectory per setSpec.
    #[serde(default)]
    pub split_by_set: bool,

    /// Archive each successful run to a zip.
    #[serde(default)]
    pub do_zip: bool,

    /// Harvest everything on the next run, then clear.
    #[serde(default)]
    pub harvest_all: bool,

    /// Escalate to a full harvest when the provider does not track
    /// deletions.
    #[serde(default)]
    pub harvest_all_if_no_deleted_record: bool,

    /// Start time of the last successful run. `None` until the first
    /// success, which makes the first run unbounded.
    #[serde(default)]
    pub last_harvest_time: Option<DateTime<Utc>>,

    /// Record count of the last successful run.
    #[serde(default)]
    pub num_harvested_last: usize,

    /// Latched once a run returns an unexpectedly large record count;
    /// cleared only by operator edit.
    #[serde(default)]
    pub record_count_warning: bool,

    /// Newest retained zip, relative to the zip base.
    #[serde(default)]
    pub backup_one: Option<String>,

    /// Second newest retained zip.
    #[serde(default)]
    pub backup_two: Option<String>,

    /// Oldest retained zip.
    #[serde(default)]
    pub backup_three: Option<String>,

    /// Always the newest zip; equal to `backup_one`.
    #[serde(default)]
    pub zip_latest: Option<String>,
}

impl ScheduledHarvest {
    /// Create an enabled job with empty bookkeeping.
    #[must_use]
    pub fn new(
        uid: u64,
        repository_name: impl Into<String>,
        base_url: impl Into<String>,
        recurrence: Recurrence,
        harvest_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            uid,
            repository_name: repository_name.into(),
            base_url: base_url.into(),
            metadata_prefix: None,
            set_spec: None,
            recurrence,
            enabled: true,
            harvest_dir: harvest_dir.into(),
            split_by_set: false,
            do_zip: false,
            harvest_all: false,
            harvest_all_if_no_deleted_record: false,
            last_harvest_time: None,
            num_harvested_last: 0,
            record_count_warning: false,
            backup_one: None,
            backup_two: None,
            backup_three: None,
            zip_latest: None,
        }
    }

    /// When this job should next run.
    ///
    /// Interval jobs that never ran are due immediately, with no `from`
    /// bound. Daily jobs fire at the next future hour:minute on the
    /// local wall clock.
    #[must_use]
    pub fn next_due(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.recurrence {
            Recurrence::Interval { every, granularity } => match self.last_harvest_time {
                None => now,
                Some(last) => match granularity {
                    IntervalGranularity::Minutes => last + Duration::minutes(i64::from(every)),
                    IntervalGranularity::Hours => last + Duration::hours(i64::from(every)),
                    IntervalGranularity::Days => last + Duration::days(i64::from(every)),
                    IntervalGranularity::Weeks => last + Duration::weeks(i64::from(every)),
                    IntervalGranularity::Months => {
                        last.checked_add_months(Months::new(every)).unwrap_or(last)
                    }
                },
            },
            Recurrence::DailyAt { hour, minute } => {
                // Operators configure a local wall-clock time; today's
                // occurrence may already be past, or may not exist on a
                // DST-gap day, so try tomorrow's as well.
                let mut date = now.with_timezone(&Local).date_naive();
                for _ in 0..2 {
                    let candidate = date
                        .and_hms_opt(hour, minute, 0)
                        .and_then(|t| t.and_local_timezone(Local).earliest())
                        .map(|t| t.with_timezone(&Utc));
                    if let Some(candidate) = candidate {
                        if candidate > now {
                            return candidate;
                        }
                    }
                    date = date + Duration::days(1);
                }
                // Hand-edited job file with an impossible time: park the
                // job rather than run it on every tick
                now + Duration::days(1)
            }
        }
    }

    /// True when an enabled job is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_due(now) <= now
    }

    /// Harvest params for the next run of this job.
    #[must_use]
    pub fn params(&self) -> HarvestParams {
        HarvestParams {
            base_url: self.base_url.clone(),
            metadata_prefix: self.metadata_prefix.clone(),
            set_spec: self.set_spec.clone(),
            from: self.last_harvest_time,
            until: None,
            harvest_all: self.harvest_all,
            harvest_all_if_no_deleted_record: self.harvest_all_if_no_deleted_record,
            verb: Verb::ListRecords,
        }
    }

    /// Commit a successful run: advance bookkeeping, rotate backup
    /// pointers when a zip was produced, clear a one-shot `harvest_all`.
    pub fn commit_success(
        &mut self,
        start_time: DateTime<Utc>,
        records: usize,
        zip_file: Option<String>,
    ) {
        self.last_harvest_time = Some(start_time);
        self.num_harvested_last = records;
        if records >= RECORD_COUNT_WARN_CEILING {
            self.record_count_warning = true;
            tracing::warn!(
                uid = self.uid,
                records,
                "Record count exceeds the expected ceiling, flagging job"
            );
        }
        if let Some(zip) = zip_file {
            self.backup_three = self.backup_two.take();
            self.backup_two = self.backup_one.take();
            self.backup_one = Some(zip.clone());
            self.zip_latest = Some(zip);
        }
        self.harvest_all = false;
    }
}
