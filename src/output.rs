//! On-disk output for harvested records.
//!
//! The layout is deterministic so identical runs produce identical
//! artifacts:
//!
//! ```text
//! <base>/<host>[/<port>][/<path>…]/[<encoded-set>/]<prefix>/<encoded-id>.xml
//! ```
//!
//! Writes are classified by content equality (created, updated,
//! unchanged), deletion markers unlink the corresponding file, and every
//! outcome is reported to a [`ChangeNotifier`]. After a successful run
//! the directory can be archived to a zip, with a fixed-depth ring of
//! the newest three archives per job.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use url::Url;

use crate::config::ZIP_BACKUP_DEPTH;
use crate::encoding::encode;
use crate::error::Result;
use crate::notify::ChangeNotifier;
use crate::types::{HarvestedRecord, RecordSink};

/// How a record write turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file did not exist before.
    Created,
    /// The file existed with different content.
    Updated,
    /// The file existed with identical content.
    Unchanged,
}

/// Per-run write counters, reported at the end of a run.
#[derive(Debug, Default, Clone, Copy)]
pub struct WriteStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

impl WriteStats {
    /// True when the run touched no file at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created + self.updated + self.unchanged + self.deleted == 0
    }
}

/// Writes harvested records under a deterministic directory layout.
pub struct OutputManager {
    /// Root of this provider's output: `<base>/<host>[/<port>][/<path>…]`
    /// plus the configured set when one is fixed for the whole job.
    scope_dir: PathBuf,

    /// Stem for zip archive names, derived from host, prefix and set.
    archive_stem: String,

    /// Prefix directory for the format currently being written.
    current_prefix: String,

    /// Bucket records into one subdirectory per setSpec.
    split_by_set: bool,

    /// Zip base directory, when archiving is enabled.
    zip_dir: Option<PathBuf>,

    notifier: Arc<dyn ChangeNotifier>,
    stats: WriteStats,
}

impl OutputManager {
    /// Create an output manager for one provider.
    ///
    /// # Arguments
    /// * `base_dir` - Root under which all providers are written
    /// * `base_url` - Provider base URL; host, port and path become
    ///   directory levels
    /// * `metadata_prefix` - Format directory, or `None` when the run
    ///   will announce formats via [`RecordSink::begin_format`]
    /// * `set_spec` - Set fixed for the whole job, if any
    /// * `split_by_set` - Bucket records by their own setSpecs
    /// * `zip_dir` - Enable archiving under this directory
    /// * `notifier` - Change observer
    pub fn new(
        base_dir: &Path,
        base_url: &Url,
        metadata_prefix: Option<&str>,
        set_spec: Option<&str>,
        split_by_set: bool,
        zip_dir: Option<PathBuf>,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        let mut scope_dir = base_dir.join(provider_dir(base_url));
        if let Some(set) = set_spec {
            scope_dir.push(encode(set));
        }

        Self {
            scope_dir,
            archive_stem: archive_stem(base_url, metadata_prefix, set_spec),
            current_prefix: metadata_prefix.unwrap_or_default().to_string(),
            split_by_set,
            zip_dir,
            notifier,
            stats: WriteStats::default(),
        }
    }

    /// Directory all of this job's records live under.
    #[must_use]
    pub fn scope_dir(&self) -> &Path {
        &self.scope_dir
    }

    /// Write counters accumulated so far.
    #[must_use]
    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    /// Directories a record belongs in, excluding the file name.
    fn record_dirs(&self, record: &HarvestedRecord) -> Vec<PathBuf> {
        if self.split_by_set && !record.sets.is_empty() {
            record
                .sets
                .iter()
                .map(|set| self.scope_dir.join(encode(set)).join(&self.current_prefix))
                .collect()
        } else {
            vec![self.scope_dir.join(&self.current_prefix)]
        }
    }

    fn write_record(&mut self, record: &HarvestedRecord, dir: &Path) -> Result<WriteOutcome> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.xml", encode(&record.identifier)));

        let outcome = match fs::read_to_string(&path) {
            Ok(existing) if existing == record.payload => WriteOutcome::Unchanged,
            Ok(_) => WriteOutcome::Updated,
            Err(_) => WriteOutcome::Created,
        };

        match outcome {
            WriteOutcome::Unchanged => {
                self.stats.unchanged += 1;
                self.notifier.on_unchanged(&record.identifier, &path);
            }
            WriteOutcome::Updated => {
                fs::write(&path, &record.payload)?;
                self.stats.updated += 1;
                self.notifier.on_update(record, &path);
            }
            WriteOutcome::Created => {
                fs::write(&path, &record.payload)?;
                self.stats.created += 1;
                self.notifier.on_add(record, &path);
            }
        }
        Ok(outcome)
    }

    fn delete_record(&mut self, record: &HarvestedRecord, dir: &Path) -> Result<()> {
        let path = dir.join(format!("{}.xml", encode(&record.identifier)));
        if path.exists() {
            fs::remove_file(&path)?;
            self.stats.deleted += 1;
            self.notifier.on_delete(&record.identifier, &path);
        }
        Ok(())
    }

    /// Archive the scope directory to
    /// `<zip_dir>/<stem>/<stem>-<run-timestamp>.zip` and rotate older
    /// archives out, keeping the newest [`ZIP_BACKUP_DEPTH`].
    ///
    /// # Returns
    /// The archive path relative to the zip base, or `None` when
    /// archiving is disabled or the run wrote nothing.
    pub fn archive_run(&self, run_time: DateTime<Utc>) -> Result<Option<String>> {
        let Some(zip_dir) = &self.zip_dir else {
            return Ok(None);
        };
        if !self.scope_dir.is_dir() {
            return Ok(None);
        }
        // An empty run (noRecordsMatch) must not rotate a contentless
        // archive past real backups
        if self.stats.is_empty() {
            return Ok(None);
        }

        let stem_dir = zip_dir.join(&self.archive_stem);
        fs::create_dir_all(&stem_dir)?;

        let name = format!(
            "{}-{}.zip",
            self.archive_stem,
            run_time.format("%Y%m%d%H%M%S")
        );
        let zip_path = stem_dir.join(&name);
        write_zip(&self.scope_dir, &zip_path)?;
        tracing::debug!(zip = %zip_path.display(), "Archived harvest");

        rotate_archives(&stem_dir)?;
        Ok(Some(format!("{}/{name}", self.archive_stem)))
    }

    /// Newest retained archive, relative to the zip base.
    pub fn latest_zip(&self) -> Result<Option<String>> {
        let Some(zip_dir) = &self.zip_dir else {
            return Ok(None);
        };
        let newest = list_archives(&zip_dir.join(&self.archive_stem))?
            .into_iter()
            .next_back();
        Ok(newest.map(|name| format!("{}/{name}", self.archive_stem)))
    }
}

impl RecordSink for OutputManager {
    fn begin(&mut self, full_harvest: bool) -> Result<()> {
        // A full harvest starts from a clean directory so records the
        // provider no longer lists cannot linger.
        if full_harvest && self.scope_dir.exists() {
            tracing::debug!(dir = %self.scope_dir.display(), "Wiping for full harvest");
            fs::remove_dir_all(&self.scope_dir)?;
        }
        fs::create_dir_all(&self.scope_dir)?;
        Ok(())
    }

    fn begin_format(&mut self, metadata_prefix: &str) -> Result<()> {
        self.current_prefix = metadata_prefix.to_string();
        Ok(())
    }

    fn accept(&mut self, record: &HarvestedRecord) -> Result<()> {
        for dir in self.record_dirs(record) {
            if record.deleted {
                self.delete_record(record, &dir)?;
            } else {
                self.write_record(record, &dir)?;
            }
        }
        Ok(())
    }
}

/// Directory levels for a provider: host, explicit port, then each URL
/// path segment, all encoded for file-system safety.
fn provider_dir(base_url: &Url) -> PathBuf {
    let mut dir = PathBuf::new();
    if let Some(host) = base_url.host_str() {
        dir.push(encode(host));
    }
    if let Some(port) = base_url.port() {
        dir.push(port.to_string());
    }
    for segment in base_url.path_segments().into_iter().flatten() {
        if !segment.is_empty() {
            dir.push(encode(segment));
        }
    }
    dir
}

/// Zip stem: `host[-port]-prefix[-set]` with `:` and `.` mapped to `-`.
fn archive_stem(base_url: &Url, metadata_prefix: Option<&str>, set_spec: Option<&str>) -> String {
    let mut stem = String::new();
    stem.push_str(base_url.host_str().unwrap_or("provider"));
    if let Some(port) = base_url.port() {
        stem.push(':');
        stem.push_str(&port.to_string());
    }
    stem.push('-');
    stem.push_str(metadata_prefix.unwrap_or("all"));
    if let Some(set) = set_spec {
        stem.push('-');
        stem.push_str(set);
    }
    stem.chars()
        .map(|c| if c == ':' || c == '.' { '-' } else { c })
        .collect()
}

/// Zip a directory tree, entry names relative to `root`.
fn write_zip(root: &Path, zip_path: &Path) -> Result<()> {
    let file = fs::File::create(zip_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                writer.start_file(relative.to_string_lossy(), options)?;
                writer.write_all(&fs::read(&path)?)?;
            }
        }
    }
    writer.finish()?;
    Ok(())
}

/// Zip file names in a stem directory, oldest first. Timestamped names
/// sort chronologically.
fn list_archives(stem_dir: &Path) -> Result<Vec<String>> {
    if !stem_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = fs::read_dir(stem_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".zip"))
        .collect();
    names.sort();
    Ok(names)
}

/// Delete all but the newest [`ZIP_BACKUP_DEPTH`] archives.
fn rotate_archives(stem_dir: &Path) -> Result<()> {
    let names = list_archives(stem_dir)?;
    if names.len() <= ZIP_BACKUP_DEPTH {
        return Ok(());
    }
    for name in &names[..names.len() - ZIP_BACKUP_DEPTH] {
        tracing::debug!(name, "Rotating out old archive");
        fs::remove_file(stem_dir.join(name))?;
    }
    Ok(())
}
