//! Change notification hooks for harvested records.
//!
//! The output manager reports every write outcome to a notifier so
//! downstream indexers can react to adds, updates and deletions without
//! re-scanning the harvest directory.

use std::path::Path;

use crate::types::HarvestedRecord;

/// Observer of output-directory changes during a harvest run.
///
/// Implementations must be cheap: notifications run inline with record
/// writes, on the harvest thread.
pub trait ChangeNotifier: Send + Sync {
    /// A record file was created.
    fn on_add(&self, record: &HarvestedRecord, path: &Path) {
        let _ = (record, path);
    }

    /// A record file existed and its content changed.
    fn on_update(&self, record: &HarvestedRecord, path: &Path) {
        let _ = (record, path);
    }

    /// A record file was removed because the provider deleted the record.
    fn on_delete(&self, identifier: &str, path: &Path) {
        let _ = (identifier, path);
    }

    /// A record file existed with identical content.
    fn on_unchanged(&self, identifier: &str, path: &Path) {
        let _ = (identifier, path);
    }
}

/// Notifier that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {}
