use std::path::PathBuf;

use tracing::{debug, warn};
use vidprompt_contracts::history::{HistoryEntry, HistoryLog};

/// Best-effort front of the history log. Nothing here ever returns an error.
#[derive(Debug, Clone, Default)]
pub struct HistoryRecorder {
    log: Option<HistoryLog>,
}

impl HistoryRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            log: Some(HistoryLog::new(path)),
        }
    }

    /// Recorder with no backing store: inserts are dropped, reads are empty.
    pub fn disabled() -> Self {
        Self { log: None }
    }

    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => Self::new(path),
            None => Self::disabled(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.log.is_some()
    }

    pub fn record(&self, entry: &HistoryEntry) {
        let Some(log) = self.log.as_ref() else {
            debug!("history disabled; skipping record");
            return;
        };
        match log.append(entry) {
            Ok(()) => debug!(id = %entry.id, path = %log.path().display(), "history entry recorded"),
            Err(err) => warn!(
                error = %format!("{err:#}"),
                path = %log.path().display(),
                "failed to record history entry"
            ),
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let Some(log) = self.log.as_ref() else {
            return Vec::new();
        };
        log.recent(limit).unwrap_or_else(|err| {
            warn!(
                error = %format!("{err:#}"),
                path = %log.path().display(),
                "failed to read history"
            );
            Vec::new()
        })
    }
}
