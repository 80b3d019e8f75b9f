use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::prompts::PromptInput;
use crate::sections::Section;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Prompt as retained in history; image bytes are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPrompt {
    pub index: usize,
    pub description: String,
}

impl From<&PromptInput> for HistoryPrompt {
    fn from(input: &PromptInput) -> Self {
        Self {
            index: input.index,
            description: input.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub created_at: String,
    pub image_count: usize,
    pub prompts: Vec<HistoryPrompt>,
    pub results: Vec<Section>,
}

impl HistoryEntry {
    pub fn new(image_count: usize, prompts: Vec<HistoryPrompt>, results: Vec<Section>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now_utc_iso(),
            image_count,
            prompts,
            results,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|value| value.with_timezone(&Utc))
    }
}

/// Append-only `history.jsonl`: one compact JSON entry per line, never rewritten.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    inner: Arc<HistoryLogInner>,
}

#[derive(Debug)]
struct HistoryLogInner {
    path: PathBuf,
    lock: Mutex<()>,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(HistoryLogInner {
                path: path.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Creates the parent directory. Safe to call before every operation.
    pub fn ensure_initialized(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.inner.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create history directory {}", parent.display())
                })?;
            }
        }
        Ok(())
    }

    pub fn append(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        self.ensure_initialized()?;
        let line = serde_json::to_string(entry)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("history log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)
            .with_context(|| format!("failed to open {}", self.inner.path.display()))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Newest entries first, at most `limit`. A missing file reads as empty;
    /// lines that fail to parse are skipped.
    pub fn recent(&self, limit: usize) -> anyhow::Result<Vec<HistoryEntry>> {
        self.ensure_initialized()?;
        let raw = match std::fs::read_to_string(&self.inner.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to read {}", self.inner.path.display())))
            }
        };
        let mut entries: Vec<(usize, HistoryEntry)> = raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str::<HistoryEntry>(line).ok())
            .enumerate()
            .collect();
        // Appends are chronological; line order breaks timestamp ties.
        entries.sort_by(|(left_pos, left), (right_pos, right)| {
            right
                .created_at()
                .cmp(&left.created_at())
                .then(right_pos.cmp(left_pos))
        });
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|(_, entry)| entry)
            .collect())
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
