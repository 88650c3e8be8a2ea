use crate::error::Result;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadEntry {
    pub uploaded_at: DateTime<Utc>,
    pub sources: Vec<String>,
}

/// Append-only record of which source sets were uploaded when.
///
/// Owned by the caller. Loading only ever receives the resolved list of
/// sources, never the history itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadHistory {
    entries: Vec<UploadEntry>,
}

impl UploadHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sources: Vec<String>) -> &UploadEntry {
        self.record_at(Utc::now(), sources)
    }

    /// Entries stay ordered by timestamp; equal timestamps keep arrival order.
    pub fn record_at(&mut self, uploaded_at: DateTime<Utc>, sources: Vec<String>) -> &UploadEntry {
        let idx = self
            .entries
            .partition_point(|entry| entry.uploaded_at <= uploaded_at);
        self.entries.insert(
            idx,
            UploadEntry {
                uploaded_at,
                sources,
            },
        );
        &self.entries[idx]
    }

    pub fn entries(&self) -> &[UploadEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn latest(&self) -> Option<&UploadEntry> {
        self.entries.last()
    }

    /// The most recent upload at or before `at`.
    pub fn as_of(&self, at: DateTime<Utc>) -> Option<&UploadEntry> {
        self.entries.iter().rev().find(|entry| entry.uploaded_at <= at)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// A missing file is an empty history.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No upload history at {}", path.display());
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
