//! Persisted memory: tagged text entries, one JSON object per line.
//!
//! Loaded into the system prompt at session start, appended at session
//! end. The engine consumes only `{tag, content}` pairs; everything else
//! about the file is private to this module.

use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use tl_domain::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryEntry {
    pub tag: String,
    pub content: String,
}

pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load all entries. A missing file is an empty store; unparseable
    /// lines are skipped with a warning rather than poisoning the session.
    pub fn load(&self) -> Result<Vec<MemoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let mut entries = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<MemoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unparseable memory line");
                }
            }
        }
        Ok(entries)
    }

    /// Append entries, creating the file (and parents) when needed.
    pub fn append(&self, entries: &[MemoryEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for entry in entries {
            let line = serde_json::to_string(entry)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}
