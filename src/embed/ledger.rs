use crate::error::Result;
use crate::ingest::sanitize_vector_id;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Append-only ledger of vector ids already upserted.
///
/// One id per line. Lines are sanitized on load with the same rules as ids
/// at upsert time, so a ledger written by an older run still matches. Ids
/// are recorded only after their batch's upsert succeeds, which makes
/// re-running the embed stage skip exactly the work that completed.
pub struct ProgressLedger {
    path: PathBuf,
    done: HashSet<String>,
}

impl ProgressLedger {
    /// Load the ledger, treating a missing file as empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let done = match std::fs::read_to_string(&path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(sanitize_vector_id)
                .collect(),
            Err(_) => HashSet::new(),
        };
        Self { path, done }
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.done.contains(id)
    }

    /// Append a batch of ids and fold them into the in-memory set.
    pub fn record(&mut self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        for id in ids {
            writeln!(file, "{}", id)?;
        }
        file.flush()?;
        self.done.extend(ids.iter().cloned());
        Ok(())
    }
}
