use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One harvested wiki page, as stored in the per-category page log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub title: String,
    pub category: String,
    pub url: String,
    pub html: String,
}

/// Append-only NDJSON log of harvested pages for one category.
///
/// The log is the durable source of truth for replay: records are written
/// once and never mutated. `load_titles` is consulted before fetching so a
/// re-run never duplicates a `(category, title)` entry.
pub struct PageLog {
    path: PathBuf,
}

impl PageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Titles already present in the log. Malformed lines are skipped.
    pub fn load_titles(&self) -> Result<BTreeSet<String>> {
        let mut titles = BTreeSet::new();
        if !self.path.exists() {
            return Ok(titles);
        }

        let file = File::open(&self.path)?;
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PageRecord>(&line) {
                Ok(rec) => {
                    titles.insert(rec.title);
                }
                Err(e) => {
                    log::warn!(
                        "Skipping malformed line {} in {}: {}",
                        line_num + 1,
                        self.path.display(),
                        e
                    );
                }
            }
        }
        Ok(titles)
    }

    /// Append one record and flush immediately so an interrupted harvest
    /// loses at most the in-flight page.
    pub fn append(&self, record: &PageRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    /// Stream all records in log order. Malformed lines are logged and skipped.
    pub fn records(&self) -> Result<Vec<PageRecord>> {
        let mut records = Vec::new();
        if !self.path.exists() {
            return Ok(records);
        }

        let file = File::open(&self.path)?;
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PageRecord>(&line) {
                Ok(rec) => records.push(rec),
                Err(e) => {
                    log::warn!(
                        "Skipping malformed line {} in {}: {}",
                        line_num + 1,
                        self.path.display(),
                        e
                    );
                }
            }
        }
        Ok(records)
    }
}
