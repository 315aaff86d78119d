use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

fn default_license() -> String {
    "CC BY-SA".to_string()
}

fn default_lang() -> String {
    "en".to_string()
}

/// The atomic retrievable unit: one embedded-and-indexed text window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    /// Corpus tag, optionally suffixed (e.g. "archon_quests_summaries")
    #[serde(rename = "type")]
    pub chunk_type: String,
    pub title: String,
    pub section: String,
    pub source_url: String,
    #[serde(default = "default_license")]
    pub license: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    pub text: String,
    pub text_hash: String,
    /// Free-form character list carried on summary chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<String>,
}

/// Per-corpus chunk log: one JSON record per line.
///
/// Unlike the page logs and the progress ledger, a chunk log is regenerated
/// wholesale on each run; the ledger is what makes re-runs idempotent.
pub struct ChunkLog;

impl ChunkLog {
    /// Rewrite the log for one corpus.
    pub fn write(path: &Path, records: &[ChunkRecord]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        for record in records {
            let line = serde_json::to_string(record)?;
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Stream records in log order. Each item is a per-line parse result so
    /// the caller can skip malformed lines without losing the rest of the
    /// stream.
    pub fn stream(path: &Path) -> Result<ChunkStream> {
        let file = File::open(path)?;
        Ok(ChunkStream {
            lines: BufReader::new(file).lines(),
            path: path.to_path_buf(),
            line_num: 0,
        })
    }
}

pub struct ChunkStream {
    lines: Lines<BufReader<File>>,
    path: PathBuf,
    line_num: usize,
}

impl Iterator for ChunkStream {
    type Item = Result<ChunkRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_num += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str::<ChunkRecord>(&line).map_err(|e| {
                crate::error::LorevatError::Parse(format!(
                    "line {} in {}: {}",
                    self.line_num,
                    self.path.display(),
                    e
                ))
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            chunk_type: "books".to_string(),
            title: "Teyvat".to_string(),
            section: "Overview".to_string(),
            source_url: "https://wiki.example.org/wiki/Teyvat".to_string(),
            license: default_license(),
            lang: default_lang(),
            text: "Seven nations under one sky.".to_string(),
            text_hash: crate::ingest::identity::text_fingerprint("Seven nations under one sky."),
            characters: None,
        }
    }

    #[test]
    fn test_write_then_stream_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jsonl").join("books.jsonl");
        let records = vec![record("fandom:books:teyvat:overview:0"), record("fandom:books:teyvat:overview:1")];
        ChunkLog::write(&path, &records).unwrap();

        let streamed: Vec<ChunkRecord> =
            ChunkLog::stream(&path).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(streamed.len(), 2);
        assert_eq!(streamed[0].id, "fandom:books:teyvat:overview:0");
        assert_eq!(streamed[0].chunk_type, "books");
        assert_eq!(streamed[0].license, "CC BY-SA");
    }

    #[test]
    fn test_write_truncates_previous_run() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("books.jsonl");
        ChunkLog::write(&path, &[record("a"), record("b")]).unwrap();
        ChunkLog::write(&path, &[record("c")]).unwrap();

        let streamed: Vec<ChunkRecord> =
            ChunkLog::stream(&path).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(streamed.len(), 1);
        assert_eq!(streamed[0].id, "c");
    }

    #[test]
    fn test_malformed_lines_surface_as_item_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("books.jsonl");
        let good = serde_json::to_string(&record("good")).unwrap();
        std::fs::write(&path, format!("{}\nnot json\n{}\n", good, good)).unwrap();

        let items: Vec<Result<ChunkRecord>> = ChunkLog::stream(&path).unwrap().collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
        assert!(items[2].is_ok());
    }

    #[test]
    fn test_serialized_field_names_match_log_format() {
        let json = serde_json::to_value(record("x")).unwrap();
        assert!(json.get("type").is_some());
        assert!(json.get("source_url").is_some());
        assert!(json.get("characters").is_none()); // omitted when absent
    }
}
