use crate::embed::{ChunkMetadata, ContentType, Embedder, ProgressLedger, VectorIndex, VectorPoint};
use crate::error::Result;
use crate::ingest::{passes_quality_gate, sanitize_vector_id, ChunkLog, ChunkRecord};
use std::collections::HashSet;
use std::path::Path;

/// Outcome counters for one corpus pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct SinkStats {
    pub upserted: usize,
    pub already: usize,
    pub filtered: usize,
    pub malformed: usize,
}

/// Streams a chunk log into the vector index in configurable batches.
///
/// Each batch is embedded, upserted, and only then recorded in the progress
/// ledger, so a crash between batches re-does at most one batch on the next
/// run. A failed batch is logged and dropped; the stream continues so one
/// bad batch cannot stall a long pass.
pub struct EmbedSink<E, V> {
    embedder: E,
    index: V,
    ledger: ProgressLedger,
    batch_size: usize,
}

impl<E: Embedder, V: VectorIndex> EmbedSink<E, V> {
    pub fn new(embedder: E, index: V, ledger: ProgressLedger, batch_size: usize) -> Self {
        Self {
            embedder,
            index,
            ledger,
            batch_size: batch_size.max(1),
        }
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    /// Embed and upsert every new chunk in one corpus's chunk log.
    pub async fn run_corpus(
        &mut self,
        corpus: &str,
        chunk_log: &Path,
        content_type: ContentType,
    ) -> Result<SinkStats> {
        let mut stats = SinkStats::default();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut batch: Vec<(String, ChunkRecord)> = Vec::with_capacity(self.batch_size);

        for item in ChunkLog::stream(chunk_log)? {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("{}: skipping malformed chunk: {}", corpus, e);
                    stats.malformed += 1;
                    continue;
                }
            };

            let id = self.disambiguate(&record, &mut seen_ids);

            if self.ledger.contains(&id) {
                stats.already += 1;
                continue;
            }
            if !passes_quality_gate(&record.text) {
                stats.filtered += 1;
                continue;
            }

            batch.push((id, record));
            if batch.len() >= self.batch_size {
                self.flush(corpus, content_type, &mut batch, &mut stats).await;
            }
        }
        self.flush(corpus, content_type, &mut batch, &mut stats).await;

        log::info!(
            "{}: {} upserted, {} already embedded, {} filtered, {} malformed",
            corpus,
            stats.upserted,
            stats.already,
            stats.filtered,
            stats.malformed
        );
        Ok(stats)
    }

    /// Sanitize a record's id and make it unique within this pass.
    ///
    /// Duplicate ids in a single log (typically from re-chunked pages) get a
    /// fingerprint-derived suffix so both copies survive the upsert instead
    /// of silently overwriting each other.
    fn disambiguate(&self, record: &ChunkRecord, seen_ids: &mut HashSet<String>) -> String {
        let base = sanitize_vector_id(&record.id);
        let hash = &record.text_hash;

        let mut id = base.clone();
        if !seen_ids.insert(id.clone()) {
            id = sanitize_vector_id(&format!("{}_{}", base, &hash[..8.min(hash.len())]));
            let mut counter = 1usize;
            while !seen_ids.insert(id.clone()) {
                id = sanitize_vector_id(&format!(
                    "{}_{}_{}",
                    base,
                    &hash[..12.min(hash.len())],
                    counter
                ));
                counter += 1;
            }
        }
        id
    }

    /// Embed, upsert, and record one batch as a unit.
    async fn flush(
        &mut self,
        corpus: &str,
        content_type: ContentType,
        batch: &mut Vec<(String, ChunkRecord)>,
        stats: &mut SinkStats,
    ) {
        if batch.is_empty() {
            return;
        }
        let pending = std::mem::take(batch);
        let count = pending.len();

        match self.flush_inner(content_type, pending).await {
            Ok(()) => {
                stats.upserted += count;
                log::debug!("{}: upserted batch of {}", corpus, count);
            }
            Err(e) => {
                log::error!("{}: batch of {} failed, continuing: {}", corpus, count, e);
            }
        }
    }

    async fn flush_inner(
        &mut self,
        content_type: ContentType,
        pending: Vec<(String, ChunkRecord)>,
    ) -> Result<()> {
        let texts: Vec<String> = pending.iter().map(|(_, r)| r.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let mut ids = Vec::with_capacity(pending.len());
        let mut points = Vec::with_capacity(pending.len());
        for ((id, record), values) in pending.into_iter().zip(embeddings) {
            points.push(VectorPoint {
                id: id.clone(),
                values,
                metadata: ChunkMetadata {
                    text: record.text,
                    chunk_type: record.chunk_type,
                    title: record.title,
                    section: record.section,
                    url: record.source_url,
                    lang: record.lang,
                    content_type: content_type.as_str().to_string(),
                    characters: record.characters,
                },
            });
            ids.push(id);
        }

        self.index.upsert(points).await?;
        self.ledger.record(&ids)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LorevatError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct FakeEmbedder {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![0.0f32; 4]).collect())
        }
    }

    struct FakeIndex {
        ids: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl VectorIndex for FakeIndex {
        async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
            if self.fail {
                return Err(LorevatError::Upsert("injected failure".to_string()));
            }
            self.ids.lock().unwrap().extend(points.into_iter().map(|p| p.id));
            Ok(())
        }
    }

    fn record(id: &str, text: &str) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            chunk_type: "books".to_string(),
            title: "Wind Tale".to_string(),
            section: "Story".to_string(),
            source_url: "https://wiki.example.org/wiki/Wind_Tale".to_string(),
            license: "CC BY-SA".to_string(),
            lang: "en".to_string(),
            text: text.to_string(),
            text_hash: crate::ingest::text_fingerprint(text),
            characters: None,
        }
    }

    fn write_log(dir: &TempDir, records: &[ChunkRecord]) -> std::path::PathBuf {
        let path = dir.path().join("books.jsonl");
        ChunkLog::write(&path, records).unwrap();
        path
    }

    const LONG_TEXT: &str = "The wind carried the tale across all seven nations of Teyvat.";

    #[tokio::test]
    async fn test_run_corpus_upserts_new_chunks_in_batches() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_log(
            &temp_dir,
            &[
                record("fandom:books:wind_tale:story:0", LONG_TEXT),
                record("fandom:books:wind_tale:story:1", LONG_TEXT),
                record("fandom:books:wind_tale:story:2", LONG_TEXT),
            ],
        );

        let calls = Arc::new(AtomicUsize::new(0));
        let ids = Arc::new(Mutex::new(Vec::new()));
        let mut sink = EmbedSink::new(
            FakeEmbedder { calls: calls.clone() },
            FakeIndex { ids: ids.clone(), fail: false },
            ProgressLedger::load(temp_dir.path().join("progress.txt")),
            2,
        );

        let stats = sink.run_corpus("books", &path, ContentType::Full).await.unwrap();
        assert_eq!(stats.upserted, 3);
        assert_eq!(stats.already, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2); // batch of 2 + batch of 1
        assert_eq!(ids.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_run_corpus_skips_ledgered_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_log(
            &temp_dir,
            &[
                record("fandom:books:wind_tale:story:0", LONG_TEXT),
                record("fandom:books:wind_tale:story:1", LONG_TEXT),
            ],
        );

        let ledger_path = temp_dir.path().join("progress.txt");
        let mut ledger = ProgressLedger::load(&ledger_path);
        ledger.record(&["fandom:books:wind_tale:story:0".to_string()]).unwrap();

        let ids = Arc::new(Mutex::new(Vec::new()));
        let mut sink = EmbedSink::new(
            FakeEmbedder { calls: Arc::new(AtomicUsize::new(0)) },
            FakeIndex { ids: ids.clone(), fail: false },
            ProgressLedger::load(&ledger_path),
            100,
        );

        let stats = sink.run_corpus("books", &path, ContentType::Full).await.unwrap();
        assert_eq!(stats.already, 1);
        assert_eq!(stats.upserted, 1);
        assert_eq!(ids.lock().unwrap().as_slice(), ["fandom:books:wind_tale:story:1"]);
    }

    #[tokio::test]
    async fn test_run_corpus_filters_low_quality_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_log(
            &temp_dir,
            &[
                record("fandom:books:wind_tale:story:0", "ab cd"),
                record("fandom:books:wind_tale:gallery:0", "Gallery"),
                record("fandom:books:wind_tale:story:1", LONG_TEXT),
            ],
        );

        let mut sink = EmbedSink::new(
            FakeEmbedder { calls: Arc::new(AtomicUsize::new(0)) },
            FakeIndex { ids: Arc::new(Mutex::new(Vec::new())), fail: false },
            ProgressLedger::load(temp_dir.path().join("progress.txt")),
            100,
        );

        let stats = sink.run_corpus("books", &path, ContentType::Full).await.unwrap();
        assert_eq!(stats.filtered, 2);
        assert_eq!(stats.upserted, 1);
    }

    #[tokio::test]
    async fn test_duplicate_ids_get_fingerprint_suffix() {
        let temp_dir = TempDir::new().unwrap();
        let dup_a = record("fandom:books:wind_tale:story:0", LONG_TEXT);
        let dup_b = record(
            "fandom:books:wind_tale:story:0",
            "A different telling of the same tale, preserved in Liyue's archives.",
        );
        let path = write_log(&temp_dir, &[dup_a, dup_b.clone()]);

        let ids = Arc::new(Mutex::new(Vec::new()));
        let mut sink = EmbedSink::new(
            FakeEmbedder { calls: Arc::new(AtomicUsize::new(0)) },
            FakeIndex { ids: ids.clone(), fail: false },
            ProgressLedger::load(temp_dir.path().join("progress.txt")),
            100,
        );

        let stats = sink.run_corpus("books", &path, ContentType::Full).await.unwrap();
        assert_eq!(stats.upserted, 2);

        let upserted = ids.lock().unwrap().clone();
        assert_eq!(upserted[0], "fandom:books:wind_tale:story:0");
        let expected_suffix = &dup_b.text_hash[..8];
        assert_eq!(upserted[1], format!("fandom:books:wind_tale:story:0_{}", expected_suffix));
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_the_stream() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_log(
            &temp_dir,
            &[
                record("fandom:books:wind_tale:story:0", LONG_TEXT),
                record("fandom:books:wind_tale:story:1", LONG_TEXT),
            ],
        );

        let mut sink = EmbedSink::new(
            FakeEmbedder { calls: Arc::new(AtomicUsize::new(0)) },
            FakeIndex { ids: Arc::new(Mutex::new(Vec::new())), fail: true },
            ProgressLedger::load(temp_dir.path().join("progress.txt")),
            1,
        );

        let stats = sink.run_corpus("books", &path, ContentType::Full).await.unwrap();
        assert_eq!(stats.upserted, 0);
        // Nothing was recorded, so a later run retries everything
        assert!(sink.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_lines_are_counted_and_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("books.jsonl");
        let good = serde_json::to_string(&record("fandom:books:wind_tale:story:0", LONG_TEXT))
            .unwrap();
        std::fs::write(&path, format!("{}\nnot json\n", good)).unwrap();

        let mut sink = EmbedSink::new(
            FakeEmbedder { calls: Arc::new(AtomicUsize::new(0)) },
            FakeIndex { ids: Arc::new(Mutex::new(Vec::new())), fail: false },
            ProgressLedger::load(temp_dir.path().join("progress.txt")),
            100,
        );

        let stats = sink.run_corpus("books", &path, ContentType::Full).await.unwrap();
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.upserted, 1);
    }
}
