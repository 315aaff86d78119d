use crate::config::ChunkingConfig;
use crate::error::{LorevatError, Result};
use crate::harvest::{quest_links_from_html, Corpus};
use crate::ingest::{chunk_base_id, split_text, text_fingerprint, ChunkRecord, IdRegistry};
use crate::wiki::WikiClient;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Quest corpora with summary extraction, in processing order.
pub const SUMMARY_CORPORA: [Corpus; 3] =
    [Corpus::StoryQuests, Corpus::ArchonQuests, Corpus::WorldQuests];

/// Headings treated as a quest's summary section (substring, case-insensitive).
const SUMMARY_KEYWORDS: &[&str] =
    &["summary", "synopsis", "plot", "overview", "description", "quest description"];

/// Headings treated as a quest's character list.
const CHARACTER_KEYWORDS: &[&str] =
    &["characters", "character", "cast", "characters involved", "characters in quest"];

/// One extracted quest summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub title: String,
    pub url: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<String>,
}

/// Derived summary store: a JSON array keyed by quest title, rewritten
/// wholesale on each incremental save.
///
/// Loading an existing store lets an interrupted extraction resume without
/// reprocessing known titles. Only that observable behavior matters; the
/// flat-array serialization is just the simplest durable shape for it.
pub struct SummaryStore {
    path: PathBuf,
    records: Vec<SummaryRecord>,
}

impl SummaryStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<SummaryRecord>>(&content) {
                Ok(records) => records,
                Err(e) => {
                    log::warn!("Could not parse {}, starting fresh: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self { path, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[SummaryRecord] {
        &self.records
    }

    pub fn titles(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.title.clone()).collect()
    }

    pub fn push(&mut self, record: SummaryRecord) {
        self.records.push(record);
    }

    /// Rewrite the whole store file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

fn find_section_index<'a>(sections: &'a [(String, String)], keywords: &[&str]) -> Option<&'a str> {
    sections
        .iter()
        .find(|(name, _)| {
            let lower = name.to_lowercase();
            keywords.iter().any(|k| lower.contains(k))
        })
        .map(|(_, index)| index.as_str())
}

/// Store file path for one corpus's summaries.
pub fn store_path(summaries_dir: &Path, corpus: Corpus) -> PathBuf {
    summaries_dir.join(format!("{}_summaries.json", corpus.as_str()))
}

/// Extract quest summaries (and character lists) for the quest corpora.
///
/// Walks each quest list page, resolves quest links, and pulls the summary
/// and characters sections per quest via the section API. Saves the store
/// incrementally every `save_interval` new summaries and once at the end.
/// A single quest's fetch failure skips that quest only.
pub async fn extract_summaries(
    client: &WikiClient,
    summaries_dir: &Path,
    save_interval: usize,
) -> Result<()> {
    let save_interval = save_interval.max(1);
    for corpus in SUMMARY_CORPORA {
        let Some(list_title) = corpus.quest_list_page() else {
            continue;
        };

        let html = match client.page_html(list_title).await {
            Ok(Some(html)) => html,
            Ok(None) => {
                log::warn!("{}: list page {} does not exist", corpus, list_title);
                continue;
            }
            Err(e @ (LorevatError::Fetch(_) | LorevatError::Parse(_))) => {
                log::warn!("{}: could not fetch list page {}: {}", corpus, list_title, e);
                continue;
            }
            Err(e) => return Err(e),
        };

        let mut titles = quest_links_from_html(&html, client.base_url());
        let mut store = SummaryStore::load(store_path(summaries_dir, corpus));
        if !store.is_empty() {
            let known = store.titles();
            titles.retain(|t| !known.contains(t));
            log::info!(
                "{}: resuming with {} existing summaries, {} titles remaining",
                corpus,
                store.len(),
                titles.len()
            );
        }

        let mut skipped = 0usize;
        let mut extracted = 0usize;
        for title in titles {
            // A broken page (unfetchable or an unparseable API payload) skips
            // that quest only; the rest of the list still gets processed.
            let summary = match extract_keyword_section(client, &title, SUMMARY_KEYWORDS).await {
                Ok(summary) => summary,
                Err(e @ (LorevatError::Fetch(_) | LorevatError::Parse(_))) => {
                    log::warn!("{}: skipping {}: {}", corpus, title, e);
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let Some(summary) = summary.filter(|s| !s.trim().is_empty()) else {
                skipped += 1;
                continue;
            };

            // Best effort; a missing characters section is not a skip
            let characters = extract_keyword_section(client, &title, CHARACTER_KEYWORDS)
                .await
                .unwrap_or(None);

            store.push(SummaryRecord {
                url: WikiClient::canonical_url(client.base_url(), &title),
                title,
                summary,
                characters,
            });
            extracted += 1;

            if store.len() % save_interval == 0 {
                store.save()?;
            }
        }

        store.save()?;
        log::info!(
            "{}: {} summaries extracted, {} skipped (no summary or unavailable), {} total in store",
            corpus,
            extracted,
            skipped,
            store.len()
        );
    }
    Ok(())
}

async fn extract_keyword_section(
    client: &WikiClient,
    title: &str,
    keywords: &[&str],
) -> Result<Option<String>> {
    let Some(sections) = client.page_sections(title).await? else {
        return Ok(None);
    };
    let Some(index) = find_section_index(&sections, keywords) else {
        return Ok(None);
    };
    client.page_section_text(title, index).await
}

/// Chunk a corpus's summary store into chunk records.
///
/// Ids follow `fandom:<corpus>_summaries:<title_slug>:summary:<seq>`; the
/// chunk type carries the `_summaries` suffix so retrieval can filter on it.
pub fn chunk_summaries(
    records: &[SummaryRecord],
    corpus: &str,
    config: &ChunkingConfig,
    registry: &mut IdRegistry,
) -> Vec<ChunkRecord> {
    let summary_corpus = format!("{}_summaries", corpus);
    let mut out = Vec::new();

    for record in records {
        if record.summary.trim().is_empty() {
            continue;
        }
        for (seq, text) in split_text(&record.summary, config).into_iter().enumerate() {
            let fingerprint = text_fingerprint(&text);
            let base = chunk_base_id(&summary_corpus, &record.title, "Summary", seq);
            let id = registry.issue(&base, Some(&fingerprint));
            out.push(ChunkRecord {
                id,
                chunk_type: summary_corpus.clone(),
                title: record.title.clone(),
                section: "Summary".to_string(),
                source_url: record.url.clone(),
                license: "CC BY-SA".to_string(),
                lang: "en".to_string(),
                text,
                text_hash: fingerprint,
                characters: record.characters.clone(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WikiConfig;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(title: &str) -> SummaryRecord {
        SummaryRecord {
            title: title.to_string(),
            url: format!("https://wiki.example.org/wiki/{}", title.replace(' ', "_")),
            summary: "The Traveler arrives in Mondstadt and meets Paimon near a lake.".to_string(),
            characters: Some("Traveler, Paimon".to_string()),
        }
    }

    #[test]
    fn test_store_round_trip_and_resume() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("story_quests_summaries.json");

        let mut store = SummaryStore::load(&path);
        assert!(store.is_empty());
        store.push(record("Bough Keeper"));
        store.push(record("The Outlander"));
        store.save().unwrap();

        let reloaded = SummaryStore::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.titles().contains("Bough Keeper"));
        assert_eq!(reloaded.records()[0].characters.as_deref(), Some("Traveler, Paimon"));
    }

    #[test]
    fn test_store_tolerates_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        std::fs::write(&path, "{broken").unwrap();
        let store = SummaryStore::load(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn test_find_section_index_prefers_document_order() {
        let sections = vec![
            ("Rewards".to_string(), "1".to_string()),
            ("Quest Description".to_string(), "2".to_string()),
            ("Synopsis".to_string(), "3".to_string()),
        ];
        assert_eq!(find_section_index(&sections, SUMMARY_KEYWORDS), Some("2"));
        assert_eq!(find_section_index(&sections, CHARACTER_KEYWORDS), None);
    }

    #[tokio::test]
    async fn test_extract_summaries_skips_quest_with_unparseable_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/rest.php/v1/page/Story_Quest");
                then.status(200).body(
                    "<div class=\"mw-parser-output\"><ul>\
                     <li><a href=\"/wiki/Broken_Quest\">Broken Quest</a></li>\
                     <li><a href=\"/wiki/Healthy_Quest\">Healthy Quest</a></li>\
                     </ul></div>",
                );
            })
            .await;
        // First quest's section list is not valid JSON
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api.php").query_param("page", "Broken Quest");
                then.status(200).body("this is not json");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api.php")
                    .query_param("page", "Healthy Quest")
                    .query_param("prop", "sections");
                then.status(200).json_body(json!({
                    "parse": {"sections": [{"line": "Summary", "index": "1"}]}
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api.php")
                    .query_param("page", "Healthy Quest")
                    .query_param("prop", "text")
                    .query_param("section", "1");
                then.status(200).json_body(json!({
                    "parse": {"text": "<p>The Traveler follows the wind to a ruined shrine.</p>"}
                }));
            })
            .await;

        let client = WikiClient::new(&WikiConfig {
            base_url: server.base_url(),
            user_agent: "lorevat/0.3 (test)".to_string(),
            timeout_secs: 5,
            max_retries: 2,
            rate_limit_rps: 0.0,
        })
        .unwrap();

        let temp_dir = TempDir::new().unwrap();
        extract_summaries(&client, temp_dir.path(), 10).await.unwrap();

        let store = SummaryStore::load(store_path(temp_dir.path(), Corpus::StoryQuests));
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].title, "Healthy Quest");
        assert!(store.records()[0].summary.contains("ruined shrine"));
    }

    #[test]
    fn test_chunk_summaries_id_scheme() {
        let mut registry = IdRegistry::new();
        let config = ChunkingConfig { chunk_size: 3200, chunk_overlap: 600 };
        let chunks = chunk_summaries(&[record("Bough Keeper")], "story_quests", &config, &mut registry);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "fandom:story_quests_summaries:bough_keeper:summary:0");
        assert_eq!(chunks[0].chunk_type, "story_quests_summaries");
        assert_eq!(chunks[0].section, "Summary");
        assert_eq!(chunks[0].characters.as_deref(), Some("Traveler, Paimon"));
    }

    #[test]
    fn test_chunk_summaries_skips_empty_summaries() {
        let mut registry = IdRegistry::new();
        let config = ChunkingConfig { chunk_size: 3200, chunk_overlap: 600 };
        let mut empty = record("Empty Quest");
        empty.summary = "   ".to_string();
        let chunks = chunk_summaries(&[empty], "story_quests", &config, &mut registry);
        assert!(chunks.is_empty());
    }
}
