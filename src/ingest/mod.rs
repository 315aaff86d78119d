pub mod chunk_log;
pub mod chunker;
pub mod identity;
pub mod normalize;
pub mod sections;

pub use chunk_log::{ChunkLog, ChunkRecord, ChunkStream};
pub use chunker::{passes_quality_gate, split_text};
pub use identity::{
    chunk_base_id, sanitize_slug, sanitize_vector_id, text_fingerprint, IdRegistry, MAX_ID_BYTES,
};
pub use normalize::{lines_to_markdownish, normalize, ExtractionRules, Line};
pub use sections::{split_sections, Section, OVERVIEW_SECTION};

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::harvest::{PageLog, PageRecord};
use std::path::Path;

/// Run one page through the full offline pipeline:
/// normalize → split sections → window → assign identities.
///
/// Sequence indices restart at zero per section and follow document order,
/// so ids are deterministic for fixed content and chunking parameters.
pub fn chunk_page(
    page: &PageRecord,
    corpus: &str,
    rules: &ExtractionRules,
    config: &ChunkingConfig,
    registry: &mut IdRegistry,
) -> Vec<ChunkRecord> {
    let lines = normalize(&page.html, rules);
    let sections = split_sections(&lines);

    let mut records = Vec::new();
    for section in &sections {
        for (seq, text) in split_text(&section.body, config).into_iter().enumerate() {
            let fingerprint = text_fingerprint(&text);
            let base = chunk_base_id(corpus, &page.title, &section.name, seq);
            let id = registry.issue(&base, Some(&fingerprint));
            records.push(ChunkRecord {
                id,
                chunk_type: corpus.to_string(),
                title: page.title.clone(),
                section: section.name.clone(),
                source_url: page.url.clone(),
                license: "CC BY-SA".to_string(),
                lang: "en".to_string(),
                text,
                text_hash: fingerprint,
                characters: None,
            });
        }
    }
    records
}

/// Chunk every page in a category's page log and rewrite the corpus chunk
/// log. Returns the number of chunks written.
pub fn chunk_page_log(
    page_log: &PageLog,
    corpus: &str,
    out_path: &Path,
    rules: &ExtractionRules,
    config: &ChunkingConfig,
    registry: &mut IdRegistry,
) -> Result<usize> {
    let mut records = Vec::new();
    for page in page_log.records()? {
        records.extend(chunk_page(&page, corpus, rules, config, registry));
    }
    ChunkLog::write(out_path, &records)?;
    log::info!("{}: wrote {} chunks -> {}", corpus, records.len(), out_path.display());
    Ok(records.len())
}
