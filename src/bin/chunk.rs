use anyhow::Result;
use clap::Parser;
use lorevat::harvest::{self, Corpus, PageLog};
use lorevat::ingest::{chunk_page_log, ChunkLog, ExtractionRules, IdRegistry};
use lorevat::summaries::{self, chunk_summaries, SummaryStore, SUMMARY_CORPORA};
use lorevat::Config;

#[derive(Parser, Debug)]
#[command(name = "chunk")]
#[command(about = "Turn harvested page logs into chunk logs with stable vector ids")]
struct Args {
    /// Chunk only this category (e.g. characters, books, story_quests)
    #[arg(short, long)]
    category: Option<String>,

    /// Skip the derived summary corpora
    #[arg(long)]
    no_summaries: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load()?;
    log::info!(
        "Chunking with size {} / overlap {}",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );

    let corpora: Vec<Corpus> = match &args.category {
        Some(key) => {
            let corpus = Corpus::from_key(key)
                .ok_or_else(|| anyhow::anyhow!("Unknown category: {}", key))?;
            vec![corpus]
        }
        None => Corpus::ALL.to_vec(),
    };

    let rules = ExtractionRules::fandom();
    // One registry across every corpus so ids are unique pipeline-wide
    let mut registry = IdRegistry::new();
    let mut total = 0usize;

    for corpus in &corpora {
        let page_log = PageLog::new(harvest::log_path(&config.interim_dir(), *corpus));
        if !page_log.path().exists() {
            log::warn!("{}: no page log at {}, skipping", corpus, page_log.path().display());
            continue;
        }
        let out = config.jsonl_dir().join(format!("{}.jsonl", corpus.as_str()));
        total += chunk_page_log(
            &page_log,
            corpus.as_str(),
            &out,
            &rules,
            &config.chunking,
            &mut registry,
        )?;
    }

    if !args.no_summaries && args.category.is_none() {
        for corpus in SUMMARY_CORPORA {
            let store =
                SummaryStore::load(summaries::store_path(&config.summaries_dir(), corpus));
            if store.is_empty() {
                log::warn!("{}: no summary store, skipping", corpus);
                continue;
            }
            let chunks =
                chunk_summaries(store.records(), corpus.as_str(), &config.chunking, &mut registry);
            let out = config.jsonl_dir().join(format!("{}_summaries.jsonl", corpus.as_str()));
            ChunkLog::write(&out, &chunks)?;
            log::info!("{}: wrote {} summary chunks -> {}", corpus, chunks.len(), out.display());
            total += chunks.len();
        }
    }

    log::info!("Chunking complete: {} chunks total", total);
    Ok(())
}
