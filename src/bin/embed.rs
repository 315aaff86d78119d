use anyhow::Result;
use clap::Parser;
use lorevat::embed::{ContentType, EmbedSink, OpenAiEmbedder, PineconeIndex, ProgressLedger};
use lorevat::harvest::Corpus;
use lorevat::summaries::SUMMARY_CORPORA;
use lorevat::Config;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "embed")]
#[command(about = "Embed chunk logs and upsert them into the vector index (resumable)")]
struct Args {
    /// Embed only this category (e.g. characters, or story_quests_summaries)
    #[arg(short, long)]
    category: Option<String>,

    /// Skip the derived summary corpora
    #[arg(long)]
    no_summaries: bool,
}

/// Every embeddable corpus: (label, chunk log file name, content class).
fn corpus_plan(include_summaries: bool) -> Vec<(String, String, ContentType)> {
    let mut plan: Vec<(String, String, ContentType)> = Corpus::ALL
        .iter()
        .map(|c| {
            (c.as_str().to_string(), format!("{}.jsonl", c.as_str()), ContentType::Full)
        })
        .collect();
    if include_summaries {
        for corpus in SUMMARY_CORPORA {
            plan.push((
                format!("{}_summaries", corpus.as_str()),
                format!("{}_summaries.jsonl", corpus.as_str()),
                ContentType::Summary,
            ));
        }
    }
    plan
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load()?;

    // Fail before any network work if either key is absent
    let openai_key = config.require_env(&config.embeddings.api_key_env)?;
    let pinecone_key = config.require_env(&config.index.api_key_env)?;

    log::info!("Embedding with {} ({})", config.embeddings.model, config.embeddings.provider);
    log::info!("Index host: {}", config.index.host);

    let embedder = OpenAiEmbedder::new(openai_key, config.embeddings.model.clone(), 5)?;
    let index = PineconeIndex::new(
        config.index.host.clone(),
        pinecone_key,
        config.index.namespace.clone(),
    )?;
    let ledger = ProgressLedger::load(config.progress_file());
    log::info!("{} chunks already embedded per the progress ledger", ledger.len());

    let mut sink = EmbedSink::new(embedder, index, ledger, config.embeddings.batch_size);

    let plan = corpus_plan(!args.no_summaries);
    let plan: Vec<_> = match &args.category {
        Some(key) => {
            let selected: Vec<_> = plan.into_iter().filter(|(label, _, _)| label == key).collect();
            if !selected.is_empty() {
                selected
            } else {
                // Free-form corpus: any chunk log dropped into the jsonl dir
                let file_name = format!("{}.jsonl", key);
                if !config.jsonl_dir().join(&file_name).exists() {
                    anyhow::bail!("Unknown category: {}", key);
                }
                vec![(key.clone(), file_name, ContentType::Misc)]
            }
        }
        None => plan,
    };

    let start = Instant::now();
    let mut upserted = 0usize;
    for (label, file_name, content_type) in plan {
        let path: PathBuf = config.jsonl_dir().join(&file_name);
        if !path.exists() {
            log::warn!("{}: no chunk log at {}, skipping", label, path.display());
            continue;
        }
        let stats = sink.run_corpus(&label, &path, content_type).await?;
        upserted += stats.upserted;
    }

    log::info!(
        "Embedding complete: {} chunks upserted in {:.1}s",
        upserted,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
