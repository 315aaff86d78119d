use anyhow::Result;
use clap::Parser;
use lorevat::harvest::{self, Corpus};
use lorevat::summaries::extract_summaries;
use lorevat::wiki::WikiClient;
use lorevat::Config;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(about = "Fetch wiki pages per category into newline-delimited page logs")]
struct Args {
    /// Harvest only this category (e.g. characters, books, story_quests)
    #[arg(short, long)]
    category: Option<String>,

    /// Cap the number of category members fetched per category
    #[arg(long)]
    max_pages: Option<usize>,

    /// Also extract quest summaries after harvesting
    #[arg(long)]
    summaries: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load()?;
    log::info!("Harvesting from {}", config.wiki.base_url);
    log::info!("Page logs: {}", config.interim_dir().display());

    let client = WikiClient::new(&config.wiki)?;

    let corpora: Vec<Corpus> = match &args.category {
        Some(key) => {
            let corpus = Corpus::from_key(key)
                .ok_or_else(|| anyhow::anyhow!("Unknown category: {}", key))?;
            vec![corpus]
        }
        None => Corpus::ALL.to_vec(),
    };

    let start = Instant::now();
    for corpus in corpora {
        let log = harvest::PageLog::new(harvest::log_path(&config.interim_dir(), corpus));
        let stats = harvest::run_category(&client, &log, corpus, args.max_pages).await?;
        log::info!(
            "{}: {} fetched, {} already logged, {} missing, {} failed ({} members)",
            corpus,
            stats.fetched,
            stats.already_logged,
            stats.missing,
            stats.failed,
            stats.total
        );
    }

    if args.summaries {
        log::info!("Extracting quest summaries");
        extract_summaries(&client, &config.summaries_dir(), 10).await?;
    }

    log::info!("Harvest complete in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}
