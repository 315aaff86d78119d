pub mod links;
pub mod page_log;

pub use links::quest_links_from_html;
pub use page_log::{PageLog, PageRecord};

use crate::error::{LorevatError, Result};
use crate::wiki::WikiClient;
use std::collections::BTreeSet;
use std::path::Path;

/// The fixed corpora harvested from wiki categories.
///
/// Derived summary and miscellaneous corpora (e.g. "archon_quests_summaries")
/// exist only at the chunk/embed stages and are named by free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corpus {
    Characters,
    ArchonQuests,
    StoryQuests,
    WorldQuests,
    QuestActs,
    Books,
}

impl Corpus {
    pub const ALL: [Corpus; 6] = [
        Corpus::Characters,
        Corpus::ArchonQuests,
        Corpus::StoryQuests,
        Corpus::WorldQuests,
        Corpus::QuestActs,
        Corpus::Books,
    ];

    /// Corpus key used in file names and chunk ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            Corpus::Characters => "characters",
            Corpus::ArchonQuests => "archon_quests",
            Corpus::StoryQuests => "story_quests",
            Corpus::WorldQuests => "world_quests",
            Corpus::QuestActs => "quest_acts",
            Corpus::Books => "books",
        }
    }

    /// Full wiki category title for enumeration.
    pub fn category_title(&self) -> &'static str {
        match self {
            Corpus::Characters => "Category:Characters",
            Corpus::ArchonQuests => "Category:Archon Quests",
            Corpus::StoryQuests => "Category:Story Quests",
            Corpus::WorldQuests => "Category:World Quests",
            Corpus::QuestActs => "Category:Quest_Acts",
            Corpus::Books => "Category:Books",
        }
    }

    /// List page that enumerates quests beyond the category, if any.
    pub fn quest_list_page(&self) -> Option<&'static str> {
        match self {
            Corpus::StoryQuests => Some("Story_Quest/List"),
            Corpus::WorldQuests => Some("World_Quest/List"),
            Corpus::ArchonQuests => Some("Archon_Quest"),
            _ => None,
        }
    }

    /// Quest corpora whose list-page links are merged into the member set.
    fn merges_list_links(&self) -> bool {
        matches!(self, Corpus::StoryQuests | Corpus::WorldQuests)
    }

    pub fn from_key(key: &str) -> Option<Corpus> {
        Corpus::ALL.iter().copied().find(|c| c.as_str() == key)
    }
}

impl std::fmt::Display for Corpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Character sub-pages harvested alongside each character page.
const CHARACTER_SUBPAGES: &[&str] = &["Profile", "Voice-Over"];

/// Per-category harvest counters, logged at stage end.
#[derive(Debug, Default, Clone, Copy)]
pub struct HarvestStats {
    pub total: usize,
    pub fetched: usize,
    pub already_logged: usize,
    pub missing: usize,
    pub failed: usize,
}

/// Harvest one category into its page log.
///
/// Consults the existing log first so `(category, title)` entries are never
/// duplicated. A failed fetch skips that page and keeps going; only I/O
/// errors on the log itself abort the category.
pub async fn run_category(
    client: &WikiClient,
    log: &PageLog,
    corpus: Corpus,
    max_pages: Option<usize>,
) -> Result<HarvestStats> {
    let mut processed = log.load_titles()?;
    log::info!(
        "{}: {} already-processed pages in {}",
        corpus,
        processed.len(),
        log.path().display()
    );

    let mut stats = HarvestStats::default();
    let mut list_links: BTreeSet<String> = BTreeSet::new();

    if let Some(list_title) = corpus.quest_list_page() {
        let mut list_html: Option<String> = None;

        if !processed.contains(list_title) {
            match client.page_html(list_title).await {
                Ok(Some(html)) => {
                    append_page(client, log, corpus, list_title, &html)?;
                    processed.insert(list_title.to_string());
                    stats.fetched += 1;
                    log::info!("{}: fetched list page {}", corpus, list_title);
                    list_html = Some(html);
                }
                Ok(None) => log::warn!("{}: list page {} does not exist", corpus, list_title),
                Err(LorevatError::Fetch(e)) => {
                    log::warn!("{}: failed to fetch list page {}: {}", corpus, list_title, e)
                }
                Err(e) => return Err(e),
            }
        }

        if corpus.merges_list_links() {
            // Re-fetch when the list page was already logged in a prior run
            if list_html.is_none() {
                match client.page_html(list_title).await {
                    Ok(html) => list_html = html,
                    Err(LorevatError::Fetch(e)) => {
                        log::warn!("{}: list page {} unavailable for link extraction: {}", corpus, list_title, e)
                    }
                    Err(e) => return Err(e),
                }
            }
            if let Some(html) = &list_html {
                list_links = quest_links_from_html(html, client.base_url());
                log::info!("{}: extracted {} quest links from {}", corpus, list_links.len(), list_title);
            }
        }
    }

    let members = client.category_members(corpus.category_title(), max_pages).await?;
    let mut titles: BTreeSet<String> = members.into_iter().map(|m| m.title).collect();
    if !list_links.is_empty() {
        let category_count = titles.len();
        titles.extend(list_links.iter().cloned());
        log::info!(
            "{}: category has {} pages, list page adds {} links, {} unique total",
            corpus,
            category_count,
            list_links.len(),
            titles.len()
        );
    }
    stats.total = titles.len();

    for title in titles {
        if processed.contains(&title) {
            stats.already_logged += 1;
            continue;
        }

        match client.page_html(&title).await {
            Ok(Some(html)) => {
                append_page(client, log, corpus, &title, &html)?;
                processed.insert(title.clone());
                stats.fetched += 1;
            }
            Ok(None) => {
                stats.missing += 1;
                continue;
            }
            Err(LorevatError::Fetch(e)) => {
                log::warn!("{}: failed to fetch {} after retries: {}", corpus, title, e);
                stats.failed += 1;
                continue;
            }
            Err(e) => return Err(e),
        }

        if corpus == Corpus::Characters {
            for subpage in CHARACTER_SUBPAGES {
                let subpage_title = format!("{}/{}", title, subpage);
                if processed.contains(&subpage_title) {
                    continue;
                }
                match client.page_html(&subpage_title).await {
                    Ok(Some(html)) => {
                        append_page(client, log, corpus, &subpage_title, &html)?;
                        processed.insert(subpage_title);
                        stats.fetched += 1;
                    }
                    Ok(None) => {}
                    Err(LorevatError::Fetch(e)) => {
                        log::warn!("{}: failed to fetch subpage {}: {}", corpus, subpage_title, e);
                        stats.failed += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    log::info!(
        "{}: {} fetched, {} already logged, {} missing, {} failed ({} total) -> {}",
        corpus,
        stats.fetched,
        stats.already_logged,
        stats.missing,
        stats.failed,
        stats.total,
        log.path().display()
    );
    Ok(stats)
}

fn append_page(
    client: &WikiClient,
    log: &PageLog,
    corpus: Corpus,
    title: &str,
    html: &str,
) -> Result<()> {
    log.append(&PageRecord {
        title: title.to_string(),
        category: corpus.as_str().to_string(),
        url: WikiClient::canonical_url(client.base_url(), title),
        html: html.to_string(),
    })
}

/// Page log path for one corpus under the interim directory.
pub fn log_path(interim_dir: &Path, corpus: Corpus) -> std::path::PathBuf {
    interim_dir.join(format!("{}.ndjson", corpus.as_str()))
}
