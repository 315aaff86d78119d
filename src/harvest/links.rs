use crate::wiki::WikiClient;
use scraper::{Html, Selector};
use std::collections::BTreeSet;

/// Wiki namespaces that never contain quest content.
const SKIP_PREFIXES: &[&str] = &[
    "File:",
    "Category:",
    "Template:",
    "User:",
    "Help:",
    "Special:",
    "MediaWiki:",
];

/// Titles of the quest list pages themselves, which link extraction must not
/// re-feed into the harvest.
const LIST_PAGE_TITLES: &[&str] = &[
    "story quest/list",
    "world quest/list",
    "archon quest",
    "story quest",
    "world quest",
];

/// Extract quest page titles from a quest list page's HTML.
///
/// Looks at anchors in the main content area, preferring links inside `<ul>`
/// lists (the list pages organize quests that way), and normalizes each href
/// to a wiki title. Skips namespaced pages, anchors, the list pages
/// themselves, and implausibly short titles.
pub fn quest_links_from_html(html: &str, base_url: &str) -> BTreeSet<String> {
    let document = Html::parse_document(html);
    let content_selector = Selector::parse("div.mw-parser-output, div#content").unwrap();
    let list_anchor_selector = Selector::parse("ul a[href]").unwrap();
    let anchor_selector = Selector::parse("a[href]").unwrap();

    let mut titles = BTreeSet::new();

    let hrefs: Vec<String> = match document.select(&content_selector).next() {
        Some(content) => {
            let from_lists: Vec<String> = content
                .select(&list_anchor_selector)
                .filter_map(|a| a.value().attr("href"))
                .map(str::to_string)
                .collect();
            if !from_lists.is_empty() {
                from_lists
            } else {
                content
                    .select(&anchor_selector)
                    .filter_map(|a| a.value().attr("href"))
                    .map(str::to_string)
                    .collect()
            }
        }
        None => document
            .select(&anchor_selector)
            .filter_map(|a| a.value().attr("href"))
            .map(str::to_string)
            .collect(),
    };

    for href in hrefs {
        if let Some(title) = title_from_href(&href, base_url) {
            titles.insert(title);
        }
    }

    titles
}

/// Resolve an anchor href to a normalized wiki title, or `None` if the link
/// is external, namespaced, or a list page.
fn title_from_href(href: &str, base_url: &str) -> Option<String> {
    let wiki_path = if let Some(rest) = href.strip_prefix("./") {
        format!("/wiki/{}", rest)
    } else if href.starts_with("/wiki/") {
        href.to_string()
    } else if href.contains(base_url) && href.contains("/wiki/") {
        let (_, rest) = href.split_once("/wiki/")?;
        format!("/wiki/{}", rest)
    } else {
        return None;
    };

    let title_part = wiki_path.strip_prefix("/wiki/")?;
    if SKIP_PREFIXES.iter().any(|p| title_part.starts_with(p)) {
        return None;
    }

    // Drop anchor fragments and query parameters
    let title_part = title_part.split('#').next()?.split('?').next()?;
    if title_part.is_empty() {
        return None;
    }

    let decoded = urlencoding::decode(title_part).ok()?;
    let title = decoded.replace('_', " ");
    let title = title.trim();
    if title.len() < 3 {
        return None;
    }

    let lower = title.to_lowercase();
    if SKIP_PREFIXES.iter().any(|p| lower.contains(&p.to_lowercase())) {
        return None;
    }
    if LIST_PAGE_TITLES.contains(&lower.as_str()) {
        return None;
    }

    Some(WikiClient::normalize_title(title))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://genshin-impact.fandom.com";

    #[test]
    fn test_extracts_titles_from_ul_links() {
        let html = r#"
            <div class="mw-parser-output">
                <p><a href="/wiki/Not_In_A_List">Stray link</a></p>
                <ul>
                    <li><a href="./Bough_Keeper">Bough Keeper</a></li>
                    <li><a href="/wiki/One_Giant_Step_for_Alchemy%3F">Alchemy</a></li>
                    <li><a href="https://genshin-impact.fandom.com/wiki/The_Outlander">Outlander</a></li>
                </ul>
            </div>
        "#;
        let titles = quest_links_from_html(html, BASE);
        assert_eq!(titles.len(), 3);
        assert!(titles.contains("Bough Keeper"));
        assert!(titles.contains("One Giant Step for Alchemy?"));
        assert!(titles.contains("The Outlander"));
        // Links outside lists are ignored when list links exist
        assert!(!titles.contains("Not In A List"));
    }

    #[test]
    fn test_falls_back_to_all_content_links() {
        let html = r#"
            <div class="mw-parser-output">
                <p><a href="/wiki/Lone_Quest">Lone Quest</a></p>
            </div>
        "#;
        let titles = quest_links_from_html(html, BASE);
        assert!(titles.contains("Lone Quest"));
    }

    #[test]
    fn test_skips_namespaced_and_list_pages() {
        let html = r#"
            <div class="mw-parser-output">
                <ul>
                    <li><a href="/wiki/File:Map.png">image</a></li>
                    <li><a href="/wiki/Category:Quests">cat</a></li>
                    <li><a href="/wiki/Story_Quest/List">list</a></li>
                    <li><a href="/wiki/Template:Quest">tpl</a></li>
                    <li><a href="https://other.example.org/wiki/External">ext</a></li>
                    <li><a href="/wiki/Ok_Quest#Rewards">anchored</a></li>
                </ul>
            </div>
        "#;
        let titles = quest_links_from_html(html, BASE);
        assert_eq!(titles.len(), 1);
        assert!(titles.contains("Ok Quest"));
    }

    #[test]
    fn test_skips_too_short_titles() {
        assert!(title_from_href("/wiki/Ab", BASE).is_none());
        assert_eq!(title_from_href("/wiki/abc", BASE).as_deref(), Some("Abc"));
    }
}
