use scraper::{ElementRef, Html, Selector};

/// One typed line of normalized page content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Section heading with its level (2, 3, or 4)
    Heading { level: u8, text: String },
    /// Paragraph or list-item text
    Text(String),
}

/// Site-specific extraction rules: CSS selectors for boilerplate regions to
/// drop before text extraction.
///
/// The identity/chunking core is decoupled from any one markup convention;
/// a new source site supplies its own rule set instead of new code.
pub struct ExtractionRules {
    remove: Vec<Selector>,
}

/// Boilerplate regions on Fandom-style MediaWiki pages: tables and infoboxes,
/// navigation boxes, citation blocks, image thumbnails and galleries,
/// disambiguation notes, and embedded scripts/styles.
const FANDOM_REMOVE_SELECTORS: &[&str] = &[
    "table",
    ".portable-infobox",
    ".navbox",
    ".infobox",
    ".reference",
    ".mw-references-wrap",
    ".mw-cite-backlink",
    ".thumb",
    ".gallery",
    ".dablink",
    ".hatnote",
    "script",
    "style",
];

impl ExtractionRules {
    /// Build rules from CSS selectors. Unparsable selectors are logged and
    /// dropped so a bad rule never fails a page.
    pub fn new(remove_selectors: &[&str]) -> Self {
        let remove = remove_selectors
            .iter()
            .filter_map(|s| match Selector::parse(s) {
                Ok(sel) => Some(sel),
                Err(e) => {
                    log::warn!("Ignoring invalid removal selector {:?}: {:?}", s, e);
                    None
                }
            })
            .collect();
        Self { remove }
    }

    /// Default rules for Fandom-hosted MediaWiki pages.
    pub fn fandom() -> Self {
        Self::new(FANDOM_REMOVE_SELECTORS)
    }

    fn is_removed(&self, element: &ElementRef) -> bool {
        // An element is dropped if it, or any ancestor, matches a removal rule
        let mut current = Some(*element);
        while let Some(el) = current {
            if self.remove.iter().any(|sel| sel.matches(&el)) {
                return true;
            }
            current = el.parent().and_then(ElementRef::wrap);
        }
        false
    }
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self::fandom()
    }
}

/// Reduce raw page HTML to a flat heading+paragraph line stream.
///
/// Total over malformed markup: anything that cannot be classified is
/// silently omitted rather than failing the page.
pub fn normalize(html: &str, rules: &ExtractionRules) -> Vec<Line> {
    let document = Html::parse_document(html);
    let target = Selector::parse("h2, h3, h4, p, li").unwrap();

    let mut lines = Vec::new();
    for element in document.select(&target) {
        if rules.is_removed(&element) {
            continue;
        }

        let text = element
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            continue;
        }

        let line = match element.value().name() {
            "h2" => Line::Heading { level: 2, text },
            "h3" => Line::Heading { level: 3, text },
            "h4" => Line::Heading { level: 4, text },
            _ => Line::Text(text),
        };
        lines.push(line);
    }
    lines
}

/// Render normalized lines back to a markdown-ish string, mainly for
/// debugging and log inspection.
pub fn lines_to_markdownish(lines: &[Line]) -> String {
    lines
        .iter()
        .map(|line| match line {
            Line::Heading { level: 2, text } => format!("## {}", text),
            Line::Heading { level: 3, text } => format!("### {}", text),
            Line::Heading { text, .. } => format!("#### {}", text),
            Line::Text(text) => text.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
