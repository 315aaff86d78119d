use super::normalize::Line;

/// Name of the section assigned to content that appears before any
/// level-2 heading.
pub const OVERVIEW_SECTION: &str = "Overview";

/// A named section of a page: heading text plus flattened body text.
///
/// Ephemeral: exists only between the section splitter and the chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub body: String,
}

/// Partition a normalized line stream into sections at level-2 headings.
///
/// Lower-level headings stay inside the body as markdown-ish markers so the
/// chunker sees them as paragraph boundaries. Output order matches source
/// order; sequence indices downstream depend on it.
pub fn split_sections(lines: &[Line]) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut name = OVERVIEW_SECTION.to_string();
    let mut body: Vec<String> = Vec::new();

    for line in lines {
        match line {
            Line::Heading { level: 2, text } => {
                flush(&mut sections, std::mem::replace(&mut name, text.clone()), &mut body);
            }
            Line::Heading { level: 3, text } => body.push(format!("### {}", text)),
            Line::Heading { text, .. } => body.push(format!("#### {}", text)),
            Line::Text(text) => body.push(text.clone()),
        }
    }
    flush(&mut sections, name, &mut body);

    sections
}

fn flush(sections: &mut Vec<Section>, name: String, body: &mut Vec<String>) {
    let text = body.join("\n").trim().to_string();
    body.clear();
    if !text.is_empty() {
        sections.push(Section { name: name.trim().to_string(), body: text });
    }
}
