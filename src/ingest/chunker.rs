use crate::config::ChunkingConfig;

/// Boundary preference, coarsest first: paragraph break, line break,
/// sentence end, word break. Character-level windows are the last resort.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// Navigation-boilerplate labels that sometimes survive normalization as
/// whole chunks.
const SKIP_LABELS: &[&str] = &[
    "Dialogue",
    "Gallery",
    "Other Languages",
    "Change History",
    "Navigation",
];

const MIN_CHUNK_CHARS: usize = 30;
const MIN_CHUNK_WORDS: usize = 5;

/// Split one section body into bounded, overlapping text windows.
///
/// Tries the coarsest separator first and only falls back to finer splits
/// when a candidate window still exceeds `chunk_size`. Windows carry up to
/// `chunk_overlap` bytes of trailing context into the next window. Produced
/// chunks are trimmed; empty chunks are dropped. Budgets are byte counts
/// (see `ChunkingConfig`), always sliced at character boundaries.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut chunks = split_recursive(text, SEPARATORS, config);
    for chunk in &mut chunks {
        *chunk = chunk.trim().to_string();
    }
    chunks.retain(|c| !c.is_empty());
    chunks
}

/// Quality gate applied at embedding time, not at chunk emission, so the
/// chunk log stays a complete record even when some chunks are never
/// embedded. Rejects chunks that are both short and word-poor, and chunks
/// that are exactly a known navigation label.
pub fn passes_quality_gate(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }

    if trimmed.chars().count() < MIN_CHUNK_CHARS
        && trimmed.split_whitespace().count() < MIN_CHUNK_WORDS
    {
        return false;
    }

    !SKIP_LABELS.contains(&trimmed)
}

fn split_recursive(text: &str, separators: &[&str], config: &ChunkingConfig) -> Vec<String> {
    if text.len() <= config.chunk_size {
        return vec![text.to_string()];
    }

    let Some(sep_idx) = separators.iter().position(|sep| text.contains(sep)) else {
        return char_windows(text, config.chunk_size, config.chunk_overlap);
    };
    let pieces = split_keep_separator(text, separators[sep_idx]);
    merge_pieces(pieces, &separators[sep_idx + 1..], config)
}

/// Split on `sep`, keeping the separator attached to the preceding piece so
/// concatenation reproduces the input exactly.
fn split_keep_separator(text: &str, sep: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(sep) {
        let end = pos + sep.len();
        pieces.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Merge separator-split pieces into windows of at most `chunk_size` bytes,
/// carrying a tail of up to `chunk_overlap` bytes into the next window.
/// Pieces that alone exceed the window recurse on finer separators.
fn merge_pieces(pieces: Vec<String>, finer: &[&str], config: &ChunkingConfig) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;

    for piece in pieces {
        if piece.len() > config.chunk_size {
            if !current.is_empty() {
                chunks.push(current.concat());
                current.clear();
                current_len = 0;
            }
            chunks.extend(split_recursive(&piece, finer, config));
            continue;
        }

        if current_len + piece.len() > config.chunk_size && !current.is_empty() {
            chunks.push(current.concat());
            while current_len > config.chunk_overlap
                || (current_len + piece.len() > config.chunk_size && current_len > 0)
            {
                let removed = current.remove(0);
                current_len -= removed.len();
            }
        }

        current_len += piece.len();
        current.push(piece);
    }

    if !current.is_empty() {
        chunks.push(current.concat());
    }
    chunks
}

/// Last-resort character windows over separator-free text.
///
/// Slices only at UTF-8 character boundaries. The next window starts
/// `overlap` bytes before the previous window's end, and the final window
/// always ends at the end of the input.
fn char_windows(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let floor_boundary = |mut pos: usize| -> usize {
        if pos >= text.len() {
            return text.len();
        }
        while pos > 0 && !text.is_char_boundary(pos) {
            pos -= 1;
        }
        pos
    };

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < text.len() {
        let mut end = floor_boundary((start + size).min(text.len()));
        if end <= start {
            // A single character wider than the window; take it whole
            end = (start + 1..=text.len())
                .find(|&p| text.is_char_boundary(p))
                .unwrap_or(text.len());
        }
        chunks.push(text[start..end].to_string());
        if end >= text.len() {
            break;
        }
        let next = floor_boundary(end.saturating_sub(overlap));
        start = if next <= start { end } else { next };
    }

    chunks
}
