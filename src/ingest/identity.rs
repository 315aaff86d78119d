use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Hard ceiling on identifier length, in bytes, imposed by the vector index.
pub const MAX_ID_BYTES: usize = 512;

/// Hex width of the hash appended when an over-long id is truncated.
const TRUNCATION_HASH_WIDTH: usize = 12;

/// Hex width of the hash appended to resolve id collisions.
const COLLISION_HASH_WIDTH: usize = 8;

/// Fixed-width content fingerprint of the exact chunk text: full SHA-256 hex.
///
/// A pure function of the text, independent of chunk ordering, used both as
/// the collision-disambiguation seed and as a cross-run dedup key.
pub fn text_fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn short_hash(input: &str, width: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(width);
    hex
}

/// Sanitize a title or section name into an id slug: lowercase, spaces and
/// path separators to underscores, anything outside `[a-z0-9_-]` to
/// underscore, runs collapsed, edges trimmed.
pub fn sanitize_slug(s: &str) -> String {
    let lowered = s.to_lowercase();
    let mapped: String = lowered
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => c,
            _ => '_',
        })
        .collect();
    collapse_underscores(&mapped)
}

/// Sanitize a full vector id to the ASCII-safe form the index accepts.
///
/// Keeps alphanumerics, the `:` namespace separator, underscore, hyphen,
/// and dot; drops non-ASCII entirely; collapses underscore runs; re-applies
/// the length bound. Loading legacy ledger entries goes through this too.
pub fn sanitize_vector_id(id: &str) -> String {
    let mapped: String = id
        .chars()
        .filter(|c| c.is_ascii())
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | ':' | '-' | '.' => c,
            _ => '_',
        })
        .collect();
    bound_id(&collapse_underscores(&mapped))
}

fn collapse_underscores(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_underscore = false;
    for c in s.chars() {
        if c == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }
    out.trim_matches('_').to_string()
}

/// Enforce the byte bound: over-long ids are truncated and suffixed with a
/// short hash of the original, untruncated id.
fn bound_id(id: &str) -> String {
    if id.len() <= MAX_ID_BYTES {
        return id.to_string();
    }
    let hash = short_hash(id, TRUNCATION_HASH_WIDTH);
    let keep = MAX_ID_BYTES - TRUNCATION_HASH_WIDTH - 1;
    let mut truncated = id.to_string();
    // Ids are ASCII by construction, but stay boundary-safe anyway
    let mut cut = keep;
    while cut > 0 && !truncated.is_char_boundary(cut) {
        cut -= 1;
    }
    truncated.truncate(cut);
    format!("{}_{}", truncated, hash)
}

/// Build the base chunk identifier:
/// `fandom:<corpus>:<title_slug>:<section_slug>:<seq>`.
pub fn chunk_base_id(corpus: &str, title: &str, section: &str, seq: usize) -> String {
    format!(
        "fandom:{}:{}:{}:{}",
        sanitize_slug(corpus),
        sanitize_slug(title),
        sanitize_slug(section),
        seq
    )
}

/// Process-wide registry of identifiers issued during one run.
///
/// Guarantees every issued id is unique across all corpora in the run and
/// within the byte bound. Collisions are resolved deterministically by
/// appending a short hash seeded from the content fingerprint (or the base
/// id when no fingerprint exists) plus an incrementing counter; issuing
/// never fails.
#[derive(Debug, Default)]
pub struct IdRegistry {
    issued: HashSet<String>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }

    pub fn issue(&mut self, base_id: &str, fingerprint: Option<&str>) -> String {
        let bounded = bound_id(base_id);
        if self.issued.insert(bounded.clone()) {
            return bounded;
        }

        let mut counter = 0u64;
        loop {
            let seed = match fingerprint {
                Some(fp) => format!("{}_{}", fp, counter),
                None => format!("{}_{}", bounded, counter),
            };
            let suffix = short_hash(&seed, COLLISION_HASH_WIDTH);

            let candidate = if bounded.len() + 1 + COLLISION_HASH_WIDTH > MAX_ID_BYTES {
                let keep = MAX_ID_BYTES - COLLISION_HASH_WIDTH - 1;
                format!("{}_{}", &bounded[..keep], suffix)
            } else {
                format!("{}_{}", bounded, suffix)
            };

            if self.issued.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}
