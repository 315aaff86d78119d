use thiserror::Error;

/// Main error type for Lorevat
#[derive(Error, Debug)]
pub enum LorevatError {
    /// Wiki fetch failed after exhausting retries
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding API errors
    #[error("Embedding API error: {0}")]
    Embedding(String),

    /// Vector index upsert errors
    #[error("Upsert error: {0}")]
    Upsert(String),

    /// Parse errors (malformed records, unexpected API payloads)
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenient Result type using LorevatError
pub type Result<T> = std::result::Result<T, LorevatError>;
