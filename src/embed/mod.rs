pub mod ledger;
pub mod openai;
pub mod pinecone;
pub mod sink;

pub use ledger::ProgressLedger;
pub use openai::OpenAiEmbedder;
pub use pinecone::PineconeIndex;
pub use sink::{EmbedSink, SinkStats};

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Broad content class stored alongside each vector so retrieval can filter
/// full wiki chunks from derived summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Full,
    Summary,
    Misc,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Full => "full",
            ContentType::Summary => "summary",
            ContentType::Misc => "misc",
        }
    }
}

/// Metadata payload attached to each upserted vector.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkMetadata {
    pub text: String,
    #[serde(rename = "type")]
    pub chunk_type: String,
    pub title: String,
    pub section: String,
    pub url: String,
    pub lang: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub characters: Option<String>,
}

/// One vector ready for upsert: sanitized id, embedding values, metadata.
#[derive(Debug, Clone, Serialize)]
pub struct VectorPoint {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Turns a batch of texts into embedding vectors, one per input, in order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Destination index for embedded chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()>;
}
