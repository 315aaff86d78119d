pub mod config;
pub mod error;
pub mod wiki;
pub mod harvest;
pub mod ingest;
pub mod summaries;
pub mod embed;

pub use config::Config;
pub use error::{LorevatError, Result};
