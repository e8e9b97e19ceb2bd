use crate::{DocId, Prime};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No prime above the cursor fits in the identifier space. Fatal.
    #[error("vocabulary exhausted: no prime greater than {last_prime} is representable")]
    VocabularyExhausted { last_prime: Prime },
    #[error("checkpoint corrupted: {0}")]
    CheckpointCorruption(String),
    #[error("document {0} not found")]
    DocumentNotFound(DocId),
    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("document store error: {0}")]
    Store(#[from] sled::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
