use thiserror::Error;

/// Errors surfaced by the indexing and retrieval engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Ingested record is missing a required field (`id`, `title`, or `url`).
    /// Callers skip the record and continue the batch.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// No committed segment exists (or it cannot be read) at query time.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    /// Caller-supplied argument is not valid, e.g. an unknown sort key.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An on-disk segment failed structural validation. Recovery is a full
    /// rebuild from the record log.
    #[error("corrupt segment: {0}")]
    CorruptSegment(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
