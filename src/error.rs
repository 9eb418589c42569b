use thiserror::Error;

/// Errors surfaced by the freshtab engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Please enter a valid URL starting with http:// or https://")]
    InvalidUrl,

    #[error("Title is required")]
    EmptyTitle,

    #[error("Title must be {0} characters or fewer")]
    TitleTooLong(usize),

    #[error("Maximum of {0} shortcuts allowed")]
    LimitExceeded(usize),

    #[error("No shortcut with id {0}")]
    NotFound(uuid::Uuid),

    /// A write was rejected by the capacity-constrained synced store.
    #[error("Storage quota exceeded ({size} bytes over the {limit} byte limit)")]
    QuotaExceeded { size: usize, limit: usize },

    #[error("Network request failed: {0}")]
    Network(String),

    /// Storage directories could not be resolved; the engine cannot run here.
    #[error("Not running in a storage-capable host context")]
    HostContext,

    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Cache file is corrupt: {0}")]
    CorruptCache(#[from] bincode::Error),
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Error::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
