use thiserror::Error;

/// Error taxonomy for the whole pipeline.
///
/// Traversal-level failures (`MissingSource`, `MalformedRecord`) are
/// non-fatal at the edge: the tree builder drops the edge and records the
/// key for remediation. `InvalidRoot` aborts a single root's analysis but
/// never the batch.
#[derive(Error, Debug)]
pub enum EpiscopeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No retrievable record for issue '{0}'")]
    MissingSource(String),

    #[error("Record for issue '{key}' is malformed: {cause}")]
    MalformedRecord { key: String, cause: String },

    #[error("Invalid root issue '{key}': {reason}")]
    InvalidRoot { key: String, reason: String },

    #[error("Unparseable date string: '{0}'")]
    DateParse(String),

    #[error("Analyzer precondition not met: {0}")]
    Precondition(String),

    #[error("Summarizer error: {0}")]
    Summarizer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EpiscopeError>;
