use thiserror::Error;

/// Main error type for Pathfinder
#[derive(Error, Debug)]
pub enum PathfinderError {
    /// Transport-level failure talking to the search service (timeout,
    /// connection reset, unreadable response). Retried by the query client.
    #[error("Remote query error: {0}")]
    RemoteQuery(String),

    /// The search service answered with a structured error document
    #[error("Remote service error [{code}]: {message}")]
    RemoteService { code: String, message: String },

    /// The service suppressed errors and returned a partial page
    #[error("Remote query aborted: {0}")]
    QueryAborted(String),

    /// A seed id resolves to neither a paper nor an author
    #[error("Unknown entity: {0}")]
    UnknownEntity(i64),

    /// A built expression exceeds the service's maximum length
    #[error("Invalid expression: length {length} exceeds maximum {max}")]
    InvalidExpression { length: usize, max: usize },

    /// Self-loop edge or lookup of an unregistered vertex
    #[error("Graph integrity error: {0}")]
    GraphIntegrity(String),

    /// A shared fetch owned by another caller failed
    #[error("Fetch of {domain} for node {id} failed: {reason}")]
    FetchFailed {
        id: i64,
        domain: String,
        reason: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Broken internal state; aborts the current operation
    #[error("Internal error: {0}")]
    Internal(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PathfinderError {
    /// Whether the query client may re-issue the request that produced this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, PathfinderError::RemoteQuery(_))
    }
}

/// Convenient Result type using PathfinderError
pub type Result<T> = std::result::Result<T, PathfinderError>;
