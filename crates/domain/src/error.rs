/// Shared error type used across all Aegis crates.
///
/// Variants map one-to-one onto the error kinds surfaced to callers;
/// the HTTP layers translate `kind()` into status codes.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backpressure: {0}")]
    Backpressure(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("config: {0}")]
    Config(String),

    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable kind, used in error bodies and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Json(_) => "validation",
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Backpressure(_) => "backpressure",
            Error::Transport(_) => "transport",
            Error::Storage(_) => "storage",
            Error::Config(_) => "config",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether a sender may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Backpressure(_))
    }
}
