use thiserror::Error;

/// Errors raised at the native boundary.
#[derive(Debug, Clone, Error)]
pub enum FfiError {
    #[error("libmagic not found (tried: {})", .attempts.join("; "))]
    LibraryNotFound { attempts: Vec<String> },

    #[error("libmagic at {library} is missing symbol `{symbol}`")]
    MissingSymbol { library: String, symbol: String },

    #[error("magic_open({flags:#x}) failed: {reason}")]
    Open { flags: i32, reason: String },

    #[error("{0}")]
    Native(String),
}

pub type Result<T> = std::result::Result<T, FfiError>;
