use filesniff_ffi::FfiError;
use thiserror::Error;

/// All errors that can occur in filesniff-core.
#[derive(Debug, Error)]
pub enum SniffError {
    /// libmagic could not be located. Not retryable.
    #[error("Library not found: {0}")]
    LibraryNotFound(String),

    /// A detector could not be opened or its database could not be loaded.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// A single classification call failed. The detector stays usable.
    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl SniffError {
    /// Library discovery failures keep their own variant; everything else
    /// raised while bringing a detector up is an initialization failure.
    pub(crate) fn from_setup(e: FfiError) -> Self {
        match e {
            FfiError::LibraryNotFound { .. } | FfiError::MissingSymbol { .. } => {
                SniffError::LibraryNotFound(e.to_string())
            }
            other => SniffError::Initialization(other.to_string()),
        }
    }
}

/// Exit codes used by the `filesniff` binary.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    DetectionFailed = 2,
    InvalidArgs = 3,
    LibraryNotFound = 4,
    InitializationFailed = 5,
}

impl From<&SniffError> for ExitCode {
    fn from(e: &SniffError) -> Self {
        match e {
            SniffError::LibraryNotFound(_) => ExitCode::LibraryNotFound,
            SniffError::Initialization(_) => ExitCode::InitializationFailed,
            SniffError::Detection(_) => ExitCode::DetectionFailed,
            SniffError::ConfigError(_) => ExitCode::InvalidArgs,
            _ => ExitCode::GeneralError,
        }
    }
}

pub type Result<T> = std::result::Result<T, SniffError>;
