//! Error types for scheduling and stitching

use thiserror::Error;

/// Main error type for fragcube operations
#[derive(Error, Debug)]
pub enum CubeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format-version; expected {expected}, was {found}")]
    UnsupportedFormatVersion { expected: u64, found: String },

    #[error("no handler for function {0}")]
    UnknownFunction(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Overflow: {0}")]
    Overflow(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage inconsistency: {0}")]
    StorageInconsistency(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CubeError {
    /// True when the failure is caused by the request rather than the server.
    ///
    /// A missing manifest is the caller's problem. A missing fragment after the
    /// request was scheduled means storage is out of sync with the manifest.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CubeError::UnsupportedFormatVersion { .. }
                | CubeError::UnknownFunction(_)
                | CubeError::OutOfRange(_)
                | CubeError::InvalidDocument(_)
                | CubeError::NotFound(_)
        )
    }
}

/// Specialized Result type for fragcube operations
pub type Result<T> = std::result::Result<T, CubeError>;

impl From<serde_json::Error> for CubeError {
    fn from(err: serde_json::Error) -> Self {
        CubeError::InvalidDocument(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for CubeError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        CubeError::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CubeError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        CubeError::Serialization(err.to_string())
    }
}
