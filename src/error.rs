//! Error types for the catalog.

use thiserror::Error;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the catalog.
///
/// Broken caller contracts (inverted key ranges, staging into a sealed
/// edit) are not represented here: they panic at the point of violation.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Malformed, truncated or inconsistent encoded edit.
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The edit log rejected an append or sync.
    #[error("Manifest error: {0}")]
    ManifestError(String),
}

impl Error {
    /// Create a corruption error with the given message.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        Error::Corruption(msg.into())
    }

    /// Create a manifest error.
    pub fn manifest<S: Into<String>>(msg: S) -> Self {
        Error::ManifestError(msg.into())
    }

    /// Check if this error indicates corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}
