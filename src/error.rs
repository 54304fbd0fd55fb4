/// Unified error handling for the Liz assistant
///
/// This module provides a centralized error type for everything outside the
/// turn-taking hot path. Component-specific failures that the controller
/// recovers from locally (generation, recognition, command validation) have
/// their own enums next to the code that produces them.

use thiserror::Error;

/// Main error type for all Liz operations
#[derive(Error, Debug)]
pub enum LizError {
    /// Turn log and settings storage (SQLite operations, schema issues)
    #[error("Database error: {0}")]
    Database(String),

    /// Speech capture or playback backends (recognizer, synthesizer subprocesses)
    #[error("Speech error: {0}")]
    Speech(String),

    /// Generation proxy or upstream provider failures
    #[error("Remote error: {0}")]
    Remote(String),

    /// Configuration and settings errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Secrets management errors (keyring access, API key storage)
    #[error("Secrets error: {0}")]
    Secrets(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<rusqlite::Error> for LizError {
    fn from(err: rusqlite::Error) -> Self {
        LizError::Database(err.to_string())
    }
}

/// Helper trait to convert external error types to LizError
pub trait IntoLizError<T> {
    fn map_liz_err<F>(self, f: F) -> Result<T, LizError>
    where
        F: FnOnce(String) -> LizError;
}

impl<T, E: std::fmt::Display> IntoLizError<T> for Result<T, E> {
    fn map_liz_err<F>(self, f: F) -> Result<T, LizError>
    where
        F: FnOnce(String) -> LizError,
    {
        self.map_err(|e| f(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LizError::Remote("proxy unreachable".to_string());
        assert_eq!(err.to_string(), "Remote error: proxy unreachable");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let liz_err: LizError = io_err.into();
        assert!(liz_err.to_string().contains("file not found"));
    }

    #[test]
    fn test_map_liz_err() {
        let result: Result<(), &str> = Err("bad port");
        let mapped = result.map_liz_err(LizError::Config);
        assert_eq!(mapped.unwrap_err().to_string(), "Configuration error: bad port");
    }
}
