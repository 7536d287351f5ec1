//! Watch error types

use thiserror::Error;

/// Errors raised while evaluating an observer during a tick
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("getter for observer '{key}' failed: {message}")]
    Getter { key: String, message: String },

    #[error("getter for observer '{key}' panicked: {message}")]
    Panicked { key: String, message: String },
}

impl WatchError {
    /// Key of the observer that produced this error
    pub fn key(&self) -> &str {
        match self {
            WatchError::Getter { key, .. } | WatchError::Panicked { key, .. } => key,
        }
    }

    /// Check if the getter panicked rather than returning an error
    pub fn is_panic(&self) -> bool {
        matches!(self, WatchError::Panicked { .. })
    }
}
