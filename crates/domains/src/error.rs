//! # BoardError
//!
//! Centralized error handling for the lost-and-found client.
//! The variants follow how a failure is surfaced to the user: inline form
//! messages, a generic failure banner, or an empty "does not exist" state.

use std::time::Duration;
use thiserror::Error;

/// The primary error type for all domain and service operations.
#[derive(Error, Debug)]
pub enum BoardError {
    /// Form input rejected before anything was sent (empty title, password mismatch...)
    #[error("validation error: {0}")]
    Validation(String),

    /// The action needs a signed-in user
    #[error("not signed in: {0}")]
    Unauthenticated(String),

    /// A single entity lookup came back empty
    #[error("{entity} not found with ID {id}")]
    NotFound { entity: &'static str, id: String },

    /// Any rejected query, command or upload. Ownership rejections land here
    /// too since the backend does not tell them apart.
    #[error("backend error: {0}")]
    Backend(String),

    /// The backend did not answer in time
    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),

    /// A record did not have the expected shape
    #[error("malformed record: {0}")]
    Decode(#[from] serde_json::Error),
}

impl BoardError {
    pub fn backend(message: impl Into<String>) -> Self {
        BoardError::Backend(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        BoardError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BoardError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Errors caught before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(self, BoardError::Validation(_))
    }
}

/// A specialized Result type for lostboard logic.
pub type Result<T> = std::result::Result<T, BoardError>;
