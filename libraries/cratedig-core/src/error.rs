/// Core error types for Crate Digger
use crate::types::TaskState;
use thiserror::Error;

/// Result type alias using `DigError`
pub type Result<T> = std::result::Result<T, DigError>;

/// Core error type shared by all collaborators
#[derive(Error, Debug)]
pub enum DigError {
    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Tag reading/writing errors
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Metadata source errors
    #[error("Search error: {0}")]
    Search(String),

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Rejected task state change
    #[error("Invalid transition for {key}: {from} -> {to}")]
    InvalidTransition {
        key: String,
        from: TaskState,
        to: TaskState,
    },

    /// A task's outcome was already committed
    #[error("Choice already made for {0}")]
    ChoiceAlreadyMade(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Database errors (for storage implementations)
    #[error("Database error: {0}")]
    Database(String),
}

impl DigError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a metadata error
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Create a search error
    pub fn search(msg: impl Into<String>) -> Self {
        Self::Search(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

#[cfg(feature = "sqlx-support")]
impl From<sqlx::Error> for DigError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}
