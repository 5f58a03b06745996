//! Error types for the photo library service.

use std::path::PathBuf;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Geocoding error: {0}")]
    Geocode(#[from] GeocodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Durable store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Task submission and execution errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Task type {0} is already registered")]
    DuplicateTaskType(String),

    #[error("Executor is stopped")]
    ExecutorStopped,

    #[error("Task queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Invalid parameters for task {name}: {reason}")]
    InvalidParameters { name: String, reason: String },

    #[error("Task cancelled")]
    Cancelled,

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task failed: {0}")]
    Failed(String),
}

/// Library-side outcomes callers branch on.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("No photo with id {0}")]
    NotFound(String),

    #[error("Photo already exists: id={0}")]
    AlreadyExists(String),

    #[error("Photo already exists at path={}", .0.display())]
    FileAlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Derived-index errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Index {0} is not registered")]
    UnknownIndex(String),

    #[error("Index {index} failed for photo {photo}: {reason}")]
    Failed {
        index: String,
        photo: String,
        reason: String,
    },
}

/// Reverse-geocoding errors.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("Geocoding request failed: {0}")]
    Request(String),

    #[error("Invalid geocoding response: {0}")]
    InvalidResponse(String),

    #[error("Geocoding cancelled")]
    Cancelled,
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
