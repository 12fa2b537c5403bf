use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Structural failures of the semantic index.
///
/// These are surfaced to callers as-is; nothing in the pipeline swallows them.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index build failed: {0}")]
    Build(String),

    #[error("no persisted index at {}", .0.display())]
    NotFound(PathBuf),

    #[error("index not initialized: build or load it first")]
    NotInitialized,

    #[error("an index rebuild is already in progress")]
    RebuildInProgress,

    #[error("index was built with embedder '{found}' but '{expected}' is configured")]
    EmbedderMismatch { expected: String, found: String },

    #[error("index storage error: {0}")]
    Storage(String),

    #[error("query embedding failed: {0}")]
    Embedding(String),
}

impl IndexError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    pub fn build(err: impl std::fmt::Display) -> Self {
        Self::Build(err.to_string())
    }
}

/// A failed call to a generation backend.
///
/// Backends fill in whatever structured signal they have (HTTP status,
/// timeout, connect failure); `message` is the human-readable description.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct GenerationError {
    pub status: Option<u16>,
    pub timed_out: bool,
    pub connect_failed: bool,
    pub message: String,
}

impl GenerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { status: None, timed_out: false, connect_failed: false, message: message.into() }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self { status: Some(status), ..Self::new(message) }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self { timed_out: true, ..Self::new(message) }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self { connect_failed: true, ..Self::new(message) }
    }
}
