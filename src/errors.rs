//! Error types for the Composer daemon.
//!
//! This module defines a unified error enumeration shared by the blueprint
//! store, the package catalog, the compose queue, and the API layer. It
//! integrates with `thiserror` to provide `Display` implementations and
//! error source chaining where applicable.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload.
//! - The HTTP layer is the only place that renders a `ComposerError` into a
//!   response envelope; every other layer propagates it with `?`.

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for the Composer daemon.
///
/// - Used across the blueprint store, package catalog, compose queue, and
///   API handlers.
/// - Implements `std::error::Error` via `thiserror`.
pub enum ComposerError {
    /// Malformed blueprint TOML/JSON, or an invalid semantic version.
    #[error("{0}")]
    ParseError(String),

    /// Missing branch, blueprint, commit, or build uuid.
    #[error("{0}")]
    NotFound(String),

    /// Blueprint object store corruption or I/O failure.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Package-manager backend failure, or a missing project/module name.
    #[error("catalog error: {0}")]
    CatalogError(String),

    /// Invalid compose state transition, unknown compose type, or submission
    /// failure.
    #[error("queue error: {0}")]
    QueueError(String),

    /// The installer log does not exist yet for the requested build.
    #[error("log unavailable for {0}")]
    LogUnavailable(String),

    /// Cancellation was requested for a build that is not cancellable.
    #[error("cannot cancel: {0}")]
    CancelError(String),

    /// I/O error from the underlying filesystem.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ComposerError>;

impl ComposerError {
    /// A short machine-stable kind name, useful for logging and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            ComposerError::ParseError(_) => "ParseError",
            ComposerError::NotFound(_) => "NotFound",
            ComposerError::StorageError(_) => "StorageError",
            ComposerError::CatalogError(_) => "CatalogError",
            ComposerError::QueueError(_) => "QueueError",
            ComposerError::LogUnavailable(_) => "LogUnavailable",
            ComposerError::CancelError(_) => "CancelError",
            ComposerError::IoError(_) => "IoError",
        }
    }
}
