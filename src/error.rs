//! Error types for metarr
//!
//! This module defines all error types used throughout the engine. Uses
//! `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Startup errors (manifest, loader, dependency graph) are fatal and map to
//! exit code 2. Faults inside a plugin body or a task never surface here;
//! they are converted into failed outcomes at the executor / task-runner
//! boundary.

use thiserror::Error;

/// The primary error type for metarr operations.
#[derive(Error, Debug)]
pub enum MetarrError {
    /// Configuration-related errors (missing file, invalid fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Manifest discovery or validation errors (malformed plugin.json,
    /// duplicate names, invalid expects paths, etc.)
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Plugin instantiation errors (unknown class hint, constructor failure)
    #[error("Loader error: {0}")]
    Loader(String),

    /// A dependency edge points at an unknown or disabled plugin
    #[error("Dependency error: {0}")]
    Dependency(String),

    /// The enabled-output dependency graph contains a cycle
    #[error("Circular dependency among plugins: {}", .0.join(", "))]
    Cycle(Vec<String>),

    /// Plugin execution errors (raised inside plugin bodies; callers convert
    /// these into failed outcomes rather than propagating them)
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// Task rendering or placement errors (recorded on the task outcome)
    #[error("Task error: {0}")]
    Task(String),

    /// The batch was cancelled by an external abort signal
    #[error("Aborted")]
    Aborted,

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MetarrError {
    /// Process exit code for this error when it escapes to `main`.
    ///
    /// Startup failures exit 2; an abort or any other runtime fault exits 3.
    pub fn exit_code(&self) -> i32 {
        match self {
            MetarrError::Config(_)
            | MetarrError::Manifest(_)
            | MetarrError::Loader(_)
            | MetarrError::Dependency(_)
            | MetarrError::Cycle(_) => 2,
            _ => 3,
        }
    }
}

/// A specialized `Result` type for metarr operations.
pub type Result<T> = std::result::Result<T, MetarrError>;
