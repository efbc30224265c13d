//! Error types for bindle
//!
//! Uses `thiserror` for library errors. The binary boundary wraps these in
//! `anyhow` for reporting.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bindle operations
pub type BindleResult<T> = Result<T, BindleError>;

/// Main error type for bindle operations
#[derive(Error, Debug)]
pub enum BindleError {
    /// Entrypoint does not live under the project root
    #[error("entrypoint '{path}' is not inside the project root '{root}'\n  → Fix: Pass an entrypoint beneath the project root, or adjust --project-root")]
    InvalidEntrypoint { path: PathBuf, root: PathBuf },

    /// One or more module specifiers could not be located
    #[error("unable to resolve: {}", .0.join(", "))]
    UnresolvedDependencies(Vec<String>),

    /// An emitted or discovered file lies outside both known roots
    #[error("unexpected file path: {path}")]
    UnexpectedFilePath { path: PathBuf },

    /// An external source file could not be opened
    #[error("unable to read '{path}': {source}")]
    ReadFailure {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Compiler service failure (the emit itself, not diagnostics)
    #[error("compile error: {message}")]
    Compile { message: String },

    /// Minifier service failure
    #[error("minify error in '{asset}': {message}")]
    Minify { asset: String, message: String },

    /// Malformed artifact text handed to the parser
    #[error("malformed artifact: {message}")]
    MalformedArtifact { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error (configuration, package descriptors, source maps)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
