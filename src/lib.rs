//! bindle - single-artifact script bundler
//!
//! Bundles a typed-source project into one self-contained text artifact
//! for a sandboxed target runtime with no filesystem or module loader:
//! every reachable source file (compiled and transformed), JSON data
//! modules, optional source maps, and a manifest mapping module
//! specifiers to embedded assets.

pub mod artifact;
pub mod assets;
pub mod bundler;
pub mod compiler;
pub mod config;
pub mod error;
pub mod fs;
pub mod modules;
pub mod paths;
pub mod postprocess;
pub mod resolver;
pub mod shims;
pub mod walker;
pub mod watcher;

// Re-exports for convenience
pub use artifact::{Artifact, ArtifactEntry};
pub use assets::BundlerState;
pub use bundler::Bundler;
pub use compiler::{Compiler, PassthroughCompiler};
pub use config::{
    detect_compiler_root, AssetConfig, BundleOptions, Compression, Entrypoint, SourceMaps,
};
pub use error::{BindleError, BindleResult};
pub use fs::{FileSystem, LocalFileSystem};
pub use watcher::{watch, WatchEvent};
