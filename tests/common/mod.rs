//! Common test utilities for bindle integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use bindle::bundler::Bundler;
use bindle::compiler::PassthroughCompiler;
use bindle::config::{AssetConfig, BundleOptions, Compression, SourceMaps};
use bindle::fs::LocalFileSystem;

/// A throwaway project directory with helpers for writing fixtures and
/// constructing a bundler over them
pub struct TestProject {
    _dir: TempDir,
    pub root: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp project");
        let root = dir
            .path()
            .canonicalize()
            .expect("canonicalize temp project root");
        Self { _dir: dir, root }
    }

    /// Write a file beneath the project root, creating parents
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture parents");
        }
        std::fs::write(&path, content).expect("write fixture");
        path
    }

    /// Path beneath the project root
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// A bundler over this project with the passthrough compiler. The
    /// compiler root points at an empty directory inside the project so
    /// shim resolution falls back to the project's modules directory.
    pub fn bundler(&self, entrypoint: &str) -> Bundler {
        self.bundler_with(entrypoint, SourceMaps::Included, Compression::None)
    }

    pub fn bundler_with(
        &self,
        entrypoint: &str,
        source_maps: SourceMaps,
        compression: Compression,
    ) -> Bundler {
        let fs = Arc::new(LocalFileSystem);
        let compiler_root = self.root.join(".compiler");
        let assets = AssetConfig::detect(fs.as_ref(), &self.root, &compiler_root);
        let options = BundleOptions::new(self.root.clone(), self.path(entrypoint))
            .with_source_maps(source_maps)
            .with_compression(compression);
        let compiler = Arc::new(PassthroughCompiler::new(fs.clone()));
        Bundler::new(options, assets, fs, compiler)
    }
}

/// Find the payload of a named asset inside parsed artifact text
pub fn asset_text(artifact: &bindle::Artifact, name: &str) -> Option<String> {
    artifact
        .entries
        .iter()
        .find(|entry| entry.name == name)
        .map(|entry| String::from_utf8_lossy(&entry.data).into_owned())
}

/// Shorthand for paths in assertions
pub fn display(path: &Path) -> String {
    path.display().to_string()
}
