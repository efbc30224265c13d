//! Bundling configuration
//!
//! Holds the per-invocation options, the entrypoint pair, and the asset
//! configuration (module directories plus the shim registry). CLI flags
//! take precedence over file configuration over built-in defaults.

use std::path::{Path, PathBuf};

use crate::compiler::compiled_path;
use crate::error::{BindleError, BindleResult};
use crate::fs::FileSystem;
use crate::paths;
use crate::shims::ShimRegistry;

/// Environment variable marking an installed compiler root
pub const COMPILER_ROOT_ENV: &str = "FRIDA_COMPILE";

/// Symbolic compiler root used when the environment variable is set
pub const SYMBOLIC_COMPILER_ROOT: &str = "/frida-compile";

/// Whether `.map` assets are produced and embedded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMaps {
    #[default]
    Included,
    Omitted,
}

/// Output compression mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    TerserLike,
}

/// Options for a single bundling pipeline
#[derive(Debug, Clone)]
pub struct BundleOptions {
    pub project_root: PathBuf,
    pub entrypoint: PathBuf,
    pub source_maps: SourceMaps,
    pub compression: Compression,
}

impl BundleOptions {
    pub fn new(project_root: impl Into<PathBuf>, entrypoint: impl Into<PathBuf>) -> Self {
        Self {
            project_root: paths::normalize(&project_root.into()),
            entrypoint: entrypoint.into(),
            source_maps: SourceMaps::default(),
            compression: Compression::default(),
        }
    }

    pub fn with_source_maps(mut self, source_maps: SourceMaps) -> Self {
        self.source_maps = source_maps;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

/// Validated entrypoint: the absolute input path and its output asset name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entrypoint {
    pub input: PathBuf,
    pub output: String,
}

impl Entrypoint {
    /// Absolutize `input` against the project root and derive the compiled
    /// output name. Inputs outside the root are rejected.
    pub fn resolve(project_root: &Path, input: &Path) -> BindleResult<Entrypoint> {
        let absolute = if input.is_absolute() {
            paths::normalize(input)
        } else {
            paths::normalize(&project_root.join(input))
        };
        let relative =
            absolute
                .strip_prefix(project_root)
                .map_err(|_| BindleError::InvalidEntrypoint {
                    path: absolute.clone(),
                    root: project_root.to_path_buf(),
                })?;
        let output = format!("/{}", paths::portable(&compiled_path(relative)));
        Ok(Entrypoint {
            input: absolute,
            output,
        })
    }
}

/// Module directories and shim registry used during resolution
#[derive(Debug, Clone)]
pub struct AssetConfig {
    pub project_root: PathBuf,
    pub compiler_root: PathBuf,
    pub project_node_modules: PathBuf,
    pub compiler_node_modules: PathBuf,
    pub shim_dir: PathBuf,
    pub shims: ShimRegistry,
}

impl AssetConfig {
    /// Derive the asset configuration for a project.
    ///
    /// The shim directory is the compiler's modules directory when it
    /// exists, else the project's.
    pub fn detect(fs: &dyn FileSystem, project_root: &Path, compiler_root: &Path) -> Self {
        let project_node_modules = project_root.join("node_modules");
        let compiler_node_modules = compiler_root.join("node_modules");
        let shim_dir = if fs.is_dir(&compiler_node_modules) {
            compiler_node_modules.clone()
        } else {
            project_node_modules.clone()
        };
        let shims = ShimRegistry::standard(&shim_dir);
        Self {
            project_root: project_root.to_path_buf(),
            compiler_root: compiler_root.to_path_buf(),
            project_node_modules,
            compiler_node_modules,
            shim_dir,
            shims,
        }
    }

    /// Derive the asset name of a host path against this configuration
    pub fn asset_name(&self, path: &Path) -> BindleResult<String> {
        paths::asset_name_from_path(path, &self.compiler_root, &self.project_root)
    }
}

/// Locate the compiler installation root.
///
/// When the marker environment variable is set the symbolic root is used;
/// otherwise the root is two directories above the running executable.
pub fn detect_compiler_root() -> PathBuf {
    if std::env::var(COMPILER_ROOT_ENV)
        .map(|value| !value.is_empty())
        .unwrap_or(false)
    {
        return PathBuf::from(SYMBOLIC_COMPILER_ROOT);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().and_then(Path::parent).map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    #[test]
    fn entrypoint_relative_input_is_absolutized() {
        let entry = Entrypoint::resolve(Path::new("/p"), Path::new("src/index.ts")).unwrap();
        assert_eq!(entry.input, PathBuf::from("/p/src/index.ts"));
        assert_eq!(entry.output, "/src/index.js");
    }

    #[test]
    fn entrypoint_plain_js_keeps_suffix() {
        let entry = Entrypoint::resolve(Path::new("/p"), Path::new("/p/agent.js")).unwrap();
        assert_eq!(entry.output, "/agent.js");
    }

    #[test]
    fn entrypoint_outside_root_is_invalid() {
        let err = Entrypoint::resolve(Path::new("/p"), Path::new("/other/agent.ts")).unwrap_err();
        assert!(matches!(err, BindleError::InvalidEntrypoint { .. }));
    }

    #[test]
    fn entrypoint_escaping_root_via_dotdot_is_invalid() {
        let err = Entrypoint::resolve(Path::new("/p"), Path::new("../outside/agent.ts")).unwrap_err();
        assert!(matches!(err, BindleError::InvalidEntrypoint { .. }));
    }

    #[test]
    fn shim_dir_prefers_compiler_modules() {
        let fs = MockFileSystem::new();
        fs.add_dir("/opt/compiler/node_modules");
        let config = AssetConfig::detect(&fs, Path::new("/p"), Path::new("/opt/compiler"));
        assert_eq!(config.shim_dir, PathBuf::from("/opt/compiler/node_modules"));
    }

    #[test]
    fn shim_dir_falls_back_to_project_modules() {
        let fs = MockFileSystem::new();
        let config = AssetConfig::detect(&fs, Path::new("/p"), Path::new("/opt/compiler"));
        assert_eq!(config.shim_dir, PathBuf::from("/p/node_modules"));
        assert!(config.shims.lookup("fs").is_some());
    }
}
