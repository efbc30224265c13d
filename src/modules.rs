//! Module records and module-kind detection
//!
//! A module is classified by the nearest enclosing package descriptor: a
//! `package.json` whose `type` field equals `"module"` makes it modern,
//! anything else (including no descriptor at all) makes it legacy.

use std::path::{Path, PathBuf};

use crate::fs::FileSystem;

/// Module system a source file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// CommonJS-style module, needs conversion before bundling
    Legacy,
    /// Native ESM
    Modern,
}

/// Source file content as read from disk or emitted by the compiler
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// A discovered module; never mutated after insertion into the bundler state
#[derive(Debug, Clone)]
pub struct Module {
    pub kind: ModuleKind,
    pub path: PathBuf,
    pub source: SourceFile,
}

/// Classify a file by walking parent directories until the first
/// `package.json` or the filesystem root.
pub fn detect_module_kind(fs: &dyn FileSystem, path: &Path) -> ModuleKind {
    let mut dir = path.parent();
    while let Some(current) = dir {
        let descriptor = current.join("package.json");
        if fs.exists(&descriptor) {
            return match package_type(fs, &descriptor).as_deref() {
                Some("module") => ModuleKind::Modern,
                _ => ModuleKind::Legacy,
            };
        }
        dir = current.parent();
    }
    ModuleKind::Legacy
}

fn package_type(fs: &dyn FileSystem, descriptor: &Path) -> Option<String> {
    let text = fs.read_to_string(descriptor).ok()?;
    let parsed: serde_json::Value = serde_json::from_str(&text).ok()?;
    parsed
        .get("type")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

/// Fields of a package descriptor the resolver cares about
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct PackageDescriptor {
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
}

impl PackageDescriptor {
    /// Load `dir/package.json`; `Ok(None)` when the descriptor is absent
    pub fn load(fs: &dyn FileSystem, dir: &Path) -> Option<PackageDescriptor> {
        let descriptor = dir.join("package.json");
        if !fs.exists(&descriptor) {
            return None;
        }
        let text = fs.read_to_string(&descriptor).ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Entry file relative to the package directory: `module`, else `main`,
    /// else `index.js`
    pub fn entry(&self) -> &str {
        self.module
            .as_deref()
            .or(self.main.as_deref())
            .unwrap_or("index.js")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    #[test]
    fn file_under_module_package_is_modern() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/node_modules/pkg/package.json", r#"{"type":"module"}"#);
        fs.add_file("/p/node_modules/pkg/index.js", "export {};");
        assert_eq!(
            detect_module_kind(&fs, Path::new("/p/node_modules/pkg/index.js")),
            ModuleKind::Modern
        );
    }

    #[test]
    fn file_under_plain_package_is_legacy() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/node_modules/pkg/package.json", r#"{"main":"index.js"}"#);
        fs.add_file("/p/node_modules/pkg/index.js", "module.exports = 1;");
        assert_eq!(
            detect_module_kind(&fs, Path::new("/p/node_modules/pkg/index.js")),
            ModuleKind::Legacy
        );
    }

    #[test]
    fn search_stops_at_first_descriptor() {
        let fs = MockFileSystem::new();
        // The outer package says module, but the inner descriptor wins.
        fs.add_file("/p/package.json", r#"{"type":"module"}"#);
        fs.add_file("/p/node_modules/dep/package.json", r#"{}"#);
        fs.add_file("/p/node_modules/dep/lib/a.js", "");
        assert_eq!(
            detect_module_kind(&fs, Path::new("/p/node_modules/dep/lib/a.js")),
            ModuleKind::Legacy
        );
    }

    #[test]
    fn no_descriptor_anywhere_is_legacy() {
        let fs = MockFileSystem::new();
        fs.add_file("/loose/file.js", "");
        assert_eq!(
            detect_module_kind(&fs, Path::new("/loose/file.js")),
            ModuleKind::Legacy
        );
    }

    #[test]
    fn unreadable_descriptor_is_legacy() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/package.json", "not json at all {");
        fs.add_file("/p/a.js", "");
        assert_eq!(detect_module_kind(&fs, Path::new("/p/a.js")), ModuleKind::Legacy);
    }

    #[test]
    fn descriptor_entry_prefers_module_field() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "/p/node_modules/pkg/package.json",
            r#"{"main":"lib/main.js","module":"lib/esm.js"}"#,
        );
        let descriptor = PackageDescriptor::load(&fs, Path::new("/p/node_modules/pkg")).unwrap();
        assert_eq!(descriptor.entry(), "lib/esm.js");
    }

    #[test]
    fn descriptor_entry_defaults_to_index_js() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/node_modules/pkg/package.json", "{}");
        let descriptor = PackageDescriptor::load(&fs, Path::new("/p/node_modules/pkg")).unwrap();
        assert_eq!(descriptor.entry(), "index.js");
    }
}
