//! Compile front
//!
//! The typed-source compiler and the legacy-to-modern transformer are
//! external services behind the `Compiler` trait; emission goes through an
//! explicit write callback rather than a shared mutable hook. This module
//! also assembles compiler options by overlaying the project's
//! `tsconfig.json` onto bundling defaults, and ships a passthrough
//! implementation used when no external compiler is linked.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::SourceMaps;
use crate::error::BindleResult;
use crate::fs::FileSystem;
use crate::walker::scan_specifiers;
use crate::paths;

/// Typed-source suffixes and their compiled counterparts
const SUFFIX_MAP: &[(&str, &str)] = &[
    ("ts", "js"),
    ("tsx", "js"),
    ("mts", "mjs"),
    ("cts", "cjs"),
];

/// Rewrite a typed-source suffix to its compiled form; other paths pass
/// through unchanged.
pub fn compiled_path(path: &Path) -> PathBuf {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        for (typed, compiled) in SUFFIX_MAP {
            if ext == *typed {
                return path.with_extension(compiled);
            }
        }
    }
    path.to_path_buf()
}

/// Compiler options, mirroring the project configuration file's
/// `compilerOptions` shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerOptions {
    pub target: String,
    pub module: String,
    pub module_resolution: String,
    pub resolve_json_module: bool,
    pub allow_js: bool,
    pub strict: bool,
    pub no_emit: bool,
    pub root_dir: Option<PathBuf>,
    pub out_dir: Option<String>,
    pub source_root: Option<PathBuf>,
    pub source_map: bool,
    pub inline_source_map: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            target: "es2020".to_string(),
            module: "es2020".to_string(),
            module_resolution: "bundler".to_string(),
            resolve_json_module: true,
            allow_js: true,
            strict: true,
            no_emit: false,
            root_dir: None,
            out_dir: None,
            source_root: None,
            source_map: false,
            inline_source_map: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProjectConfigFile {
    compiler_options: CompilerOptions,
}

/// Load the project's `tsconfig.json` (if present) over the defaults, then
/// force the bundling overrides: emission on, rooted at the project, output
/// at `/`, and separate map files when source maps are included.
pub fn assemble_options(
    fs: &dyn FileSystem,
    project_root: &Path,
    source_maps: SourceMaps,
) -> CompilerOptions {
    let config_path = project_root.join("tsconfig.json");
    let mut options = if fs.exists(&config_path) {
        fs.read_to_string(&config_path)
            .ok()
            .and_then(|text| serde_json::from_str::<ProjectConfigFile>(&text).ok())
            .map(|file| file.compiler_options)
            .unwrap_or_default()
    } else {
        CompilerOptions::default()
    };

    options.no_emit = false;
    options.root_dir = Some(project_root.to_path_buf());
    options.out_dir = Some("/".to_string());
    match source_maps {
        SourceMaps::Included => {
            options.source_root = Some(project_root.to_path_buf());
            options.source_map = true;
            options.inline_source_map = false;
        }
        SourceMaps::Omitted => {
            options.source_map = false;
            options.inline_source_map = false;
        }
    }
    options
}

/// Which of the two compile passes is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilePass {
    /// Modern compilation over the entrypoint
    Initial,
    /// Re-compilation of discovered legacy modules through the
    /// legacy-to-modern transformer
    LegacyConversion,
}

/// One compiler invocation
pub struct CompileJob<'a> {
    pub options: &'a CompilerOptions,
    pub inputs: Vec<PathBuf>,
    pub pass: CompilePass,
}

/// A file produced by the compiler; `path` is the absolute host location
/// the asset name derives from, `origin` the source it was compiled from
#[derive(Debug, Clone)]
pub struct EmittedAsset {
    pub path: PathBuf,
    pub contents: Vec<u8>,
    pub origin: PathBuf,
}

/// A compiler diagnostic; forwarded, never fatal by itself
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub file: Option<PathBuf>,
    pub line: Option<usize>,
}

/// External typed-source compiler service
pub trait Compiler: Send + Sync {
    fn compile(
        &self,
        job: &CompileJob,
        emit: &mut dyn FnMut(EmittedAsset),
        diagnostic: &mut dyn FnMut(Diagnostic),
    ) -> BindleResult<()>;
}

/// Built-in compiler used when no external typed-source compiler is linked.
///
/// It emits sources unchanged under their compiled suffix (the sandboxed
/// runtime accepts modern syntax directly) and, like a real compiler
/// program, follows relative imports so the whole project closure is
/// emitted in one pass. Type checking is explicitly not its job.
pub struct PassthroughCompiler {
    fs: Arc<dyn FileSystem>,
}

impl PassthroughCompiler {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Resolve a relative specifier to a project source file, trying the
    /// typed-source variants an external compiler would consider.
    fn resolve_relative(&self, dir: &Path, specifier: &str) -> Option<PathBuf> {
        let joined = paths::normalize(&dir.join(specifier));
        let mut candidates = Vec::new();
        match joined.extension().and_then(|e| e.to_str()) {
            Some("js") => {
                candidates.push(joined.with_extension("ts"));
                candidates.push(joined.with_extension("tsx"));
                candidates.push(joined.clone());
            }
            Some("ts") | Some("tsx") | Some("mts") | Some("cts") => candidates.push(joined.clone()),
            _ => {
                let raw = joined.as_os_str().to_os_string();
                for suffix in [".ts", ".tsx", ".js"] {
                    let mut with_suffix = raw.clone();
                    with_suffix.push(suffix);
                    candidates.push(PathBuf::from(with_suffix));
                }
            }
        }
        candidates.into_iter().find(|c| self.fs.exists(c) && !self.fs.is_dir(c))
    }
}

impl Compiler for PassthroughCompiler {
    fn compile(
        &self,
        job: &CompileJob,
        emit: &mut dyn FnMut(EmittedAsset),
        _diagnostic: &mut dyn FnMut(Diagnostic),
    ) -> BindleResult<()> {
        match job.pass {
            CompilePass::Initial => {
                let root = job.options.root_dir.clone().unwrap_or_default();
                let mut queue: Vec<PathBuf> = job.inputs.clone();
                let mut seen: HashSet<PathBuf> = queue.iter().cloned().collect();
                while let Some(input) = queue.pop() {
                    let text = self.fs.read_to_string(&input)?;
                    for specifier in scan_specifiers(&text) {
                        if !specifier.starts_with('.') || specifier.ends_with(".json") {
                            continue;
                        }
                        let dir = input.parent().unwrap_or(Path::new("/"));
                        if let Some(source) = self.resolve_relative(dir, &specifier) {
                            if source.starts_with(&root) && seen.insert(source.clone()) {
                                queue.push(source);
                            }
                        }
                    }
                    emit(EmittedAsset {
                        path: compiled_path(&input),
                        contents: text.into_bytes(),
                        origin: input,
                    });
                }
            }
            CompilePass::LegacyConversion => {
                for input in &job.inputs {
                    let text = self.fs.read_to_string(input)?;
                    emit(EmittedAsset {
                        path: compiled_path(input),
                        contents: text.into_bytes(),
                        origin: input.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    #[test]
    fn compiled_path_rewrites_typed_suffixes() {
        assert_eq!(compiled_path(Path::new("/p/a.ts")), PathBuf::from("/p/a.js"));
        assert_eq!(compiled_path(Path::new("/p/a.tsx")), PathBuf::from("/p/a.js"));
        assert_eq!(compiled_path(Path::new("/p/a.mts")), PathBuf::from("/p/a.mjs"));
        assert_eq!(compiled_path(Path::new("/p/a.js")), PathBuf::from("/p/a.js"));
        assert_eq!(compiled_path(Path::new("/p/a.json")), PathBuf::from("/p/a.json"));
    }

    #[test]
    fn default_options_match_bundling_defaults() {
        let options = CompilerOptions::default();
        assert_eq!(options.target, "es2020");
        assert_eq!(options.module, "es2020");
        assert!(options.resolve_json_module);
        assert!(options.allow_js);
        assert!(options.strict);
    }

    #[test]
    fn assemble_overlays_project_config_and_forces_overrides() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "/p/tsconfig.json",
            r#"{"compilerOptions":{"target":"es2022","noEmit":true,"outDir":"build"}}"#,
        );
        let options = assemble_options(&fs, Path::new("/p"), SourceMaps::Included);
        assert_eq!(options.target, "es2022");
        assert!(!options.no_emit, "noEmit must be cleared");
        assert_eq!(options.out_dir.as_deref(), Some("/"));
        assert_eq!(options.root_dir, Some(PathBuf::from("/p")));
        assert_eq!(options.source_root, Some(PathBuf::from("/p")));
        assert!(options.source_map);
        assert!(!options.inline_source_map);
    }

    #[test]
    fn assemble_without_config_or_maps() {
        let fs = MockFileSystem::new();
        let options = assemble_options(&fs, Path::new("/p"), SourceMaps::Omitted);
        assert_eq!(options.target, "es2020");
        assert!(!options.source_map);
        assert!(options.source_root.is_none());
    }

    #[test]
    fn malformed_config_falls_back_to_defaults() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/tsconfig.json", "{not valid json");
        let options = assemble_options(&fs, Path::new("/p"), SourceMaps::Omitted);
        assert_eq!(options.target, "es2020");
    }

    #[test]
    fn passthrough_emits_entry_under_compiled_suffix() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/p/index.ts", "export const x = 1;\n");
        let compiler = PassthroughCompiler::new(fs);
        let options = CompilerOptions {
            root_dir: Some(PathBuf::from("/p")),
            ..CompilerOptions::default()
        };
        let mut emitted = Vec::new();
        compiler
            .compile(
                &CompileJob {
                    options: &options,
                    inputs: vec![PathBuf::from("/p/index.ts")],
                    pass: CompilePass::Initial,
                },
                &mut |asset| emitted.push(asset),
                &mut |_| {},
            )
            .unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].path, PathBuf::from("/p/index.js"));
        assert_eq!(emitted[0].origin, PathBuf::from("/p/index.ts"));
    }

    #[test]
    fn passthrough_follows_relative_imports_within_root() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/p/index.ts", "import { u } from \"./util\";\nexport const x = u;\n");
        fs.add_file("/p/util.ts", "export const u = 2;\n");
        let compiler = PassthroughCompiler::new(fs);
        let options = CompilerOptions {
            root_dir: Some(PathBuf::from("/p")),
            ..CompilerOptions::default()
        };
        let mut emitted = Vec::new();
        compiler
            .compile(
                &CompileJob {
                    options: &options,
                    inputs: vec![PathBuf::from("/p/index.ts")],
                    pass: CompilePass::Initial,
                },
                &mut |asset| emitted.push(asset),
                &mut |_| {},
            )
            .unwrap();
        let mut emitted_paths: Vec<_> = emitted.iter().map(|a| a.path.clone()).collect();
        emitted_paths.sort();
        assert_eq!(
            emitted_paths,
            vec![PathBuf::from("/p/index.js"), PathBuf::from("/p/util.js")]
        );
    }

    #[test]
    fn passthrough_ignores_bare_and_json_imports() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file(
            "/p/index.ts",
            "import fs from \"fs\";\nimport d from \"./d.json\";\nexport {};\n",
        );
        let compiler = PassthroughCompiler::new(fs);
        let options = CompilerOptions {
            root_dir: Some(PathBuf::from("/p")),
            ..CompilerOptions::default()
        };
        let mut emitted = Vec::new();
        compiler
            .compile(
                &CompileJob {
                    options: &options,
                    inputs: vec![PathBuf::from("/p/index.ts")],
                    pass: CompilePass::Initial,
                },
                &mut |asset| emitted.push(asset),
                &mut |_| {},
            )
            .unwrap();
        assert_eq!(emitted.len(), 1);
    }

    #[test]
    fn legacy_pass_reemits_at_same_path() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/p/node_modules/dep/index.js", "\"use strict\";\nmodule.exports = 1;\n");
        let compiler = PassthroughCompiler::new(fs);
        let options = CompilerOptions::default();
        let mut emitted = Vec::new();
        compiler
            .compile(
                &CompileJob {
                    options: &options,
                    inputs: vec![PathBuf::from("/p/node_modules/dep/index.js")],
                    pass: CompilePass::LegacyConversion,
                },
                &mut |asset| emitted.push(asset),
                &mut |_| {},
            )
            .unwrap();
        assert_eq!(emitted[0].path, PathBuf::from("/p/node_modules/dep/index.js"));
    }
}
