//! Module specifier resolution
//!
//! Turns a specifier plus the requesting module's path into an on-disk
//! location. Shim registry hits override normal resolution; package
//! directories are entered through their descriptor's `module`/`main`
//! fields. When the canonical asset path differs from the specifier a
//! consumer would write, an alias is produced so the target loader can map
//! the bare name back to the embedded asset.

use std::path::{Path, PathBuf};

use crate::config::AssetConfig;
use crate::error::BindleResult;
use crate::fs::FileSystem;
use crate::modules::PackageDescriptor;
use crate::paths;

/// Alias from an embedded asset name back to the specifier consumers use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub asset_name: String,
    pub specifier: String,
}

/// Outcome of resolving one specifier
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved {
        path: PathBuf,
        alias: Option<Alias>,
    },
    Missing,
}

pub struct Resolver<'a> {
    fs: &'a dyn FileSystem,
    config: &'a AssetConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(fs: &'a dyn FileSystem, config: &'a AssetConfig) -> Self {
        Self { fs, config }
    }

    pub fn resolve(&self, specifier: &str, requester: &Path) -> BindleResult<Resolution> {
        if specifier.is_empty() {
            return Ok(Resolution::Missing);
        }

        let mut alias_needed = false;
        let mut candidate: PathBuf;

        if Path::new(specifier).is_absolute() {
            candidate = paths::native(specifier);
        } else {
            let (package, sub_path) = split_specifier(specifier);
            if let Some(shim) = self.config.shims.lookup(&package) {
                candidate = if shim.extension().map(|e| e == "js").unwrap_or(false) {
                    shim.to_path_buf()
                } else {
                    join_all(shim.to_path_buf(), &sub_path)
                };
                alias_needed = true;
            } else {
                let modules_dir = if self.requester_uses_compiler_modules(requester) {
                    &self.config.compiler_node_modules
                } else {
                    &self.config.project_node_modules
                };
                candidate = join_all(modules_dir.join(paths::native(&package)), &sub_path);
                alias_needed = !sub_path.is_empty();
            }
        }

        if self.fs.is_dir(&candidate) {
            match PackageDescriptor::load(self.fs, &candidate) {
                Some(descriptor) => {
                    candidate = candidate.join(paths::native(descriptor.entry()));
                    if self.fs.is_dir(&candidate) {
                        candidate.push("index.js");
                    }
                    alias_needed = true;
                }
                None => candidate.push("index.js"),
            }
        }

        if !self.fs.exists(&candidate) {
            let with_suffix = append_js(&candidate);
            if self.fs.exists(&with_suffix) {
                candidate = with_suffix;
            } else {
                return Ok(Resolution::Missing);
            }
        }

        let alias = if alias_needed {
            Some(Alias {
                asset_name: self.config.asset_name(&candidate)?,
                specifier: specifier.to_string(),
            })
        } else {
            None
        };

        Ok(Resolution::Resolved {
            path: candidate,
            alias,
        })
    }

    /// Modules required from inside the compiler itself (or its link under
    /// the project's modules directory) resolve against the compiler's
    /// modules directory.
    fn requester_uses_compiler_modules(&self, requester: &Path) -> bool {
        requester.starts_with(&self.config.compiler_root)
            || requester.starts_with(self.config.project_node_modules.join("frida-compile"))
    }
}

/// Split a bare specifier into `(package, sub_path)`; scoped packages take
/// two tokens.
fn split_specifier(specifier: &str) -> (String, Vec<String>) {
    let tokens: Vec<&str> = specifier.split('/').collect();
    if tokens[0].starts_with('@') && tokens.len() >= 2 {
        (
            format!("{}/{}", tokens[0], tokens[1]),
            tokens[2..].iter().map(|t| t.to_string()).collect(),
        )
    } else {
        (
            tokens[0].to_string(),
            tokens[1..].iter().map(|t| t.to_string()).collect(),
        )
    }
}

fn join_all(mut base: PathBuf, parts: &[String]) -> PathBuf {
    for part in parts {
        base.push(part);
    }
    base
}

fn append_js(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(".js");
    PathBuf::from(raw)
}
