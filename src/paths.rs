//! Path handling
//!
//! Converts between host-native and portable (forward-slash) path forms and
//! derives asset names. Asset names, manifest entries, and source-map
//! `sources` are always portable and root-relative with a leading `/`;
//! filesystem queries always use the native form.

use std::path::{Component, Path, PathBuf};

use crate::error::{BindleError, BindleResult};

/// Native path separator as it appears in string form
#[cfg(windows)]
const NATIVE_SEPARATOR: char = '\\';
#[cfg(not(windows))]
const NATIVE_SEPARATOR: char = '/';

/// Convert a host path to its portable (forward-slash) string form
pub fn portable(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if NATIVE_SEPARATOR == '/' {
        raw.into_owned()
    } else {
        raw.replace(NATIVE_SEPARATOR, "/")
    }
}

/// Convert a portable path string back to a host path
pub fn native(portable: &str) -> PathBuf {
    if NATIVE_SEPARATOR == '/' {
        PathBuf::from(portable)
    } else {
        PathBuf::from(portable.replace('/', &NATIVE_SEPARATOR.to_string()))
    }
}

/// Lexically normalize a path, resolving `.` and `..` components without
/// touching the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Derive the asset name for a host path.
///
/// The longest of the two roots that prefixes the path is stripped; the
/// remainder, in portable form with a leading `/`, is the asset name.
pub fn asset_name_from_path(
    path: &Path,
    compiler_root: &Path,
    project_root: &Path,
) -> BindleResult<String> {
    let mut candidates: Vec<&Path> = Vec::with_capacity(2);
    if path.starts_with(compiler_root) {
        candidates.push(compiler_root);
    }
    if path.starts_with(project_root) {
        candidates.push(project_root);
    }
    let root = candidates
        .into_iter()
        .max_by_key(|root| root.components().count())
        .ok_or_else(|| BindleError::UnexpectedFilePath {
            path: path.to_path_buf(),
        })?;
    let relative = path
        .strip_prefix(root)
        .map_err(|_| BindleError::UnexpectedFilePath {
            path: path.to_path_buf(),
        })?;
    Ok(format!("/{}", portable(relative)))
}

/// Portable directory name of a host path, used as a source-map root
pub fn portable_dirname(path: &Path) -> String {
    match path.parent() {
        Some(parent) => portable(parent),
        None => String::new(),
    }
}
