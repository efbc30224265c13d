//! File system abstraction
//!
//! The bundler only ever queries and reads through this trait; the one
//! write it performs (the artifact itself) goes through `atomic_write`.

use std::path::Path;
use std::thread;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{BindleError, BindleResult};

/// Abstract file system interface
pub trait FileSystem: Send + Sync {
    /// Read file content as UTF-8 text
    fn read_to_string(&self, path: &Path) -> BindleResult<String>;

    /// Read raw file content
    fn read(&self, path: &Path) -> BindleResult<Vec<u8>>;

    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if a path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Compute a SHA-256 hash of file content
    fn hash_file(&self, path: &Path) -> BindleResult<String>;
}

/// Local file system implementation
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn read_to_string(&self, path: &Path) -> BindleResult<String> {
        std::fs::read_to_string(path).map_err(|source| BindleError::ReadFailure {
            path: path.to_path_buf(),
            source,
        })
    }

    fn read(&self, path: &Path) -> BindleResult<Vec<u8>> {
        std::fs::read(path).map_err(|source| BindleError::ReadFailure {
            path: path.to_path_buf(),
            source,
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn hash_file(&self, path: &Path) -> BindleResult<String> {
        let content = self.read(path)?;
        Ok(sha256_hex(&content))
    }
}

fn sha256_hex(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Longest backoff the artifact writer will wait before declaring the
/// destination stuck
const MAX_PERSIST_BACKOFF: Duration = Duration::from_millis(400);

/// Replace `path` atomically.
///
/// The payload is staged in a temporary file in the destination directory
/// and moved into place, so a reader of the artifact (the target loader,
/// an editor, a deploy script tailing the watch output) never observes a
/// half-written file. A destination held open by another process is
/// retried with doubling backoff until `MAX_PERSIST_BACKOFF`.
pub fn atomic_write(path: &Path, content: &[u8]) -> BindleResult<()> {
    use std::io::Write;

    let destination_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(destination_dir)?;

    let mut staged = NamedTempFile::new_in(destination_dir)?;
    staged.write_all(content)?;
    staged.flush()?;

    let mut backoff = Duration::from_millis(50);
    loop {
        match staged.persist(path) {
            Ok(_) => return Ok(()),
            Err(failure) if backoff <= MAX_PERSIST_BACKOFF => {
                thread::sleep(backoff);
                backoff *= 2;
                staged = failure.file;
            }
            Err(failure) => return Err(failure.error.into()),
        }
    }
}

/// Mock file system for testing
#[cfg(test)]
pub struct MockFileSystem {
    files: std::sync::Mutex<std::collections::HashMap<std::path::PathBuf, String>>,
    dirs: std::sync::Mutex<std::collections::HashSet<std::path::PathBuf>>,
}

#[cfg(test)]
impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: std::sync::Mutex::new(std::collections::HashMap::new()),
            dirs: std::sync::Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// Insert a file, implicitly creating every ancestor directory
    pub fn add_file(&self, path: impl Into<std::path::PathBuf>, content: impl Into<String>) {
        let path = path.into();
        let mut ancestor = path.parent();
        let mut dirs = self.dirs.lock().unwrap();
        while let Some(dir) = ancestor {
            dirs.insert(dir.to_path_buf());
            ancestor = dir.parent();
        }
        self.files.lock().unwrap().insert(path, content.into());
    }

    pub fn add_dir(&self, path: impl Into<std::path::PathBuf>) {
        let path = path.into();
        let mut ancestor = Some(path.as_path());
        let mut dirs = self.dirs.lock().unwrap();
        while let Some(dir) = ancestor {
            dirs.insert(dir.to_path_buf());
            ancestor = dir.parent();
        }
    }
}

#[cfg(test)]
impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> BindleResult<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| BindleError::ReadFailure {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            })
    }

    fn read(&self, path: &Path) -> BindleResult<Vec<u8>> {
        self.read_to_string(path).map(String::into_bytes)
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path) || self.is_dir(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.lock().unwrap().contains(path)
    }

    fn hash_file(&self, path: &Path) -> BindleResult<String> {
        Ok(sha256_hex(&self.read(path)?))
    }
}
