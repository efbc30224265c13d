//! Bundler state: the asset table
//!
//! One `BundlerState` value holds every coordinated mapping of a bundling:
//! emitted asset bytes, provenance, aliases, the pending worklist, the
//! processed set, discovered JSON files, and the external-source cache.
//! A build creates a fresh value; the watch coordinator keeps one alive
//! across rebuilds and invalidates selectively.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::modules::{Module, SourceFile};

/// Worklist entry: an unresolved specifier (or absolute path) plus the
/// module that referenced it
#[derive(Debug, Clone)]
pub struct PendingModule {
    pub key: String,
    pub requester: PathBuf,
}

/// Mutable closure state of a single bundling
#[derive(Debug, Default)]
pub struct BundlerState {
    /// Asset name → payload bytes
    pub output: BTreeMap<String, Vec<u8>>,
    /// Asset name → absolute host path it came from
    pub origins: HashMap<String, PathBuf>,
    /// Asset name → the bare specifier loaders should recognize
    pub aliases: BTreeMap<String, String>,
    /// Discovered modules by absolute host path
    pub modules: HashMap<PathBuf, Module>,
    /// Absolute host paths of JSON data files
    pub json_files: BTreeSet<PathBuf>,
    /// Cache of files read from disk outside the compile step
    pub external_sources: HashMap<PathBuf, SourceFile>,
    pending: VecDeque<PendingModule>,
    pending_keys: HashSet<String>,
    processed: HashSet<String>,
    missing: Vec<String>,
}

impl BundlerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-run scratch state. Assets, modules, and caches survive so
    /// watch rebuilds stay incremental.
    pub fn begin_run(&mut self) {
        self.pending.clear();
        self.pending_keys.clear();
        self.missing.clear();
    }

    /// Queue a specifier for resolution unless it was already seen
    pub fn enqueue_pending(&mut self, key: impl Into<String>, requester: impl Into<PathBuf>) {
        let key = key.into();
        if self.processed.contains(&key) || self.pending_keys.contains(&key) {
            return;
        }
        self.pending_keys.insert(key.clone());
        self.pending.push_back(PendingModule {
            key,
            requester: requester.into(),
        });
    }

    /// Pop the oldest pending entry and mark it processed
    pub fn pop_pending(&mut self) -> Option<PendingModule> {
        let entry = self.pending.pop_front()?;
        self.pending_keys.remove(&entry.key);
        self.processed.insert(entry.key.clone());
        Some(entry)
    }

    pub fn pending_is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn mark_processed(&mut self, key: impl Into<String>) {
        self.processed.insert(key.into());
    }

    pub fn is_processed(&self, key: &str) -> bool {
        self.processed.contains(key)
    }

    pub fn record_missing(&mut self, specifier: impl Into<String>) {
        self.missing.push(specifier.into());
    }

    pub fn take_missing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.missing)
    }

    pub fn has_missing(&self) -> bool {
        !self.missing.is_empty()
    }

    /// Insert or overwrite an asset. A later write at the same name wins,
    /// which is what lets the legacy conversion pass replace pass-one
    /// output.
    pub fn insert_output(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.output.insert(name.into(), bytes);
    }

    pub fn set_origin(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.origins.insert(name.into(), path.into());
    }

    pub fn register_alias(&mut self, asset_name: impl Into<String>, specifier: impl Into<String>) {
        self.aliases.insert(asset_name.into(), specifier.into());
    }

    /// Cache an external source file, returning whether it was newly added
    pub fn cache_external_source(&mut self, source: SourceFile) -> bool {
        let fresh = !self.external_sources.contains_key(&source.path);
        self.external_sources.insert(source.path.clone(), source);
        fresh
    }

    /// Drop everything derived from `path` so the next bundling rebuilds it.
    ///
    /// The processed set is cleared wholesale, forcing the dependency walk
    /// to re-discover every module against the new snapshot.
    pub fn invalidate_path(&mut self, path: &Path) {
        let stale: Vec<String> = self
            .origins
            .iter()
            .filter(|(_, origin)| origin.as_path() == path)
            .map(|(name, _)| name.clone())
            .collect();
        for name in stale {
            self.output.remove(&name);
            self.output.remove(&format!("{name}.map"));
            self.origins.remove(&name);
        }
        self.processed.clear();
        self.external_sources.remove(path);
        self.json_files.remove(path);
        self.modules.remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::ModuleKind;

    fn module(path: &str) -> Module {
        Module {
            kind: ModuleKind::Modern,
            path: PathBuf::from(path),
            source: SourceFile::new(path, ""),
        }
    }

    #[test]
    fn pending_preserves_insertion_order() {
        let mut state = BundlerState::new();
        state.enqueue_pending("b", "/p/a.js");
        state.enqueue_pending("a", "/p/a.js");
        assert_eq!(state.pop_pending().unwrap().key, "b");
        assert_eq!(state.pop_pending().unwrap().key, "a");
    }

    #[test]
    fn processed_entries_never_requeue() {
        let mut state = BundlerState::new();
        state.enqueue_pending("pkg", "/p/a.js");
        state.pop_pending();
        state.enqueue_pending("pkg", "/p/b.js");
        assert!(state.pending_is_empty());
    }

    #[test]
    fn pending_and_processed_stay_disjoint() {
        let mut state = BundlerState::new();
        state.enqueue_pending("x", "/p/a.js");
        state.enqueue_pending("x", "/p/b.js");
        let popped = state.pop_pending().unwrap();
        assert_eq!(popped.key, "x");
        assert!(state.pending_is_empty());
        assert!(state.is_processed("x"));
    }

    #[test]
    fn later_output_write_wins() {
        let mut state = BundlerState::new();
        state.insert_output("/a.js", b"first".to_vec());
        state.insert_output("/a.js", b"second".to_vec());
        assert_eq!(state.output["/a.js"], b"second");
    }

    #[test]
    fn alias_per_asset_name_is_unique() {
        let mut state = BundlerState::new();
        state.register_alias("/node_modules/frida-fs/index.js", "fs");
        state.register_alias("/node_modules/frida-fs/index.js", "fs");
        assert_eq!(state.aliases.len(), 1);
    }

    #[test]
    fn invalidate_drops_asset_map_sibling_and_caches() {
        let mut state = BundlerState::new();
        state.insert_output("/src/a.js", b"code".to_vec());
        state.insert_output("/src/a.js.map", b"{}".to_vec());
        state.set_origin("/src/a.js", "/p/src/a.ts");
        state.mark_processed("/p/src/a");
        state
            .external_sources
            .insert(PathBuf::from("/p/src/a.ts"), SourceFile::new("/p/src/a.ts", ""));
        state.modules.insert(PathBuf::from("/p/src/a.ts"), module("/p/src/a.ts"));

        state.invalidate_path(Path::new("/p/src/a.ts"));

        assert!(state.output.is_empty());
        assert!(state.origins.is_empty());
        assert!(!state.is_processed("/p/src/a"));
        assert!(state.external_sources.is_empty());
        assert!(state.modules.is_empty());
    }

    #[test]
    fn invalidate_leaves_unrelated_assets_alone() {
        let mut state = BundlerState::new();
        state.insert_output("/src/a.js", b"a".to_vec());
        state.set_origin("/src/a.js", "/p/src/a.ts");
        state.insert_output("/src/b.js", b"b".to_vec());
        state.set_origin("/src/b.js", "/p/src/b.ts");

        state.invalidate_path(Path::new("/p/src/a.ts"));

        assert!(!state.output.contains_key("/src/a.js"));
        assert!(state.output.contains_key("/src/b.js"));
    }

    #[test]
    fn begin_run_clears_scratch_but_keeps_assets() {
        let mut state = BundlerState::new();
        state.insert_output("/a.js", b"x".to_vec());
        state.enqueue_pending("pkg", "/p/a.js");
        state.record_missing("pkg");
        state.begin_run();
        assert!(state.pending_is_empty());
        assert!(!state.has_missing());
        assert!(state.output.contains_key("/a.js"));
    }
}
