//! Watch coordinator
//!
//! Drives incremental rebundles in response to file change notifications:
//! 250 ms debounce, single-flight execution with at most one queued
//! follow-up, and selective invalidation of the shared bundler state.
//! Failures are reported as events and the coordinator keeps running.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::assets::BundlerState;
use crate::bundler::Bundler;
use crate::error::{BindleError, BindleResult};
use crate::fs::FileSystem;

/// Debounce duration in milliseconds
pub const DEBOUNCE_MS: u64 = 250;

/// Poll interval for the change channel
const POLL_MS: u64 = 50;

/// Source suffixes that can invalidate a bundling
const WATCHED_SUFFIXES: &[&str] = &["ts", "tsx", "mts", "cts", "js", "json"];

/// Watch event types for NDJSON output
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WatchEvent {
    WatchStarted {
        entrypoint: String,
    },
    FileChanged {
        path: String,
    },
    BundleStarted,
    BundleUpdated {
        /// Full artifact text, delivered to in-process subscribers only
        #[serde(skip)]
        artifact: String,
        size: usize,
    },
    Error {
        message: String,
    },
    Shutdown,
}

impl WatchEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Coordinator phase: whether an invalidation has been observed since the
/// last bundling started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Clean,
    Dirty,
}

/// Rebundle scheduling state.
///
/// A change marks the phase dirty and arms the debounce timer once; a
/// bundling flips the phase clean before it runs, so changes arriving
/// mid-flight leave exactly one follow-up behind.
#[derive(Debug)]
pub struct RebundleState {
    phase: Phase,
    in_flight: bool,
    deadline: Option<Instant>,
}

impl RebundleState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Clean,
            in_flight: false,
            deadline: None,
        }
    }

    /// Record an invalidation; the timer is armed only if nothing is
    /// scheduled or running yet.
    pub fn note_change(&mut self) {
        self.phase = Phase::Dirty;
        if !self.in_flight && self.deadline.is_none() {
            self.deadline = Some(Instant::now() + Duration::from_millis(DEBOUNCE_MS));
        }
    }

    /// Request a rebundle with no debounce delay
    pub fn schedule_now(&mut self) {
        self.phase = Phase::Dirty;
        self.deadline = Some(Instant::now());
    }

    pub fn should_rebundle(&self) -> bool {
        self.phase == Phase::Dirty
            && !self.in_flight
            && self
                .deadline
                .map(|deadline| Instant::now() >= deadline)
                .unwrap_or(false)
    }

    /// Mark a bundling as started
    pub fn begin(&mut self) {
        self.phase = Phase::Clean;
        self.in_flight = true;
        self.deadline = None;
    }

    /// Mark the in-flight bundling finished; returns whether a follow-up
    /// run is owed.
    pub fn finish(&mut self) -> bool {
        self.in_flight = false;
        self.phase == Phase::Dirty
    }
}

impl Default for RebundleState {
    fn default() -> Self {
        Self::new()
    }
}

/// Watch the project and re-emit the artifact on change.
///
/// Entrypoint validation failures abort the start; bundling failures after
/// that are reported via `Error` events and the loop continues.
pub fn watch(
    mut bundler: Bundler,
    running: Arc<AtomicBool>,
    event_callback: impl Fn(WatchEvent),
) -> BindleResult<()> {
    let entry = bundler.entrypoint()?;
    let fs = bundler.fs();
    let project_root = bundler.options().project_root.clone();

    event_callback(WatchEvent::WatchStarted {
        entrypoint: entry.input.display().to_string(),
    });

    let (tx, rx) = channel();
    let watcher = RecommendedWatcher::new(
        move |result: Result<Event, notify::Error>| {
            if let Ok(event) = result {
                for path in event.paths {
                    let _ = tx.send(path);
                }
            }
        },
        NotifyConfig::default(),
    )
    .map_err(notify_error)?;
    let watcher = Arc::new(Mutex::new(watcher));
    watcher
        .lock()
        .unwrap()
        .watch(&project_root, RecursiveMode::Recursive)
        .map_err(notify_error)?;

    // Every external source reported by the dependency walker gets its own
    // watcher; files under the project root are already covered.
    let watched_external: Arc<Mutex<HashSet<PathBuf>>> = Arc::new(Mutex::new(HashSet::new()));
    {
        let watcher = watcher.clone();
        let watched_external = watched_external.clone();
        let project_root = project_root.clone();
        bundler.on_external_source_added(move |path| {
            if path.starts_with(&project_root) {
                return;
            }
            if watched_external.lock().unwrap().insert(path.to_path_buf()) {
                let _ = watcher
                    .lock()
                    .unwrap()
                    .watch(path, RecursiveMode::NonRecursive);
            }
        });
    }

    let mut state = BundlerState::new();
    let mut rebundle = RebundleState::new();
    let mut content_hashes: HashMap<PathBuf, String> = HashMap::new();

    // Initial bundling runs as soon as the loop starts.
    rebundle.schedule_now();

    while running.load(Ordering::SeqCst) {
        if let Ok(path) = rx.recv_timeout(Duration::from_millis(POLL_MS)) {
            if is_relevant(&path, &watched_external.lock().unwrap()) {
                // Filter events that did not change content (editor noise)
                let changed = match fs.hash_file(&path) {
                    Ok(hash) => {
                        let unchanged = content_hashes.get(&path) == Some(&hash);
                        if !unchanged {
                            content_hashes.insert(path.clone(), hash);
                        }
                        !unchanged
                    }
                    Err(_) => {
                        content_hashes.remove(&path);
                        true
                    }
                };
                if changed {
                    state.invalidate_path(&path);
                    rebundle.note_change();
                    event_callback(WatchEvent::FileChanged {
                        path: path.display().to_string(),
                    });
                }
            }
        }

        if rebundle.should_rebundle() {
            rebundle.begin();
            event_callback(WatchEvent::BundleStarted);
            match bundler.bundle(&mut state) {
                Ok(artifact) => {
                    refresh_hashes(fs.as_ref(), &state, &mut content_hashes);
                    let size = artifact.len();
                    event_callback(WatchEvent::BundleUpdated { artifact, size });
                }
                Err(error) => {
                    event_callback(WatchEvent::Error {
                        message: error.to_string(),
                    });
                }
            }
            if rebundle.finish() {
                rebundle.schedule_now();
            }
        }
    }

    event_callback(WatchEvent::Shutdown);
    Ok(())
}

fn notify_error(error: notify::Error) -> BindleError {
    BindleError::Io(std::io::Error::other(error.to_string()))
}

fn is_relevant(path: &Path, watched_external: &HashSet<PathBuf>) -> bool {
    if watched_external.contains(path) {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| WATCHED_SUFFIXES.contains(&ext))
        .unwrap_or(false)
}

/// Seed the content-hash tracker so pre-existing files do not trigger a
/// spurious rebundle from startup notifications.
fn refresh_hashes(
    fs: &dyn FileSystem,
    state: &BundlerState,
    hashes: &mut HashMap<PathBuf, String>,
) {
    let paths = state
        .origins
        .values()
        .chain(state.external_sources.keys())
        .chain(state.json_files.iter());
    for path in paths {
        if !hashes.contains_key(path) {
            if let Ok(hash) = fs.hash_file(path) {
                hashes.insert(path.clone(), hash);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_event_to_json_started() {
        let event = WatchEvent::WatchStarted {
            entrypoint: "/p/index.ts".to_string(),
        };
        let json = event.to_json();
        assert!(json.contains("\"event\":\"watch_started\""));
        assert!(json.contains("\"entrypoint\":\"/p/index.ts\""));
    }

    #[test]
    fn watch_event_to_json_bundle_updated_skips_artifact() {
        let event = WatchEvent::BundleUpdated {
            artifact: "\u{1F4E6}\n...".to_string(),
            size: 42,
        };
        let json = event.to_json();
        assert!(json.contains("\"event\":\"bundle_updated\""));
        assert!(json.contains("\"size\":42"));
        assert!(!json.contains("\u{1F4E6}"), "artifact text must stay out of NDJSON");
    }

    #[test]
    fn watch_event_to_json_error() {
        let event = WatchEvent::Error {
            message: "bundle \"failed\"".to_string(),
        };
        let json = event.to_json();
        assert!(json.contains("\"event\":\"error\""));
        assert!(json.contains("\\\"failed\\\""));
    }

    #[test]
    fn burst_of_changes_coalesces_into_one_run() {
        let mut state = RebundleState::new();
        state.note_change();
        state.note_change();
        state.note_change();
        assert!(!state.should_rebundle(), "debounce must hold the run back");

        std::thread::sleep(Duration::from_millis(DEBOUNCE_MS + 20));
        assert!(state.should_rebundle());

        state.begin();
        let follow_up = state.finish();
        assert!(!follow_up, "burst before the run owes no follow-up");
        assert!(!state.should_rebundle());
    }

    #[test]
    fn debounce_timer_is_not_rearmed_by_later_changes() {
        let mut state = RebundleState::new();
        state.note_change();
        std::thread::sleep(Duration::from_millis(DEBOUNCE_MS - 50));
        state.note_change();
        std::thread::sleep(Duration::from_millis(60));
        // 250 ms after the first change, even though the second is younger.
        assert!(state.should_rebundle());
    }

    #[test]
    fn changes_during_flight_owe_exactly_one_follow_up() {
        let mut state = RebundleState::new();
        state.schedule_now();
        assert!(state.should_rebundle());
        state.begin();

        state.note_change();
        state.note_change();
        assert!(!state.should_rebundle(), "single-flight: no overlap");

        assert!(state.finish(), "dirty phase owes a follow-up");
        state.schedule_now();
        assert!(state.should_rebundle());
        state.begin();
        assert!(!state.finish(), "second run settles the state");
    }

    #[test]
    fn schedule_now_skips_debounce() {
        let mut state = RebundleState::new();
        state.schedule_now();
        assert!(state.should_rebundle());
    }

    #[test]
    fn relevance_by_suffix_and_external_set() {
        let mut external = HashSet::new();
        external.insert(PathBuf::from("/opt/compiler/ext/agent.generated"));
        assert!(is_relevant(Path::new("/p/index.ts"), &external));
        assert!(is_relevant(Path::new("/p/data.json"), &external));
        assert!(is_relevant(
            Path::new("/opt/compiler/ext/agent.generated"),
            &external
        ));
        assert!(!is_relevant(Path::new("/p/notes.md"), &external));
        assert!(!is_relevant(Path::new("/p/Makefile"), &external));
    }
}
