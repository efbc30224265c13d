//! Shim registry
//!
//! The sandboxed target runtime has no standard library, so a fixed set of
//! bare module names is rerouted to substitute packages beneath the shim
//! directory. A registry hit overrides normal resolution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Bare module names and the shim packages that stand in for them
pub const STANDARD_SHIMS: &[(&str, &str)] = &[
    ("assert", "@frida/assert"),
    ("base64-js", "@frida/base64-js"),
    ("buffer", "@frida/buffer"),
    ("diagnostics_channel", "@frida/diagnostics_channel"),
    ("events", "@frida/events"),
    ("fs", "frida-fs"),
    ("http", "@frida/http"),
    ("https", "@frida/https"),
    ("http-parser-js", "@frida/http-parser-js"),
    ("ieee754", "@frida/ieee754"),
    ("net", "@frida/net"),
    ("os", "@frida/os"),
    ("path", "@frida/path"),
    ("process", "@frida/process"),
    ("punycode", "@frida/punycode"),
    ("querystring", "@frida/querystring"),
    ("readable-stream", "@frida/readable-stream"),
    ("stream", "@frida/stream"),
    ("string_decoder", "@frida/string_decoder"),
    ("timers", "@frida/timers"),
    ("tty", "@frida/tty"),
    ("url", "@frida/url"),
    ("util", "@frida/util"),
    ("vm", "@frida/vm"),
];

/// Mapping from bare module name to an on-disk shim location
#[derive(Debug, Clone, Default)]
pub struct ShimRegistry {
    entries: HashMap<String, PathBuf>,
}

impl ShimRegistry {
    /// Build the standard registry rooted at `shim_dir`
    pub fn standard(shim_dir: &Path) -> Self {
        let entries = STANDARD_SHIMS
            .iter()
            .map(|(name, package)| (name.to_string(), shim_dir.join(package)))
            .collect();
        Self { entries }
    }

    /// An empty registry (no rerouting)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up the shim location for a bare package name
    pub fn lookup(&self, package: &str) -> Option<&Path> {
        self.entries.get(package).map(PathBuf::as_path)
    }

    /// Register or replace a single shim
    pub fn insert(&mut self, package: impl Into<String>, location: impl Into<PathBuf>) {
        self.entries.insert(package.into(), location.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_reroutes_fs() {
        let registry = ShimRegistry::standard(Path::new("/p/node_modules"));
        assert_eq!(
            registry.lookup("fs").unwrap(),
            Path::new("/p/node_modules/frida-fs")
        );
    }

    #[test]
    fn standard_registry_uses_scoped_packages() {
        let registry = ShimRegistry::standard(Path::new("/p/node_modules"));
        assert_eq!(
            registry.lookup("stream").unwrap(),
            Path::new("/p/node_modules/@frida/stream")
        );
    }

    #[test]
    fn unknown_names_miss() {
        let registry = ShimRegistry::standard(Path::new("/p/node_modules"));
        assert!(registry.lookup("left-pad").is_none());
    }

    #[test]
    fn covers_every_standard_name() {
        let registry = ShimRegistry::standard(Path::new("/s"));
        for (name, _) in STANDARD_SHIMS {
            assert!(registry.lookup(name).is_some(), "missing shim for {name}");
        }
    }
}
