//! Bundling pipeline
//!
//! Drives one bundling end to end: compile the entrypoint, walk the
//! dependency closure, admit discovered files, re-compile legacy modules,
//! post-process, and serialize. All mutable closure state lives in the
//! caller's `BundlerState`, so a build uses a fresh value while the watch
//! coordinator keeps one alive across rebuilds.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::artifact::Artifact;
use crate::assets::BundlerState;
use crate::compiler::{
    assemble_options, CompileJob, CompilePass, Compiler, Diagnostic, EmittedAsset,
};
use crate::config::{AssetConfig, BundleOptions, Compression, Entrypoint, SourceMaps};
use crate::error::{BindleError, BindleResult};
use crate::fs::FileSystem;
use crate::modules::{detect_module_kind, Module, ModuleKind, SourceFile};
use crate::paths;
use crate::postprocess::{
    encode_json_module, fuse_source_map, strip_source_mapping_url, strip_strict_prologue,
    MapSettings, Minifier, MinifySettings, StripMinifier,
};
use crate::resolver::{Resolution, Resolver};
use crate::walker;

type ExternalSourceObserver = Box<dyn Fn(&Path) + Send + Sync>;
type DiagnosticSink = Box<dyn Fn(&Diagnostic) + Send + Sync>;

pub struct Bundler {
    options: BundleOptions,
    assets: AssetConfig,
    fs: Arc<dyn FileSystem>,
    compiler: Arc<dyn Compiler>,
    minifier: Arc<dyn Minifier>,
    external_source_observers: Vec<ExternalSourceObserver>,
    diagnostic_sink: Option<DiagnosticSink>,
}

impl Bundler {
    pub fn new(
        options: BundleOptions,
        assets: AssetConfig,
        fs: Arc<dyn FileSystem>,
        compiler: Arc<dyn Compiler>,
    ) -> Self {
        Self {
            options,
            assets,
            fs,
            compiler,
            minifier: Arc::new(StripMinifier),
            external_source_observers: Vec::new(),
            diagnostic_sink: None,
        }
    }

    pub fn with_minifier(mut self, minifier: Arc<dyn Minifier>) -> Self {
        self.minifier = minifier;
        self
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    pub fn fs(&self) -> Arc<dyn FileSystem> {
        self.fs.clone()
    }

    /// Register an observer fired the first time a file is read from disk
    /// outside the compile step. The watch coordinator uses this to install
    /// per-file watchers.
    pub fn on_external_source_added(&mut self, observer: impl Fn(&Path) + Send + Sync + 'static) {
        self.external_source_observers.push(Box::new(observer));
    }

    /// Register a sink for compiler diagnostics; they are never fatal
    pub fn on_diagnostic(&mut self, sink: impl Fn(&Diagnostic) + Send + Sync + 'static) {
        self.diagnostic_sink = Some(Box::new(sink));
    }

    /// Validate and derive the entrypoint pair
    pub fn entrypoint(&self) -> BindleResult<Entrypoint> {
        Entrypoint::resolve(&self.options.project_root, &self.options.entrypoint)
    }

    /// Run one complete bundling and serialize the artifact.
    ///
    /// The state is never partially published: either the whole pipeline
    /// succeeds and the artifact text is returned, or the error surfaces.
    pub fn bundle(&self, state: &mut BundlerState) -> BindleResult<String> {
        let entry = self.entrypoint()?;
        state.begin_run();

        let compiler_options =
            assemble_options(self.fs.as_ref(), &self.options.project_root, self.options.source_maps);

        // First pass: modern compilation over the entrypoint.
        let job = CompileJob {
            options: &compiler_options,
            inputs: vec![entry.input.clone()],
            pass: CompilePass::Initial,
        };
        let emitted = self.run_compile(&job)?;

        // Capture every emitted asset before walking: a compiled file must
        // already be marked processed when a sibling import of it is seen.
        let mut compiled_sources = Vec::new();
        for asset in &emitted {
            let name = self.assets.asset_name(&asset.path)?;
            state.insert_output(name.clone(), asset.contents.clone());
            state.set_origin(name.clone(), asset.origin.clone());
            if !name.ends_with(".map") && !name.ends_with(".json") {
                state.mark_processed(asset.path.to_string_lossy());
                state.mark_processed(asset.path.with_extension("").to_string_lossy());
                let text = String::from_utf8_lossy(&asset.contents).into_owned();
                compiled_sources.push(SourceFile::new(asset.path.clone(), text));
            }
        }
        for source in compiled_sources {
            let module = Module {
                kind: ModuleKind::Modern,
                path: source.path.clone(),
                source: source.clone(),
            };
            state.modules.insert(source.path.clone(), module);
            walker::walk(&source, state);
        }

        self.drain_pending(state)?;
        self.admit_discovered_files(state)?;
        self.convert_legacy_modules(state)?;
        let snapshot = self.postprocess(state)?;

        let artifact = Artifact::from_assets(&snapshot, &state.aliases, &entry.output);
        Ok(artifact.to_text())
    }

    fn run_compile(&self, job: &CompileJob) -> BindleResult<Vec<EmittedAsset>> {
        let mut emitted = Vec::new();
        let mut diagnostics = Vec::new();
        self.compiler.compile(
            job,
            &mut |asset| emitted.push(asset),
            &mut |diagnostic| diagnostics.push(diagnostic),
        )?;
        if let Some(sink) = &self.diagnostic_sink {
            for diagnostic in &diagnostics {
                sink(diagnostic);
            }
        }
        Ok(emitted)
    }

    /// Worklist loop: resolve pending specifiers until closure. Missing
    /// specifiers accumulate so the report covers all of them at once.
    fn drain_pending(&self, state: &mut BundlerState) -> BindleResult<()> {
        let resolver = Resolver::new(self.fs.as_ref(), &self.assets);
        while let Some(pending) = state.pop_pending() {
            match resolver.resolve(&pending.key, &pending.requester)? {
                Resolution::Missing => state.record_missing(pending.key),
                Resolution::Resolved { path, alias } => {
                    if let Some(alias) = alias {
                        state.register_alias(alias.asset_name, alias.specifier);
                    }
                    if path.extension().map(|e| e == "json").unwrap_or(false) {
                        state.json_files.insert(path);
                        continue;
                    }
                    let source = self.read_external_source(state, &path)?;
                    let kind = detect_module_kind(self.fs.as_ref(), &path);
                    state.modules.insert(
                        path.clone(),
                        Module {
                            kind,
                            path: path.clone(),
                            source: source.clone(),
                        },
                    );
                    walker::walk(&source, state);
                }
            }
        }
        let missing = state.take_missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(BindleError::UnresolvedDependencies(missing))
        }
    }

    fn read_external_source(
        &self,
        state: &mut BundlerState,
        path: &Path,
    ) -> BindleResult<SourceFile> {
        if let Some(cached) = state.external_sources.get(path) {
            return Ok(cached.clone());
        }
        let text = self.fs.read_to_string(path)?;
        let source = SourceFile::new(path.to_path_buf(), text);
        if state.cache_external_source(source.clone()) {
            for observer in &self.external_source_observers {
                observer(path);
            }
        }
        Ok(source)
    }

    /// Every discovered module and JSON file that the compiler did not emit
    /// is embedded from its on-disk content.
    fn admit_discovered_files(&self, state: &mut BundlerState) -> BindleResult<()> {
        let mut module_paths: Vec<PathBuf> = state.modules.keys().cloned().collect();
        module_paths.sort();
        for path in module_paths {
            let name = self.assets.asset_name(&path)?;
            if !state.output.contains_key(&name) {
                let bytes = match state.external_sources.get(&path) {
                    Some(source) => source.text.clone().into_bytes(),
                    None => self.fs.read(&path)?,
                };
                state.insert_output(name.clone(), bytes);
                state.set_origin(name, path);
            }
        }
        let json_paths: Vec<PathBuf> = state.json_files.iter().cloned().collect();
        for path in json_paths {
            let name = self.assets.asset_name(&path)?;
            if !state.output.contains_key(&name) {
                let source = self.read_external_source(state, &path)?;
                state.insert_output(name.clone(), source.text.into_bytes());
                state.set_origin(name, path);
            }
        }
        Ok(())
    }

    /// Second compile pass: rewrite every legacy module to modern form.
    /// Its writes land at the same asset names and win over pass one.
    fn convert_legacy_modules(&self, state: &mut BundlerState) -> BindleResult<()> {
        let mut legacy: Vec<PathBuf> = state
            .modules
            .values()
            .filter(|module| module.kind == ModuleKind::Legacy)
            .map(|module| module.path.clone())
            .collect();
        if legacy.is_empty() {
            return Ok(());
        }
        legacy.sort();

        let compiler_options =
            assemble_options(self.fs.as_ref(), &self.options.project_root, self.options.source_maps);
        let job = CompileJob {
            options: &compiler_options,
            inputs: legacy,
            pass: CompilePass::LegacyConversion,
        };
        for asset in self.run_compile(&job)? {
            let name = self.assets.asset_name(&asset.path)?;
            let text = String::from_utf8_lossy(&asset.contents).into_owned();
            let stripped = strip_strict_prologue(&text);
            state.insert_output(name.clone(), stripped.into_bytes());
            state.set_origin(name, asset.origin);
        }
        Ok(())
    }

    /// Build the emission snapshot: the persistent state keeps raw bytes so
    /// watch rebuilds never double-apply a rewrite.
    fn postprocess(&self, state: &BundlerState) -> BindleResult<BTreeMap<String, Vec<u8>>> {
        let mut snapshot = state.output.clone();
        let names: Vec<String> = snapshot.keys().cloned().collect();
        for name in names {
            if name.ends_with(".js") {
                let text = String::from_utf8_lossy(&snapshot[&name]).into_owned();
                let text = strip_source_mapping_url(&text);
                let text = strip_strict_prologue(&text);
                let text = match self.options.compression {
                    Compression::None => text,
                    Compression::TerserLike => self.minify_asset(state, &mut snapshot, &name, &text)?,
                };
                snapshot.insert(name, text.into_bytes());
            } else if name.ends_with(".json") {
                let text = String::from_utf8_lossy(&snapshot[&name]).into_owned();
                let encoded = encode_json_module(&text)?;
                snapshot.insert(name, encoded.into_bytes());
            }
        }
        Ok(snapshot)
    }

    fn minify_asset(
        &self,
        state: &BundlerState,
        snapshot: &mut BTreeMap<String, Vec<u8>>,
        name: &str,
        text: &str,
    ) -> BindleResult<String> {
        let mut settings = MinifySettings::bundler_defaults();
        let map_name = format!("{name}.map");
        let root = state
            .origins
            .get(name)
            .map(|origin| format!("{}/", paths::portable_dirname(origin)))
            .unwrap_or_default();
        if self.options.source_maps == SourceMaps::Included {
            let content = snapshot
                .get(&map_name)
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned());
            let filename = name.rsplit('/').next().unwrap_or(name).to_string();
            settings.source_map = Some(MapSettings {
                content,
                root: root.clone(),
                filename,
            });
        }
        let output = self.minifier.minify(name, text, &settings)?;
        if self.options.source_maps == SourceMaps::Included {
            if let Some(map) = output.map {
                let fused = fuse_source_map(&map, &root)?;
                snapshot.insert(map_name, fused.into_bytes());
            }
        }
        Ok(output.code)
    }
}
