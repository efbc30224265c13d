//! Command implementations for the bindle CLI

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};

use bindle::bundler::Bundler;
use bindle::compiler::PassthroughCompiler;
use bindle::config::{
    detect_compiler_root, AssetConfig, BundleOptions, Compression, SourceMaps,
};
use bindle::fs::{atomic_write, LocalFileSystem};
use bindle::watcher::{watch, WatchEvent};
use bindle::BundlerState;

fn absolutize(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(bindle::paths::normalize(&absolute))
}

fn make_bundler(
    entrypoint: &Path,
    project_root: &Path,
    no_source_maps: bool,
    compress: bool,
    verbose: u8,
) -> Result<Bundler> {
    let project_root = absolutize(project_root)?;
    let fs: Arc<LocalFileSystem> = Arc::new(LocalFileSystem);
    let compiler_root = detect_compiler_root();
    let assets = AssetConfig::detect(fs.as_ref(), &project_root, &compiler_root);
    let options = BundleOptions::new(project_root, entrypoint)
        .with_source_maps(if no_source_maps {
            SourceMaps::Omitted
        } else {
            SourceMaps::Included
        })
        .with_compression(if compress {
            Compression::TerserLike
        } else {
            Compression::None
        });
    let compiler = Arc::new(PassthroughCompiler::new(fs.clone()));
    let mut bundler = Bundler::new(options, assets, fs, compiler);
    if verbose > 0 {
        bundler.on_diagnostic(|diagnostic| {
            eprintln!("[diagnostic] {}", diagnostic.message);
        });
    }
    Ok(bundler)
}

pub fn cmd_build(
    entrypoint: &Path,
    output: Option<&Path>,
    project_root: &Path,
    no_source_maps: bool,
    compress: bool,
    json: bool,
    verbose: u8,
) -> Result<()> {
    let bundler = make_bundler(entrypoint, project_root, no_source_maps, compress, verbose)?;
    let mut state = BundlerState::new();
    let artifact = bundler.bundle(&mut state)?;

    match output {
        Some(path) => {
            atomic_write(path, artifact.as_bytes())
                .with_context(|| format!("failed to write artifact to {}", path.display()))?;
            if json {
                println!(
                    "{{\"event\":\"bundle_written\",\"output\":{},\"size\":{}}}",
                    serde_json::to_string(&path.display().to_string())?,
                    artifact.len()
                );
            } else {
                eprintln!("wrote {} ({} bytes)", path.display(), artifact.len());
            }
        }
        None => print!("{artifact}"),
    }
    Ok(())
}

pub fn cmd_watch(
    entrypoint: &Path,
    output: &Path,
    project_root: &Path,
    no_source_maps: bool,
    compress: bool,
    json: bool,
    verbose: u8,
) -> Result<()> {
    let bundler = make_bundler(entrypoint, project_root, no_source_maps, compress, verbose)?;
    let output = output.to_path_buf();

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    })
    .context("failed to install Ctrl+C handler")?;

    watch(bundler, running, move |event| {
        if let WatchEvent::BundleUpdated { artifact, .. } = &event {
            if let Err(error) = atomic_write(&output, artifact.as_bytes()) {
                eprintln!("failed to write {}: {error}", output.display());
            }
        }
        if json {
            println!("{}", event.to_json());
        } else {
            match &event {
                WatchEvent::WatchStarted { entrypoint } => {
                    eprintln!("watching {entrypoint}");
                }
                WatchEvent::FileChanged { path } => eprintln!("changed: {path}"),
                WatchEvent::BundleStarted => {}
                WatchEvent::BundleUpdated { size, .. } => {
                    eprintln!("wrote {} ({size} bytes)", output.display());
                }
                WatchEvent::Error { message } => eprintln!("error: {message}"),
                WatchEvent::Shutdown => eprintln!("stopped"),
            }
        }
    })?;
    Ok(())
}
