use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// bindle - single-artifact script bundler
#[derive(Parser, Debug)]
#[command(name = "bindle")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output events as NDJSON (for CI)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bundle the project once
    Build {
        /// Entrypoint source file (absolute or relative to the project root)
        entrypoint: PathBuf,

        /// Write the artifact here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Project root directory
        #[arg(long, default_value = ".")]
        project_root: PathBuf,

        /// Leave source maps out of the artifact
        #[arg(long)]
        no_source_maps: bool,

        /// Minify embedded scripts
        #[arg(long)]
        compress: bool,
    },

    /// Rebundle on source change
    Watch {
        /// Entrypoint source file (absolute or relative to the project root)
        entrypoint: PathBuf,

        /// Artifact file rewritten on every change
        #[arg(short, long)]
        output: PathBuf,

        /// Project root directory
        #[arg(long, default_value = ".")]
        project_root: PathBuf,

        /// Leave source maps out of the artifact
        #[arg(long)]
        no_source_maps: bool,

        /// Minify embedded scripts
        #[arg(long)]
        compress: bool,
    },
}
