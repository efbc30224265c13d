//! bindle CLI - single-artifact script bundler
//!
//! Usage: bindle <COMMAND>

use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    let verbose = cli.verbose;

    let result = match cli.command {
        Commands::Build {
            entrypoint,
            output,
            project_root,
            no_source_maps,
            compress,
        } => commands::cmd_build(
            &entrypoint,
            output.as_deref(),
            &project_root,
            no_source_maps,
            compress,
            json,
            verbose,
        ),
        Commands::Watch {
            entrypoint,
            output,
            project_root,
            no_source_maps,
            compress,
        } => commands::cmd_watch(
            &entrypoint,
            &output,
            &project_root,
            no_source_maps,
            compress,
            json,
            verbose,
        ),
    };

    if let Err(err) = result {
        if json {
            let message = serde_json::to_string(&err.to_string())
                .unwrap_or_else(|_| "\"error\"".to_string());
            eprintln!("{{\"event\":\"error\",\"message\":{message}}}");
        } else {
            eprintln!("error: {err:#}");
        }
        std::process::exit(1);
    }
}
