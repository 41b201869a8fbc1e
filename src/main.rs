// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, LogFormat};
use commands::CookOptions;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Validate { path, patch_dir } => {
            commands::cmd_validate(&path, patch_dir.as_deref())
        }
        Commands::Show { recipe, context } => commands::cmd_show(&recipe, &context),
        Commands::Fetch {
            recipe,
            source_cache,
        } => commands::cmd_fetch(&recipe, &source_cache),
        Commands::Cook {
            recipe,
            context,
            source_cache,
            keep_builddir,
            timeout,
            offline,
        } => {
            let options = CookOptions {
                source_cache,
                keep_builddir,
                timeout,
                offline,
            };
            commands::cmd_cook(&recipe, &context, &options)
        }
    }
}
