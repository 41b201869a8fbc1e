// src/cli.rs

//! CLI definitions for pantry
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "pantry")]
#[command(author = "Pantry Contributors")]
#[command(version)]
#[command(about = "Fetch, verify, patch, build and stage third-party sources from recipes", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a recipe file or every recipe in a directory
    Validate {
        /// Path to a recipe file or a directory of recipes
        path: String,

        /// Directory holding the recipes' patches (default: <recipe dir>/patches)
        #[arg(long)]
        patch_dir: Option<String>,
    },

    /// Print the resolved plan for a recipe without running anything
    Show {
        /// Path to the recipe file
        recipe: String,

        #[command(flatten)]
        context: ContextArgs,
    },

    /// Download and verify a recipe's source archive
    Fetch {
        /// Path to the recipe file
        recipe: String,

        /// Directory for caching downloaded sources
        #[arg(long, default_value = "/var/cache/pantry/sources")]
        source_cache: String,
    },

    /// Cook a recipe: fetch, verify, patch, configure, build and stage
    Cook {
        /// Path to the recipe file
        recipe: String,

        #[command(flatten)]
        context: ContextArgs,

        /// Directory for caching downloaded sources
        #[arg(long, default_value = "/var/cache/pantry/sources")]
        source_cache: String,

        /// Keep the build directory after the cook (for debugging)
        #[arg(long)]
        keep_builddir: bool,

        /// Per-command timeout in seconds (0 = no limit)
        #[arg(long, default_value = "3600")]
        timeout: u64,

        /// Only use sources already in the cache
        #[arg(long)]
        offline: bool,
    },
}

/// Options that shape the build context
#[derive(Args, Debug, Clone)]
pub struct ContextArgs {
    /// Directory the stage commands install into (must be empty or absent)
    #[arg(long, default_value = "./staging")]
    pub staging_dir: String,

    /// Directory holding each recipe's work directory (<name>-<version>)
    #[arg(long, default_value = "/var/tmp/pantry")]
    pub work_dir: String,

    /// Directory holding the recipe's patches (default: <recipe dir>/patches)
    #[arg(long)]
    pub patch_dir: Option<String>,

    /// Number of parallel build jobs (default: available CPUs)
    #[arg(short, long)]
    pub jobs: Option<u32>,

    /// Toolchain description (TOML)
    #[arg(long)]
    pub toolchain: Option<String>,
}
