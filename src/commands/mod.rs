// src/commands/mod.rs

//! Command handlers for the pantry CLI

mod cook;
mod fetch;
mod show;
mod validate;

pub use cook::{CookOptions, cmd_cook};
pub use fetch::cmd_fetch;
pub use show::cmd_show;
pub use validate::cmd_validate;

use crate::cli::ContextArgs;
use anyhow::{Context, Result};
use pantry::recipe::{BuildContext, LoadedRecipe, Toolchain, load_recipe};
use std::path::{Path, PathBuf};

/// The patch directory for a recipe: explicit, or `patches/` next to it
pub(crate) fn patch_dir_for(recipe_path: &Path, explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(dir) = explicit {
        return Some(PathBuf::from(dir));
    }
    let dir = recipe_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("patches");
    dir.is_dir().then_some(dir)
}

/// Parse and validate a recipe file, printing its warnings
pub(crate) fn load(recipe_path: &Path, patch_dir: Option<&Path>) -> Result<LoadedRecipe> {
    let loaded = load_recipe(recipe_path, patch_dir)
        .with_context(|| format!("Failed to load recipe: {}", recipe_path.display()))?;
    for warning in &loaded.warnings {
        println!("Warning: {}", warning);
    }
    Ok(loaded)
}

/// Build the context handed to the kitchen from command-line options
///
/// The host `PATH` is passed through explicitly; nothing else from the
/// calling environment reaches stage commands.
pub(crate) fn build_context(args: &ContextArgs, patch_dir: Option<&Path>) -> Result<BuildContext> {
    let staging_dir = std::path::absolute(&args.staging_dir)
        .with_context(|| format!("Invalid staging directory: {}", args.staging_dir))?;
    let work_dir = std::path::absolute(&args.work_dir)
        .with_context(|| format!("Invalid work directory: {}", args.work_dir))?;

    let mut ctx = BuildContext::new(work_dir, staging_dir);

    if let Some(dir) = patch_dir {
        let dir = std::path::absolute(dir)
            .with_context(|| format!("Invalid patch directory: {}", dir.display()))?;
        ctx = ctx.with_patch_dir(dir);
    }
    if let Some(jobs) = args.jobs {
        ctx = ctx.with_jobs(jobs);
    }
    if let Some(path) = &args.toolchain {
        let toolchain = Toolchain::from_file(Path::new(path))
            .with_context(|| format!("Failed to load toolchain: {}", path))?;
        ctx = ctx.with_toolchain(toolchain);
    }
    if let Ok(path) = std::env::var("PATH") {
        ctx = ctx.with_search_path(path);
    }

    Ok(ctx)
}
