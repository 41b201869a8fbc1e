// src/commands/show.rs

//! Show command - print a recipe's resolved plan

use anyhow::{Context, Result};
use pantry::recipe::Stage;
use pantry::recipe::kitchen::WorkDir;
use std::path::Path;

use super::{build_context, load, patch_dir_for};
use crate::cli::ContextArgs;

/// Resolve a recipe against the given context and print what a cook would do
pub fn cmd_show(recipe_path: &str, args: &ContextArgs) -> Result<()> {
    let recipe_path = Path::new(recipe_path);
    let patch_dir = patch_dir_for(recipe_path, args.patch_dir.as_deref());
    let recipe = load(recipe_path, patch_dir.as_deref())?.recipe;
    let ctx = build_context(args, patch_dir.as_deref())?;

    let work_dir =
        WorkDir::path_for(&ctx.work_root, &recipe.package.name, &recipe.package.version);
    let source_dir = work_dir.join("src");
    let plan = recipe
        .resolve(&ctx, &source_dir)
        .with_context(|| format!("Failed to resolve {}", recipe.package.name))?;

    println!("{} {}", plan.name, plan.version);
    if let Some(summary) = &recipe.package.summary {
        println!("  {}", summary);
    }
    println!();
    println!("Source:  {}", plan.url);
    println!("Archive: {}", plan.archive_name);
    println!("SHA-256: {}", plan.digest);
    if !plan.patches.is_empty() {
        println!("Patches (-p{}):", plan.patch_strip);
        for patch in &plan.patches {
            println!("  {}", patch.path.display());
        }
    }
    println!("Workdir: {}", plan.workdir.display());
    println!("Staging: {}", plan.staging_dir.display());

    println!("\nEnvironment:");
    for (key, value) in &plan.env {
        println!("  {}={}", key, value);
    }

    for stage in Stage::ALL {
        let commands = plan.commands(stage);
        println!("\n[{}]", stage);
        if commands.is_empty() {
            println!("  (none)");
        }
        for command in commands {
            println!("  $ {}", command);
        }
    }

    Ok(())
}
