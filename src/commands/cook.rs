// src/commands/cook.rs

//! Cook command - build dependencies from recipes

use anyhow::{Context, Result};
use pantry::recipe::{Kitchen, KitchenConfig};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::{build_context, load, patch_dir_for};
use crate::cli::ContextArgs;

/// Kitchen options for a cook
#[derive(Debug, Clone)]
pub struct CookOptions {
    pub source_cache: String,
    pub keep_builddir: bool,
    /// Per-command timeout in seconds (0 = no limit)
    pub timeout: u64,
    pub offline: bool,
}

/// Cook a recipe into the staging directory
pub fn cmd_cook(recipe_path: &str, args: &ContextArgs, options: &CookOptions) -> Result<()> {
    let recipe_path = Path::new(recipe_path);

    println!("Reading recipe: {}", recipe_path.display());
    let patch_dir = patch_dir_for(recipe_path, args.patch_dir.as_deref());
    let loaded = load(recipe_path, patch_dir.as_deref())?;
    let recipe = &loaded.recipe;
    println!("Recipe: {} version {}", recipe.package.name, recipe.package.version);

    let ctx = build_context(args, patch_dir.as_deref())?;

    let config = KitchenConfig {
        keep_builddir: options.keep_builddir,
        offline: options.offline,
        command_timeout: (options.timeout > 0).then(|| Duration::from_secs(options.timeout)),
        progress: true,
        ..KitchenConfig::with_source_cache(&options.source_cache)
    };
    let kitchen = Kitchen::new(config);

    if kitchen.source_cached(recipe) {
        println!("  - Sources already cached (offline build possible)");
    } else if options.offline {
        println!("[WARNING] Offline mode and sources are not cached");
    }
    println!("Cooking with {} parallel jobs...", ctx.jobs);

    let result = kitchen
        .cook(recipe, &ctx)
        .with_context(|| format!("Failed to cook {}", recipe.package.name))?;

    for report in &result.stages {
        println!(
            "  {:<10} {} command(s) in {:.1}s",
            report.stage.as_str(),
            report.commands.len(),
            report.duration.as_secs_f64()
        );
    }

    println!(
        "\n[COMPLETE] Staged {} file(s) ({} bytes) in {}",
        result.staged.file_count(),
        result.staged.total_size(),
        result.plan.staging_dir.display()
    );
    println!("Tree digest: sha256:{}", result.staged.digest);

    if let Some(dir) = &result.build_dir {
        println!("Build directory kept at {}", dir.display());
    }

    // Recipe warnings were already printed when it was loaded
    let build_warnings: Vec<&String> = result
        .warnings
        .iter()
        .filter(|w| !loaded.warnings.contains(*w))
        .collect();
    if !build_warnings.is_empty() {
        println!("\nBuild warnings:");
        for warning in build_warnings {
            println!("  - {}", warning);
        }
    }

    info!(
        "Successfully cooked {} into {}",
        recipe.package.name,
        result.plan.staging_dir.display()
    );

    Ok(())
}
