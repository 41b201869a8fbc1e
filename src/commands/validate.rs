// src/commands/validate.rs

//! Validate command - check recipes without building

use anyhow::{Context, Result};
use pantry::recipe::RecipeSet;
use std::path::Path;

use super::{load, patch_dir_for};

/// Validate a recipe file, or every recipe in a directory
pub fn cmd_validate(path: &str, patch_dir: Option<&str>) -> Result<()> {
    let path = Path::new(path);

    if path.is_dir() {
        let patch_dir = patch_dir
            .map(Into::into)
            .or_else(|| Some(path.join("patches")).filter(|d| d.is_dir()));
        let set = RecipeSet::load_dir(path, patch_dir.as_deref())
            .with_context(|| format!("Failed to load recipes from {}", path.display()))?;

        for (name, entry) in set.iter() {
            let recipe = &entry.loaded.recipe;
            println!("{} {} ({})", name, recipe.package.version, entry.path.display());
            for warning in &entry.loaded.warnings {
                println!("  Warning: {}", warning);
            }
        }
        println!("[OK] {} recipe(s) valid", set.len());
        return Ok(());
    }

    let patch_dir = patch_dir_for(path, patch_dir);
    let loaded = load(path, patch_dir.as_deref())?;
    let recipe = &loaded.recipe;

    println!("Recipe: {} version {}", recipe.package.name, recipe.package.version);
    println!("Recipe validation passed");
    if loaded.warnings.is_empty() {
        println!("[OK] No issues found");
    } else {
        println!("[OK] {} warning(s)", loaded.warnings.len());
    }
    Ok(())
}
