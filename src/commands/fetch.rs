// src/commands/fetch.rs

//! Fetch command - download and verify sources without building

use anyhow::{Context, Result};
use pantry::recipe::{Kitchen, KitchenConfig};
use std::path::Path;

use super::load;

/// Download a recipe's source archive into the cache and verify it
pub fn cmd_fetch(recipe_path: &str, source_cache: &str) -> Result<()> {
    let recipe_path = Path::new(recipe_path);
    let recipe = load(recipe_path, None)?.recipe;

    let config = KitchenConfig {
        progress: true,
        ..KitchenConfig::with_source_cache(source_cache)
    };
    let kitchen = Kitchen::new(config);

    if kitchen.source_cached(&recipe) {
        println!("Sources for {} already cached", recipe.package.name);
    }

    let archive = kitchen
        .fetch(&recipe)
        .with_context(|| format!("Failed to fetch sources for {}", recipe.package.name))?;

    println!("[COMPLETE] Fetched and verified {}", archive.display());
    Ok(())
}
