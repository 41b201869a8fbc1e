// src/recipe/set.rs

//! A directory of recipes keyed by package name
//!
//! Every `*.toml` file in the directory is parsed and validated. Names must
//! be unique across the set so `pantry cook gmp` means exactly one thing.

use crate::error::{Error, Result};
use crate::recipe::format::Recipe;
use crate::recipe::parser::{LoadedRecipe, load_recipe};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One recipe in a set, with where it came from
#[derive(Debug, Clone)]
pub struct SetEntry {
    pub path: PathBuf,
    pub loaded: LoadedRecipe,
}

/// A collection of recipes with unique package names
#[derive(Debug, Default)]
pub struct RecipeSet {
    entries: BTreeMap<String, SetEntry>,
}

impl RecipeSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.toml` recipe in `dir`, in file name order
    pub fn load_dir(dir: &Path, patch_dir: Option<&Path>) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::NotFound(format!(
                "recipe directory {} does not exist",
                dir.display()
            )));
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        let mut set = Self::new();
        for path in paths {
            let loaded = load_recipe(&path, patch_dir)?;
            for warning in &loaded.warnings {
                warn!("{}: {}", path.display(), warning);
            }
            set.insert(path, loaded)?;
        }

        debug!("Loaded {} recipe(s) from {}", set.len(), dir.display());
        Ok(set)
    }

    /// Add a loaded recipe, rejecting a name that is already taken
    pub fn insert(&mut self, path: PathBuf, loaded: LoadedRecipe) -> Result<()> {
        let name = loaded.recipe.package.name.clone();
        if let Some(existing) = self.entries.get(&name) {
            return Err(Error::invalid(
                "package.name",
                format!(
                    "`{}` is defined by both {} and {}",
                    name,
                    existing.path.display(),
                    path.display()
                ),
            ));
        }
        self.entries.insert(name, SetEntry { path, loaded });
        Ok(())
    }

    /// Package names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Recipe> {
        self.entries.get(name).map(|e| &e.loaded.recipe)
    }

    pub fn entry(&self, name: &str) -> Option<&SetEntry> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SetEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
