// src/recipe/kitchen/mod.rs

//! Kitchen: where recipes are cooked
//!
//! Cooking a recipe runs these steps strictly in order, stopping at the first
//! failure:
//! 1. **Prep**: fetch the source archive into the source cache and verify
//!    its SHA-256
//! 2. **Unpack**: extract the archive into the recipe's work directory,
//!    `<work_root>/<name>-<version>`, recreated for every cook
//! 3. **Patch**: apply the recipe's patches, all or nothing
//! 4. **Stages**: run the `preprocess`, `configure`, `build` and `stage`
//!    commands through a [`CommandRunner`]
//!
//! The staging directory must be absent or empty. Nothing is written under
//! it before the `stage` commands start, and if any of them fails everything
//! they installed is removed again.

mod archive;
mod config;
mod cook;
mod patch;
mod runner;
mod staging;
mod workdir;

pub use archive::{ArchiveFormat, Downloader};
pub use config::{BuildContext, CookResult, KitchenConfig, StageReport, Toolchain};
pub use cook::Cook;
pub use patch::{PatchSummary, apply_patches};
pub use runner::{CommandOutput, CommandRunner, Invocation, ShellRunner};
pub use staging::{EntryKind, StagedEntry, StagedTree};
pub use workdir::WorkDir;

use crate::error::{Error, Result};
use crate::hash::Sha256Digest;
use crate::recipe::format::Recipe;
use crate::recipe::parser::validate_recipe;
use crate::recipe::stage::Stage;
use archive::verify_file;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The Kitchen: where recipes are cooked
pub struct Kitchen {
    pub(crate) config: KitchenConfig,
    runner: Arc<dyn CommandRunner>,
}

impl Kitchen {
    /// Create a new Kitchen running commands through `/bin/sh`
    pub fn new(config: KitchenConfig) -> Self {
        Self::with_runner(config, Arc::new(ShellRunner::new()))
    }

    /// Create a new Kitchen with a custom command runner
    pub fn with_runner(config: KitchenConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Create a Kitchen with default configuration
    pub fn with_defaults() -> Self {
        Self::new(KitchenConfig::default())
    }

    pub fn config(&self) -> &KitchenConfig {
        &self.config
    }

    /// Cook a recipe into the context's staging directory
    ///
    /// The recipe is validated against the context's patch directory first;
    /// its warnings are carried in the result.
    pub fn cook(&self, recipe: &Recipe, ctx: &BuildContext) -> Result<CookResult> {
        info!(
            "Cooking {} version {}",
            recipe.package.name, recipe.package.version
        );

        let warnings = validate_recipe(recipe, ctx.patch_dir.as_deref())?;
        for warning in &warnings {
            warn!("{}: {}", recipe.package.name, warning);
        }
        let staging_existed = staging::check_staging_dir(&ctx.staging_dir)?;

        let build_dir =
            WorkDir::acquire(&ctx.work_root, &recipe.package.name, &recipe.package.version)?;
        let source_dir = build_dir.path().join("src");

        let plan = recipe.resolve(ctx, &source_dir)?;
        debug!(
            "Resolved plan for {}: {} command(s), workdir {}",
            plan.name,
            plan.command_count(),
            plan.workdir.display()
        );

        let mut cook = Cook::new(self, plan, build_dir, staging_existed);
        cook.warnings = warnings;
        let outcome: Result<()> = (|| {
            info!("Prep: fetching {}", cook.plan.archive_name);
            let archive = cook.prep()?;

            info!("Unpacking and patching sources...");
            cook.unpack(&archive)?;
            cook.patch()?;

            for stage in Stage::ALL {
                cook.run_stage(stage)?;
            }
            Ok(())
        })();

        match outcome {
            Ok(()) => cook.finish(),
            Err(e) => {
                warn!("Cooking {} failed: {}", recipe.package.name, e);
                if let Some(dir) = cook.abandon() {
                    warn!("Build directory kept at {}", dir.display());
                }
                Err(e)
            }
        }
    }

    /// Fetch and verify a recipe's source archive without building
    ///
    /// Returns the path of the verified archive in the source cache.
    pub fn fetch(&self, recipe: &Recipe) -> Result<PathBuf> {
        let url = recipe.archive_url()?;
        let name = recipe.archive_filename()?;
        let digest = recipe.digest()?;

        info!("Fetching sources for {} version {}", recipe.package.name, recipe.package.version);
        self.fetch_source(&url, &name, &digest)
    }

    /// Check whether a verified copy of a recipe's archive is cached
    pub fn source_cached(&self, recipe: &Recipe) -> bool {
        let (Ok(name), Ok(digest)) = (recipe.archive_filename(), recipe.digest()) else {
            return false;
        };
        let path = self.cache_path(&name, &digest);
        path.is_file() && verify_file(&path, &digest, &name).is_ok()
    }

    fn cache_path(&self, archive_name: &str, digest: &Sha256Digest) -> PathBuf {
        self.config.source_cache.join(digest.as_str()).join(archive_name)
    }

    /// Fetch a source archive (with caching)
    ///
    /// A cached copy is re-verified before use. A fresh download is written
    /// to a uniquely named temporary file and only moved into the cache once
    /// its digest matches; on mismatch it is deleted. Concurrent fetches of
    /// the same archive each download separately and the last rename wins.
    pub(crate) fn fetch_source(
        &self,
        url: &str,
        archive_name: &str,
        digest: &Sha256Digest,
    ) -> Result<PathBuf> {
        let cached_path = self.cache_path(archive_name, digest);

        if cached_path.exists() {
            debug!("Using cached source: {}", cached_path.display());
            match verify_file(&cached_path, digest, archive_name) {
                Ok(()) => return Ok(cached_path),
                Err(e) => {
                    warn!("Cached source is corrupt, re-fetching: {}", e);
                    fs::remove_file(&cached_path)?;
                }
            }
        }

        if self.config.offline {
            return Err(Error::DownloadError(format!(
                "{} is not in the source cache and the kitchen is offline",
                archive_name
            )));
        }

        let cache_dir = cached_path
            .parent()
            .unwrap_or(self.config.source_cache.as_path());
        fs::create_dir_all(cache_dir)?;
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", archive_name))
            .suffix(".part")
            .tempfile_in(cache_dir)?;

        // Dropping `temp` removes the partial file on every error path
        let downloader = Downloader::new(&self.config)?;
        downloader.download(url, temp.path())?;
        verify_file(temp.path(), digest, archive_name)?;

        temp.persist(&cached_path).map_err(|e| {
            Error::IoError(format!(
                "Failed to move download into {}: {}",
                cached_path.display(),
                e.error
            ))
        })?;
        info!("Cached {} (sha256:{})", archive_name, digest.short());
        Ok(cached_path)
    }
}
