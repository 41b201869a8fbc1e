// src/recipe/kitchen/cook.rs

//! Cook: the actual build execution for a single recipe

use crate::error::{Error, Result};
use crate::recipe::format::CookPlan;
use crate::recipe::stage::Stage;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::Kitchen;
use super::archive::{ArchiveFormat, extract_archive, find_source_root};
use super::config::{CookResult, StageReport};
use super::patch::apply_patches;
use super::runner::{CommandOutput, Invocation};
use super::staging::{StagedTree, discard_staging};
use super::workdir::WorkDir;

/// Lines of stderr carried in a stage failure
const FAILURE_TAIL_LINES: usize = 20;

/// A single cook operation
pub struct Cook<'a> {
    pub(super) kitchen: &'a Kitchen,
    pub(super) plan: CookPlan,
    /// Per-recipe work directory
    pub(super) build_dir: WorkDir,
    /// Whether the staging directory existed (empty) before the cook
    pub(super) staging_existed: bool,
    /// Set once the `stage` commands have started writing
    pub(super) staging_touched: bool,
    /// Build log accumulator
    pub(super) log: String,
    /// Warnings
    pub(super) warnings: Vec<String>,
    pub(super) reports: Vec<StageReport>,
}

impl<'a> Cook<'a> {
    pub(super) fn new(
        kitchen: &'a Kitchen,
        plan: CookPlan,
        build_dir: WorkDir,
        staging_existed: bool,
    ) -> Self {
        Self {
            kitchen,
            plan,
            build_dir,
            staging_existed,
            staging_touched: false,
            log: String::new(),
            warnings: Vec::new(),
            reports: Vec::new(),
        }
    }

    /// Prep: fetch the archive into the source cache and verify it
    pub(super) fn prep(&mut self) -> Result<PathBuf> {
        let archive = self.kitchen.fetch_source(
            &self.plan.url,
            &self.plan.archive_name,
            &self.plan.digest,
        )?;
        self.log_line(&format!(
            "Fetched {} (sha256:{})",
            self.plan.url, self.plan.digest
        ));
        Ok(archive)
    }

    /// Unpack the archive and move the source root into place
    pub(super) fn unpack(&mut self, archive: &Path) -> Result<()> {
        let format = ArchiveFormat::from_filename(&self.plan.archive_name).ok_or_else(|| {
            Error::invalid(
                "source.file_name",
                format!("unsupported archive format: {}", self.plan.archive_name),
            )
        })?;

        let extracted = self.build_dir.path().join("unpack");
        let count = extract_archive(archive, format, &extracted)?;
        let root = find_source_root(&extracted, self.plan.extract_dir.as_deref())?;
        fs::rename(&root, &self.plan.source_dir)?;
        debug!(
            "Source root {} moved to {}",
            root.display(),
            self.plan.source_dir.display()
        );

        fs::create_dir_all(&self.plan.workdir)?;
        self.log_line(&format!(
            "Extracted {} entries ({}) to {}",
            count,
            format.name(),
            self.plan.source_dir.display()
        ));
        Ok(())
    }

    /// Apply the recipe's patches
    pub(super) fn patch(&mut self) -> Result<()> {
        if self.plan.patches.is_empty() {
            return Ok(());
        }

        info!("Applying {} patch(es)", self.plan.patches.len());
        let summary = apply_patches(&self.plan.source_dir, &self.plan.patches, self.plan.patch_strip)?;
        for patch in &self.plan.patches {
            self.log.push_str(&format!("Applied patch: {}\n", patch.name));
        }
        self.log_line(&format!(
            "Patched {} file(s), removed {}",
            summary.modified.len(),
            summary.deleted.len()
        ));
        Ok(())
    }

    /// Run one stage's commands in order, stopping at the first failure
    pub(super) fn run_stage(&mut self, stage: Stage) -> Result<()> {
        if stage == Stage::Stage {
            self.staging_touched = true;
            fs::create_dir_all(&self.plan.staging_dir)?;
        }

        let commands = self.plan.commands(stage).to_vec();
        let started = Instant::now();

        if commands.is_empty() {
            debug!("No {} commands", stage);
        } else {
            info!("Running {} stage ({} command(s))", stage, commands.len());
        }

        let timeout = self.kitchen.config.command_timeout;
        for command in &commands {
            let invocation = Invocation {
                stage,
                command,
                workdir: &self.plan.workdir,
                env: &self.plan.env,
                timeout,
            };

            let output = self
                .kitchen
                .runner
                .run(&invocation)
                .map_err(|e| Error::StageFailed {
                    stage,
                    command: command.clone(),
                    status: None,
                    reason: e.to_string(),
                })?;

            self.log_build_output(stage, command, &output);

            if !output.success() {
                let mut reason = output.describe_failure(timeout);
                let tail = tail_lines(&output.stderr, FAILURE_TAIL_LINES);
                if !tail.is_empty() {
                    reason.push('\n');
                    reason.push_str(&tail);
                }
                return Err(Error::StageFailed {
                    stage,
                    command: command.clone(),
                    status: output.status,
                    reason,
                });
            }
        }

        self.reports.push(StageReport {
            stage,
            commands,
            duration: started.elapsed(),
        });
        Ok(())
    }

    /// Record the staged tree and hand back the result
    pub(super) fn finish(mut self) -> Result<CookResult> {
        let staged = StagedTree::scan(&self.plan.staging_dir)?;
        if staged.file_count() == 0 {
            self.warnings
                .push("stage commands installed no files into the staging directory".to_string());
        }
        self.log_line(&format!(
            "Staged {} file(s), {} bytes, tree sha256:{}",
            staged.file_count(),
            staged.total_size(),
            staged.digest
        ));
        info!(
            "Cooked {} {} ({} files staged)",
            self.plan.name,
            self.plan.version,
            staged.file_count()
        );

        let Cook {
            kitchen,
            plan,
            build_dir,
            log,
            warnings,
            reports,
            ..
        } = self;

        Ok(CookResult {
            plan,
            stages: reports,
            log,
            warnings,
            staged,
            build_dir: keep_dir(kitchen, build_dir),
        })
    }

    /// Give up on a failed cook
    ///
    /// Anything the `stage` commands installed is removed; the work
    /// directory is kept if configured.
    pub(super) fn abandon(self) -> Option<PathBuf> {
        if self.staging_touched {
            match discard_staging(&self.plan.staging_dir, self.staging_existed) {
                Ok(()) => info!(
                    "Removed partial install from {}",
                    self.plan.staging_dir.display()
                ),
                Err(e) => warn!(
                    "Failed to clean staging directory {}: {}",
                    self.plan.staging_dir.display(),
                    e
                ),
            }
        }
        keep_dir(self.kitchen, self.build_dir)
    }

    fn log_line(&mut self, line: &str) {
        self.log.push_str(line);
        self.log.push('\n');
    }

    /// Log a command's output with a stage header
    fn log_build_output(&mut self, stage: Stage, command: &str, output: &CommandOutput) {
        self.log_line(&format!("=== {} === $ {}", stage, command));
        if !output.stdout.is_empty() {
            self.log.push_str(&output.stdout);
            if !output.stdout.ends_with('\n') {
                self.log.push('\n');
            }
        }
        if !output.stderr.is_empty() {
            self.log.push_str(&output.stderr);
            if !output.stderr.ends_with('\n') {
                self.log.push('\n');
            }
        }
    }
}

fn keep_dir(kitchen: &Kitchen, dir: WorkDir) -> Option<PathBuf> {
    if !kitchen.config.keep_builddir {
        return None;
    }
    let path = dir.keep();
    info!("Keeping build directory {}", path.display());
    Some(path)
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
