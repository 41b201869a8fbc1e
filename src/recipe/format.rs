// src/recipe/format.rs

//! Recipe file format definitions
//!
//! Recipes are TOML files that describe how to fetch, verify, patch,
//! configure, build and stage one third-party dependency. Every string that
//! ends up in a command may use `%(name)s` placeholders; see
//! [`template`](super::template) for the variables that are available.

use crate::error::{Error, Result};
use crate::hash::Sha256Digest;
use crate::recipe::kitchen::BuildContext;
use crate::recipe::stage::Stage;
use crate::recipe::template::{self, Variables};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// A complete recipe for one dependency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    /// Package metadata
    pub package: PackageSection,

    /// Where the source archive lives and what it hashes to
    pub source: SourceSection,

    /// Patches to apply after unpacking (optional)
    #[serde(default)]
    pub patches: PatchSection,

    /// Configure options, working directory and environment (optional)
    #[serde(default)]
    pub build: BuildSection,

    /// Shell command templates for each stage
    #[serde(default)]
    pub stages: StageSection,

    /// Custom variables for substitution (optional)
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Package metadata section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
    /// Package name, unique within a recipe set
    pub name: String,

    /// Upstream version, used verbatim in substitution
    pub version: String,

    /// Short description
    #[serde(default)]
    pub summary: Option<String>,

    /// License identifier (SPDX)
    #[serde(default)]
    pub license: Option<String>,

    /// Homepage URL
    #[serde(default)]
    pub homepage: Option<String>,
}

/// Source archive section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSection {
    /// Directory URL the archive is downloaded from
    ///
    /// Example: `https://gmplib.org/download/gmp/`
    pub download_path: String,

    /// Archive file name, appended to `download_path`
    ///
    /// Example: `gmp-%(version)s.tar.xz`
    pub file_name: String,

    /// SHA-256 of the archive (64 hex characters, `sha256:` prefix optional)
    pub sha256: String,

    /// Directory name after extraction (if it can't be inferred)
    #[serde(default)]
    pub extract_dir: Option<String>,
}

/// Patch configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchSection {
    /// Patch file names in the patch directory, applied in order
    #[serde(default)]
    pub files: Vec<String>,

    /// Leading path components to strip (default: 1)
    #[serde(default = "default_strip")]
    pub strip: u32,
}

impl Default for PatchSection {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            strip: default_strip(),
        }
    }
}

fn default_strip() -> u32 {
    1
}

/// Build configuration section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Options handed to configure through `%(configopts)s`, in order
    #[serde(default)]
    pub config_options: Vec<String>,

    /// Directory the stage commands run in, relative to the source root
    #[serde(default)]
    pub workdir: Option<String>,

    /// Extra environment variables for every stage command
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Stage command templates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSection {
    #[serde(default)]
    pub preprocess: Vec<String>,
    #[serde(default)]
    pub configure: Vec<String>,
    #[serde(default)]
    pub build: Vec<String>,
    #[serde(default)]
    pub stage: Vec<String>,
}

impl StageSection {
    /// Command templates for a stage
    pub fn commands(&self, stage: Stage) -> &[String] {
        match stage {
            Stage::Preprocess => &self.preprocess,
            Stage::Configure => &self.configure,
            Stage::Build => &self.build,
            Stage::Stage => &self.stage,
        }
    }
}

/// A patch the plan will apply, with its location on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPatch {
    /// Name as listed in the recipe
    pub name: String,
    /// Resolved path inside the patch directory
    pub path: PathBuf,
}

/// Resolved commands for one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub stage: Stage,
    pub commands: Vec<String>,
}

/// A recipe with every template resolved against a build context
///
/// Nothing in a plan contains an unresolved placeholder; the kitchen runs
/// exactly what is recorded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookPlan {
    pub name: String,
    pub version: String,
    /// Full download URL
    pub url: String,
    /// Archive file name
    pub archive_name: String,
    /// Expected archive digest
    pub digest: Sha256Digest,
    /// Explicit source root inside the archive, if the recipe names one
    pub extract_dir: Option<String>,
    pub patches: Vec<PlannedPatch>,
    pub patch_strip: u32,
    /// Where the unpacked source tree lives
    pub source_dir: PathBuf,
    /// Where stage commands run
    pub workdir: PathBuf,
    /// Install tree the `stage` commands populate
    pub staging_dir: PathBuf,
    /// Complete environment for stage commands
    pub env: BTreeMap<String, String>,
    /// Commands for every stage, in execution order
    pub stages: Vec<StagePlan>,
    /// Every variable value used during resolution
    pub variables: BTreeMap<String, String>,
}

impl CookPlan {
    /// Resolved commands for a stage
    pub fn commands(&self, stage: Stage) -> &[String] {
        self.stages
            .iter()
            .find(|plan| plan.stage == stage)
            .map(|plan| plan.commands.as_slice())
            .unwrap_or(&[])
    }

    /// Total number of commands across all stages
    pub fn command_count(&self) -> usize {
        self.stages.iter().map(|plan| plan.commands.len()).sum()
    }
}

impl Recipe {
    /// Variables available to the source location templates
    pub fn source_variables(&self) -> Variables {
        let mut vars = Variables::new();
        vars.insert("name", self.package.name.as_str());
        vars.insert("version", self.package.version.as_str());
        vars
    }

    /// Get the archive filename with variables substituted
    pub fn archive_filename(&self) -> Result<String> {
        self.source_variables().render(&self.source.file_name)
    }

    /// Get the full archive URL with variables substituted
    pub fn archive_url(&self) -> Result<String> {
        let vars = self.source_variables();
        let base = vars.render(&self.source.download_path)?;
        let file = vars.render(&self.source.file_name)?;

        if base.ends_with('/') {
            Ok(format!("{}{}", base, file))
        } else {
            Ok(format!("{}/{}", base, file))
        }
    }

    /// The recorded archive digest
    pub fn digest(&self) -> Result<Sha256Digest> {
        Sha256Digest::parse(&self.source.sha256)
            .map_err(|e| Error::invalid("source.sha256", e.to_string()))
    }

    /// The resolved `extract_dir`, if any
    pub fn extract_dir(&self) -> Result<Option<String>> {
        self.source
            .extract_dir
            .as_deref()
            .map(|dir| self.source_variables().render(dir))
            .transpose()
    }

    /// Every template string in the recipe, labelled with its field path
    pub fn templates(&self) -> Vec<(String, &str)> {
        let mut out: Vec<(String, &str)> = vec![
            ("source.download_path".to_string(), self.source.download_path.as_str()),
            ("source.file_name".to_string(), self.source.file_name.as_str()),
        ];

        if let Some(dir) = &self.source.extract_dir {
            out.push(("source.extract_dir".to_string(), dir.as_str()));
        }
        for (i, opt) in self.build.config_options.iter().enumerate() {
            out.push((format!("build.config_options[{}]", i), opt.as_str()));
        }
        if let Some(dir) = &self.build.workdir {
            out.push(("build.workdir".to_string(), dir.as_str()));
        }
        for (key, value) in &self.build.environment {
            out.push((format!("build.environment.{}", key), value.as_str()));
        }
        for (key, value) in &self.variables {
            out.push((format!("variables.{}", key), value.as_str()));
        }
        for stage in Stage::ALL {
            for (i, cmd) in self.stages.commands(stage).iter().enumerate() {
                out.push((format!("stages.{}[{}]", stage, i), cmd.as_str()));
            }
        }

        out
    }

    /// Resolve every template against a build context
    ///
    /// `source_dir` is where the unpacked source tree will live. Resolution
    /// happens once per cook, before anything is downloaded.
    pub fn resolve(&self, ctx: &BuildContext, source_dir: &Path) -> Result<CookPlan> {
        let url = self.archive_url()?;
        let archive_name = self.archive_filename()?;
        let digest = self.digest()?;
        let extract_dir = self.extract_dir()?;

        let staging = ctx.staging_dir.to_string_lossy().into_owned();
        let mut vars = self.source_variables();
        vars.insert("filename", archive_name.as_str());
        vars.insert("url", url.as_str());
        vars.insert("stagingdir", staging.as_str());
        vars.insert("destdir", staging.as_str());
        vars.insert("jobs", ctx.jobs.to_string());
        vars.insert("srcdir", source_dir.to_string_lossy());
        if let Some(patch_dir) = &ctx.patch_dir {
            vars.insert("patchdir", patch_dir.to_string_lossy());
        }
        for (name, value) in ctx.toolchain.variables() {
            vars.insert(name, value);
        }

        // Options are rendered before configopts and workdir exist
        let options = self
            .build
            .config_options
            .iter()
            .map(|opt| vars.render(opt))
            .collect::<Result<Vec<_>>>()?;
        vars.insert("configopts", template::join_options(&options));

        // workdir may reference everything above but not itself
        let workdir = match &self.build.workdir {
            Some(dir) => {
                let rel = vars.render(dir)?;
                check_relative("build.workdir", &rel)?;
                source_dir.join(rel)
            }
            None => source_dir.to_path_buf(),
        };
        vars.insert("workdir", workdir.to_string_lossy());

        // Custom variables see only built-ins
        let builtins = vars.clone();
        for (name, value) in &self.variables {
            if template::is_builtin(name) {
                return Err(Error::invalid(
                    format!("variables.{}", name),
                    "shadows a built-in variable",
                ));
            }
            vars.insert(name.as_str(), builtins.render(value)?);
        }

        let mut stages = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            let commands = self
                .stages
                .commands(stage)
                .iter()
                .map(|cmd| vars.render(cmd))
                .collect::<Result<Vec<_>>>()?;
            stages.push(StagePlan { stage, commands });
        }

        let home = source_dir.parent().unwrap_or(source_dir);
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), ctx.search_path());
        env.insert("HOME".to_string(), home.to_string_lossy().into_owned());
        for (key, value) in ctx.toolchain.env_vars() {
            env.insert(key, value);
        }
        for (key, value) in &ctx.env {
            env.insert(key.clone(), value.clone());
        }
        for (key, value) in &self.build.environment {
            env.insert(key.clone(), vars.render(value)?);
        }

        let patches = self.planned_patches(ctx.patch_dir.as_deref())?;

        Ok(CookPlan {
            name: self.package.name.clone(),
            version: self.package.version.clone(),
            url,
            archive_name,
            digest,
            extract_dir,
            patches,
            patch_strip: self.patches.strip,
            source_dir: source_dir.to_path_buf(),
            workdir,
            staging_dir: ctx.staging_dir.clone(),
            env,
            stages,
            variables: vars.into_map(),
        })
    }

    fn planned_patches(&self, patch_dir: Option<&Path>) -> Result<Vec<PlannedPatch>> {
        if self.patches.files.is_empty() {
            return Ok(Vec::new());
        }

        let patch_dir = patch_dir.ok_or_else(|| {
            Error::ConfigError(format!(
                "recipe {} lists patches but no patch directory was given",
                self.package.name
            ))
        })?;

        self.patches
            .files
            .iter()
            .map(|name| {
                check_relative("patches.files", name)?;
                Ok(PlannedPatch {
                    name: name.clone(),
                    path: patch_dir.join(name),
                })
            })
            .collect()
    }
}

/// Reject absolute paths and `..` components
pub(crate) fn check_relative(field: &str, path: &str) -> Result<()> {
    let p = Path::new(path);
    if p.is_absolute() {
        return Err(Error::invalid(field, format!("`{}` must be a relative path", path)));
    }
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::invalid(field, format!("`{}` must not contain `..`", path)));
    }
    Ok(())
}
