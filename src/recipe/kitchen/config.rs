// src/recipe/kitchen/config.rs

//! Configuration types for the Kitchen

use crate::error::{Error, Result};
use crate::recipe::format::CookPlan;
use crate::recipe::stage::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::staging::StagedTree;

/// Search path used when the context doesn't override it
pub const DEFAULT_SEARCH_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Compilers, flags and triples for a cook
///
/// Every field is optional. Fields that are set become template variables
/// (`%(cc)s`, `%(host)s`, ...) and, for the tools and flags, environment
/// variables for stage commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Toolchain {
    /// Host triple (`--host`)
    pub host: Option<String>,
    /// Target triple (`--target`)
    pub target: Option<String>,
    /// Sysroot containing target headers and libraries
    pub sysroot: Option<PathBuf>,
    pub cc: Option<String>,
    pub cxx: Option<String>,
    pub ar: Option<String>,
    pub ranlib: Option<String>,
    pub cflags: Option<String>,
    pub ldflags: Option<String>,
    /// Directories prepended to the search path
    pub path: Vec<PathBuf>,
}

impl Toolchain {
    /// Parse a toolchain description from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Invalid toolchain file: {}", e)))
    }

    /// Load a toolchain description from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read toolchain file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Template variables this toolchain defines
    pub fn variables(&self) -> Vec<(&'static str, String)> {
        let sysroot = self.sysroot.as_ref().map(|p| p.to_string_lossy().into_owned());
        [
            ("host", self.host.clone()),
            ("target", self.target.clone()),
            ("sysroot", sysroot),
            ("cc", self.cc.clone()),
            ("cxx", self.cxx.clone()),
            ("ar", self.ar.clone()),
            ("ranlib", self.ranlib.clone()),
            ("cflags", self.cflags.clone()),
            ("ldflags", self.ldflags.clone()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }

    /// Environment variables for stage commands
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();

        let tools = [
            ("CC", &self.cc),
            ("CXX", &self.cxx),
            ("AR", &self.ar),
            ("RANLIB", &self.ranlib),
            ("CFLAGS", &self.cflags),
            ("CXXFLAGS", &self.cflags),
            ("LDFLAGS", &self.ldflags),
        ];
        for (key, value) in tools {
            if let Some(value) = value {
                env.push((key.to_string(), value.clone()));
            }
        }

        if let Some(sysroot) = &self.sysroot {
            env.push(("SYSROOT".to_string(), sysroot.to_string_lossy().into_owned()));
        }

        env
    }
}

/// Everything a cook needs to know about where and how it runs
///
/// The context is passed explicitly; the library never reads the ambient
/// process environment to fill it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    /// Parent directory for per-cook work directories
    pub work_root: PathBuf,
    /// Install tree the `stage` commands populate
    pub staging_dir: PathBuf,
    /// Directory patch names are resolved against
    pub patch_dir: Option<PathBuf>,
    /// Parallelism for `%(jobs)s`
    pub jobs: u32,
    pub toolchain: Toolchain,
    /// Base search path, before toolchain entries
    pub search_path: String,
    /// Extra environment for stage commands
    pub env: BTreeMap<String, String>,
}

impl BuildContext {
    pub fn new(work_root: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(4);

        let env = [("LC_ALL", "C"), ("TZ", "UTC")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            work_root: work_root.into(),
            staging_dir: staging_dir.into(),
            patch_dir: None,
            jobs,
            toolchain: Toolchain::default(),
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            env,
        }
    }

    pub fn with_patch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.patch_dir = Some(dir.into());
        self
    }

    pub fn with_jobs(mut self, jobs: u32) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn with_search_path(mut self, path: impl Into<String>) -> Self {
        self.search_path = path.into();
        self
    }

    /// Add one environment variable for stage commands
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The `PATH` handed to stage commands
    pub fn search_path(&self) -> String {
        let mut parts: Vec<String> = self
            .toolchain
            .path
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        if !self.search_path.is_empty() {
            parts.push(self.search_path.clone());
        }
        parts.join(":")
    }
}

/// Configuration for the Kitchen
#[derive(Debug, Clone)]
pub struct KitchenConfig {
    /// Directory for downloaded sources
    pub source_cache: PathBuf,
    /// Download attempts before giving up
    pub retries: u32,
    /// Timeout for a single HTTP request
    pub http_timeout: Duration,
    /// Timeout for each stage command (`None` = no limit)
    pub command_timeout: Option<Duration>,
    /// Keep the work directory after the cook (for debugging)
    pub keep_builddir: bool,
    /// Only use sources already in the cache
    pub offline: bool,
    /// Show a progress bar while downloading
    pub progress: bool,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self {
            source_cache: std::env::temp_dir().join("pantry-sources"),
            retries: 3,
            http_timeout: Duration::from_secs(30),
            command_timeout: Some(Duration::from_secs(3600)), // 1 hour
            keep_builddir: false,
            offline: false,
            progress: false,
        }
    }
}

impl KitchenConfig {
    /// Configuration using a specific source cache
    pub fn with_source_cache(dir: impl Into<PathBuf>) -> Self {
        Self {
            source_cache: dir.into(),
            ..Self::default()
        }
    }

    /// Configuration that never touches the network
    ///
    /// Cooks fail with a download error unless the archive is already in the
    /// source cache.
    pub fn offline(dir: impl Into<PathBuf>) -> Self {
        Self {
            offline: true,
            ..Self::with_source_cache(dir)
        }
    }
}

/// What ran during one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    /// Commands executed, in order
    pub commands: Vec<String>,
    pub duration: Duration,
}

/// Result of cooking a recipe
#[derive(Debug)]
pub struct CookResult {
    /// The resolved plan that was executed
    pub plan: CookPlan,
    /// Per-stage reports in execution order
    pub stages: Vec<StageReport>,
    /// Build log
    pub log: String,
    /// Warnings generated during the cook
    pub warnings: Vec<String>,
    /// Manifest of the staging directory after the `stage` commands ran
    pub staged: StagedTree,
    /// Work directory, if it was kept
    pub build_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kitchen_config_default() {
        let config = KitchenConfig::default();
        assert_eq!(config.retries, 3);
        assert!(config.command_timeout.is_some());
        assert!(!config.keep_builddir);
        assert!(!config.offline);
    }

    #[test]
    fn test_kitchen_config_offline() {
        let config = KitchenConfig::offline("/var/cache/pantry");
        assert!(config.offline);
        assert_eq!(config.source_cache, PathBuf::from("/var/cache/pantry"));
    }

    #[test]
    fn test_build_context_defaults() {
        let ctx = BuildContext::new("/work", "/stage");
        assert!(ctx.jobs > 0);
        assert!(ctx.patch_dir.is_none());
        assert_eq!(ctx.env.get("LC_ALL").map(String::as_str), Some("C"));
        assert_eq!(ctx.search_path(), DEFAULT_SEARCH_PATH);
        assert_eq!(ctx.clone().with_jobs(0).jobs, 1);
    }

    #[test]
    fn test_toolchain_from_toml() {
        let toolchain = Toolchain::from_toml_str(
            r#"
host = "aarch64-linux-gnu"
cc = "aarch64-linux-gnu-gcc"
cflags = "-O2 -pipe"
sysroot = "/opt/sysroots/aarch64"
path = ["/opt/cross/bin"]
"#,
        )
        .unwrap();

        assert_eq!(toolchain.host.as_deref(), Some("aarch64-linux-gnu"));
        let vars = toolchain.variables();
        assert!(vars.contains(&("cc", "aarch64-linux-gnu-gcc".to_string())));
        assert!(vars.contains(&("sysroot", "/opt/sysroots/aarch64".to_string())));
        assert!(!vars.iter().any(|(name, _)| *name == "cxx"));

        let env = toolchain.env_vars();
        assert!(env.contains(&("CC".to_string(), "aarch64-linux-gnu-gcc".to_string())));
        assert!(env.contains(&("CXXFLAGS".to_string(), "-O2 -pipe".to_string())));

        let ctx = BuildContext::new("/w", "/s").with_toolchain(toolchain);
        assert_eq!(ctx.search_path(), format!("/opt/cross/bin:{}", DEFAULT_SEARCH_PATH));
    }

    #[test]
    fn test_toolchain_rejects_unknown_keys() {
        let err = Toolchain::from_toml_str("compiler = \"gcc\"").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
