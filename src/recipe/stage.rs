// src/recipe/stage.rs

//! The canonical build stages and their fixed order

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four canonical build stages
///
/// Stages always run in declaration order: preprocess, configure, build,
/// stage. The derived `Ord` follows that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Source preparation before configuration (may be empty)
    Preprocess,
    /// Configure the build (e.g. `./configure --prefix=...`)
    Configure,
    /// Compile
    Build,
    /// Install into the staging directory
    Stage,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 4] = [Stage::Preprocess, Stage::Configure, Stage::Build, Stage::Stage];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preprocess => "preprocess",
            Self::Configure => "configure",
            Self::Build => "build",
            Self::Stage => "stage",
        }
    }

    /// The stage that runs after this one
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Preprocess => Some(Self::Configure),
            Self::Configure => Some(Self::Build),
            Self::Build => Some(Self::Stage),
            Self::Stage => None,
        }
    }

    /// Whether a recipe may leave this stage's command list empty
    pub fn may_be_empty(&self) -> bool {
        matches!(self, Self::Preprocess)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preprocess" => Ok(Self::Preprocess),
            "configure" => Ok(Self::Configure),
            "build" => Ok(Self::Build),
            "stage" => Ok(Self::Stage),
            other => Err(format!("unknown stage: {}", other)),
        }
    }
}
