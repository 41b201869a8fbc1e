// src/error.rs

//! Error types for recipe loading and cooking

use crate::recipe::Stage;
use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while loading, resolving or cooking a recipe
#[derive(Error, Debug)]
pub enum Error {
    /// Recipe text could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A recipe field is missing or malformed
    #[error("Invalid recipe field `{field}`: {reason}")]
    InvalidRecipe { field: String, reason: String },

    /// A template could not be fully resolved
    #[error("Template error: {0}")]
    TemplateError(String),

    /// Invalid kitchen or toolchain configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A file or directory the recipe needs does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Filesystem or process I/O failed
    #[error("I/O error: {0}")]
    IoError(String),

    /// The source archive could not be downloaded
    #[error("Download failed: {0}")]
    DownloadError(String),

    /// The downloaded archive does not hash to the recorded digest
    #[error("Digest mismatch for {file}: expected sha256:{expected}, got sha256:{actual}")]
    DigestMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// A patch did not apply cleanly to the unpacked sources
    #[error("Patch {patch} failed to apply: {reason}")]
    PatchApply { patch: String, reason: String },

    /// A stage command exited unsuccessfully, timed out or could not be spawned
    #[error("{stage} stage failed running `{command}`: {reason}")]
    StageFailed {
        stage: Stage,
        command: String,
        /// Exit code, `None` when killed by a signal, timed out or never spawned
        status: Option<i32>,
        reason: String,
    },
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

/// The pipeline failure a cook reports to its orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    DownloadFailure,
    DigestMismatch,
    PatchApplyFailure,
    PreprocessFailure,
    ConfigureFailure,
    BuildFailure,
    StageFailure,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DownloadFailure => "DownloadFailure",
            Self::DigestMismatch => "DigestMismatch",
            Self::PatchApplyFailure => "PatchApplyFailure",
            Self::PreprocessFailure => "PreprocessFailure",
            Self::ConfigureFailure => "ConfigureFailure",
            Self::BuildFailure => "BuildFailure",
            Self::StageFailure => "StageFailure",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify a cook error into its pipeline failure kind
    ///
    /// Returns `None` for errors raised outside the pipeline proper
    /// (parsing, validation, configuration, plain I/O).
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::DownloadError(_) => Some(FailureKind::DownloadFailure),
            Self::DigestMismatch { .. } => Some(FailureKind::DigestMismatch),
            Self::PatchApply { .. } => Some(FailureKind::PatchApplyFailure),
            Self::StageFailed { stage, .. } => Some(match stage {
                Stage::Preprocess => FailureKind::PreprocessFailure,
                Stage::Configure => FailureKind::ConfigureFailure,
                Stage::Build => FailureKind::BuildFailure,
                Stage::Stage => FailureKind::StageFailure,
            }),
            _ => None,
        }
    }

    /// The stage a failure happened in, if any
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Shorthand for an `InvalidRecipe` error
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRecipe {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
