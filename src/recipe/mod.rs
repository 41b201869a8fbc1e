// src/recipe/mod.rs

//! Recipe system for building third-party dependencies from source
//!
//! A recipe describes one upstream dependency:
//! - The source archive and its SHA-256 digest
//! - Patches to apply
//! - Configure options
//! - Shell command templates for the preprocess, configure, build and
//!   stage steps
//!
//! # Culinary Terminology
//!
//! - **Recipe**: The build specification (like a recipe card)
//! - **Cook**: Build a dependency from a recipe
//! - **Kitchen**: The build environment that runs cooks
//! - **Prep**: Fetch and verify sources
//! - **Stage**: Install the result under a staging directory
//!
//! # Example Recipe
//!
//! ```toml
//! [package]
//! name = "gmp"
//! version = "6.3.0"
//!
//! [source]
//! download_path = "https://gmplib.org/download/gmp/"
//! file_name = "gmp-%(version)s.tar.xz"
//! sha256 = "a3c2b80201b89e68616f4ad30bc66aee4927c3ce50e33929ca819d5c43538898"
//!
//! [patches]
//! files = ["gmp-6.3.0-staging-notes.patch"]
//!
//! [build]
//! config_options = ["--enable-cxx"]
//!
//! [stages]
//! configure = ["./configure --prefix=%(stagingdir)s %(configopts)s"]
//! build = ["make -j%(jobs)s"]
//! stage = ["make install"]
//! ```

pub mod format;
pub mod kitchen;
pub mod parser;
pub mod set;
pub mod stage;
pub mod template;

pub use format::{CookPlan, PatchSection, Recipe, SourceSection, StageSection};
pub use kitchen::{BuildContext, Cook, CookResult, Kitchen, KitchenConfig, Toolchain};
pub use parser::{LoadedRecipe, load_recipe, parse_recipe, parse_recipe_file, validate_recipe};
pub use set::RecipeSet;
pub use stage::Stage;
