// src/lib.rs

//! Pantry: declarative recipes for third-party dependencies
//!
//! A recipe describes how to fetch, verify, patch, configure, build and
//! stage one upstream source package. The [`recipe::Kitchen`] executes a
//! recipe against an explicit [`recipe::BuildContext`], stopping at the
//! first failure.
//!
//! # Architecture
//!
//! - Recipes: TOML files, validated before anything runs
//! - Templates: `%(name)s` placeholders resolved once into a `CookPlan`
//! - Kitchen: fetch, digest check, unpack, patch, then the four stages
//! - Staging: the install tree is recorded with a reproducibility digest

mod error;
pub mod hash;
pub mod recipe;

pub use error::{Error, FailureKind, Result};
pub use hash::{Hasher, Sha256Digest};
pub use recipe::{
    BuildContext, CookPlan, CookResult, Kitchen, KitchenConfig, Recipe, RecipeSet, Stage,
    Toolchain,
};
