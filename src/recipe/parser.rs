// src/recipe/parser.rs

//! Recipe file parsing and validation

use crate::error::{Error, Result};
use crate::recipe::format::{Recipe, check_relative};
use crate::recipe::kitchen::ArchiveFormat;
use crate::recipe::stage::Stage;
use crate::recipe::template::{self, SOURCE_VARIABLES};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;
use url::Url;

/// Highest accepted `patches.strip`
pub const MAX_STRIP: u32 = 8;

/// A parsed and validated recipe with its non-fatal warnings
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRecipe {
    pub recipe: Recipe,
    pub warnings: Vec<String>,
}

/// Parse a recipe from a TOML string
pub fn parse_recipe(content: &str) -> Result<Recipe> {
    toml::from_str(content).map_err(|e| Error::ParseError(format!("Invalid recipe: {}", e)))
}

/// Parse a recipe from a file
pub fn parse_recipe_file(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::IoError(format!("Failed to read recipe file {}: {}", path.display(), e))
    })?;

    parse_recipe(&content).map_err(|e| match e {
        Error::ParseError(msg) => Error::ParseError(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Parse and validate a recipe file
///
/// `patch_dir`, when given, is checked for every listed patch.
pub fn load_recipe(path: &Path, patch_dir: Option<&Path>) -> Result<LoadedRecipe> {
    let recipe = parse_recipe_file(path)?;
    let warnings = validate_recipe(&recipe, patch_dir)?;
    debug!(
        "Loaded recipe {} {} from {} ({} warning(s))",
        recipe.package.name,
        recipe.package.version,
        path.display(),
        warnings.len()
    );
    Ok(LoadedRecipe { recipe, warnings })
}

/// Validate a recipe for completeness and correctness
///
/// Returns the non-fatal warnings, or the first problem found as
/// `Error::InvalidRecipe` naming the offending field.
pub fn validate_recipe(recipe: &Recipe, patch_dir: Option<&Path>) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    validate_package(recipe)?;
    validate_source(recipe)?;
    validate_stages(recipe)?;
    validate_patches(recipe, patch_dir)?;
    validate_build(recipe)?;
    validate_variables(recipe)?;
    validate_templates(recipe)?;

    // Warn about missing fields
    if recipe.package.summary.is_none() {
        warnings.push("Missing package summary".to_string());
    }
    if recipe.package.license.is_none() {
        warnings.push("Missing package license".to_string());
    }
    if !installs_into_staging(recipe) {
        warnings.push(
            "Neither configure nor stage commands reference %(stagingdir)s or %(destdir)s"
                .to_string(),
        );
    }
    if !recipe.build.config_options.is_empty() && !references_anywhere(recipe, "configopts") {
        warnings.push(
            "build.config_options are set but no command references %(configopts)s".to_string(),
        );
    }

    Ok(warnings)
}

fn validate_package(recipe: &Recipe) -> Result<()> {
    let name = &recipe.package.name;
    if name.is_empty() {
        return Err(Error::invalid("package.name", "cannot be empty"));
    }
    let starts_alnum = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "-_+.".contains(c));
    if !starts_alnum || !valid_chars {
        return Err(Error::invalid(
            "package.name",
            format!(
                "`{}` must be lowercase letters, digits, `-`, `_`, `+` or `.`, starting with a letter or digit",
                name
            ),
        ));
    }

    let version = &recipe.package.version;
    if version.is_empty() {
        return Err(Error::invalid("package.version", "cannot be empty"));
    }
    if version.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(Error::invalid(
            "package.version",
            format!("`{}` must not contain whitespace or `/`", version),
        ));
    }

    Ok(())
}

fn validate_source(recipe: &Recipe) -> Result<()> {
    let source = &recipe.source;
    recipe.digest()?;

    if source.download_path.trim().is_empty() {
        return Err(Error::invalid("source.download_path", "cannot be empty"));
    }
    if source.file_name.trim().is_empty() {
        return Err(Error::invalid("source.file_name", "cannot be empty"));
    }

    let mut fields = vec![
        ("source.download_path", source.download_path.as_str()),
        ("source.file_name", source.file_name.as_str()),
    ];
    if let Some(dir) = &source.extract_dir {
        fields.push(("source.extract_dir", dir.as_str()));
    }
    for (field, value) in fields {
        for var in template::references(value).map_err(|e| template_field(field, e))? {
            if !SOURCE_VARIABLES.contains(&var) {
                return Err(Error::invalid(
                    field,
                    format!("may only reference %(name)s and %(version)s, found %({})s", var),
                ));
            }
        }
    }

    let file_name = recipe.archive_filename()?;
    if file_name.contains('/') {
        return Err(Error::invalid(
            "source.file_name",
            format!("`{}` must be a bare file name", file_name),
        ));
    }
    if ArchiveFormat::from_filename(&file_name).is_none() {
        return Err(Error::invalid(
            "source.file_name",
            format!(
                "`{}` is not a supported archive (.tar, .tar.gz, .tgz, .tar.xz, .txz, .tar.zst)",
                file_name
            ),
        ));
    }

    let url = recipe.archive_url()?;
    let parsed = Url::parse(&url)
        .map_err(|e| Error::invalid("source.download_path", format!("`{}`: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https" | "file") {
        return Err(Error::invalid(
            "source.download_path",
            format!("unsupported URL scheme `{}`", parsed.scheme()),
        ));
    }

    if let Some(dir) = recipe.extract_dir()? {
        check_relative("source.extract_dir", &dir)?;
    }

    Ok(())
}

fn validate_stages(recipe: &Recipe) -> Result<()> {
    for stage in Stage::ALL {
        let commands = recipe.stages.commands(stage);
        let field = format!("stages.{}", stage);

        if commands.is_empty() && !stage.may_be_empty() {
            return Err(Error::invalid(field, "needs at least one command"));
        }
        if let Some(i) = commands.iter().position(|c| c.trim().is_empty()) {
            return Err(Error::invalid(format!("{}[{}]", field, i), "command is blank"));
        }
    }
    Ok(())
}

fn validate_patches(recipe: &Recipe, patch_dir: Option<&Path>) -> Result<()> {
    let patches = &recipe.patches;
    if patches.strip > MAX_STRIP {
        return Err(Error::invalid(
            "patches.strip",
            format!("{} is larger than {}", patches.strip, MAX_STRIP),
        ));
    }

    let mut seen = HashSet::new();
    for name in &patches.files {
        if name.trim().is_empty() {
            return Err(Error::invalid("patches.files", "patch name is blank"));
        }
        check_relative("patches.files", name)?;
        if !seen.insert(name.as_str()) {
            return Err(Error::invalid(
                "patches.files",
                format!("`{}` is listed more than once", name),
            ));
        }
        let Some(dir) = patch_dir else {
            return Err(Error::invalid(
                "patches.files",
                format!("`{}` cannot be resolved: no patch directory", name),
            ));
        };
        if !dir.join(name).is_file() {
            return Err(Error::invalid(
                "patches.files",
                format!("`{}` not found in {}", name, dir.display()),
            ));
        }
    }
    Ok(())
}

fn validate_build(recipe: &Recipe) -> Result<()> {
    for key in recipe.build.environment.keys() {
        let valid = !key.is_empty()
            && !key.starts_with(|c: char| c.is_ascii_digit())
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(Error::invalid(
                format!("build.environment.{}", key),
                "not a valid environment variable name",
            ));
        }
    }

    for (i, opt) in recipe.build.config_options.iter().enumerate() {
        let field = format!("build.config_options[{}]", i);
        for var in template::references(opt).map_err(|e| template_field(&field, e))? {
            if !template::is_builtin(var) || var == "configopts" || var == "workdir" {
                return Err(Error::invalid(
                    field,
                    format!(
                        "may only reference built-ins other than configopts and workdir, found %({})s",
                        var
                    ),
                ));
            }
        }
    }

    if let Some(workdir) = &recipe.build.workdir {
        let refs = template::references(workdir).map_err(|e| template_field("build.workdir", e))?;
        if refs.contains(&"workdir") {
            return Err(Error::invalid("build.workdir", "cannot reference itself"));
        }
        if workdir.trim().is_empty() {
            return Err(Error::invalid("build.workdir", "cannot be empty"));
        }
        check_relative("build.workdir", workdir)?;
    }
    Ok(())
}

fn validate_variables(recipe: &Recipe) -> Result<()> {
    for (name, value) in &recipe.variables {
        let field = format!("variables.{}", name);
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::invalid(field, "variable names may only use letters, digits and `_`"));
        }
        if template::is_builtin(name) {
            return Err(Error::invalid(field, "shadows a built-in variable"));
        }
        for var in template::references(value).map_err(|e| template_field(&field, e))? {
            if !template::is_builtin(var) {
                return Err(Error::invalid(
                    field,
                    format!("may only reference built-in variables, found %({})s", var),
                ));
            }
        }
    }
    Ok(())
}

/// Every template may reference built-ins and custom variables only
fn validate_templates(recipe: &Recipe) -> Result<()> {
    for (field, value) in recipe.templates() {
        if field.starts_with("variables.")
            || field.starts_with("source.")
            || field.starts_with("build.config_options")
        {
            continue;
        }
        for var in template::references(value).map_err(|e| template_field(&field, e))? {
            if !template::is_builtin(var) && !recipe.variables.contains_key(var) {
                return Err(Error::invalid(field, format!("unknown variable %({})s", var)));
            }
        }
    }
    Ok(())
}

fn template_field(field: &str, err: Error) -> Error {
    match err {
        Error::TemplateError(msg) => Error::invalid(field, msg),
        other => other,
    }
}

/// Whether any stage command or custom variable references `var`
fn references_anywhere(recipe: &Recipe, var: &str) -> bool {
    let mentions = |text: &str| {
        template::references(text)
            .unwrap_or_default()
            .contains(&var)
    };
    recipe.variables.values().any(|v| mentions(v))
        || Stage::ALL
            .into_iter()
            .flat_map(|stage| recipe.stages.commands(stage))
            .any(|cmd| mentions(cmd))
}

/// Whether the install reaches the staging directory through some template
fn installs_into_staging(recipe: &Recipe) -> bool {
    let mut staging_vars: HashSet<&str> = ["stagingdir", "destdir"].into_iter().collect();
    let options_stage = recipe.build.config_options.iter().any(|opt| {
        template::references(opt)
            .unwrap_or_default()
            .iter()
            .any(|r| *r == "stagingdir" || *r == "destdir")
    });
    if options_stage {
        staging_vars.insert("configopts");
    }
    for (name, value) in &recipe.variables {
        let refs = template::references(value).unwrap_or_default();
        if refs.iter().any(|r| *r == "stagingdir" || *r == "destdir") {
            staging_vars.insert(name.as_str());
        }
    }

    [Stage::Configure, Stage::Stage]
        .into_iter()
        .flat_map(|stage| recipe.stages.commands(stage))
        .any(|cmd| {
            template::references(cmd)
                .unwrap_or_default()
                .iter()
                .any(|r| staging_vars.contains(r))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VALID: &str = r#"
[package]
name = "gmp"
version = "6.3.0"
summary = "GNU multiple precision arithmetic library"
license = "LGPL-3.0-or-later OR GPL-2.0-or-later"

[source]
download_path = "https://gmplib.org/download/gmp/"
file_name = "gmp-%(version)s.tar.xz"
sha256 = "a3c2b80201b89e68616f4ad30bc66aee4927c3ce50e33929ca819d5c43538898"

[build]
config_options = ["--enable-cxx"]

[stages]
configure = ["./configure --prefix=%(stagingdir)s %(configopts)s"]
build = ["make -j%(jobs)s"]
stage = ["make install"]
"#;

    fn valid() -> Recipe {
        parse_recipe(VALID).unwrap()
    }

    fn field_of(err: Error) -> String {
        match err {
            Error::InvalidRecipe { field, .. } => field,
            other => panic!("expected InvalidRecipe, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_valid_recipe() {
        let recipe = valid();
        assert_eq!(recipe.package.name, "gmp");
        assert!(recipe.patches.files.is_empty());
        let warnings = validate_recipe(&recipe, None).unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn test_parse_invalid_recipe() {
        let result = parse_recipe("this is not valid toml [[[");
        assert!(matches!(result, Err(Error::ParseError(_))));

        // Missing [source]
        let result = parse_recipe("[package]\nname = \"x\"\nversion = \"1\"\n");
        assert!(matches!(result, Err(Error::ParseError(_))));
    }

    #[test]
    fn test_validate_empty_name() {
        let mut recipe = valid();
        recipe.package.name.clear();
        assert_eq!(field_of(validate_recipe(&recipe, None).unwrap_err()), "package.name");

        recipe.package.name = "GMP".to_string();
        assert_eq!(field_of(validate_recipe(&recipe, None).unwrap_err()), "package.name");

        recipe.package.name = "libstdc++".to_string();
        assert!(validate_recipe(&recipe, None).is_ok());
    }

    #[test]
    fn test_validate_empty_version() {
        let mut recipe = valid();
        recipe.package.version.clear();
        assert_eq!(field_of(validate_recipe(&recipe, None).unwrap_err()), "package.version");
    }

    #[test]
    fn test_validate_bad_digest() {
        let mut recipe = valid();
        recipe.source.sha256 = "abc123".to_string();
        assert_eq!(field_of(validate_recipe(&recipe, None).unwrap_err()), "source.sha256");

        recipe.source.sha256 = format!("sha512:{}", "0".repeat(64));
        assert_eq!(field_of(validate_recipe(&recipe, None).unwrap_err()), "source.sha256");
    }

    #[test]
    fn test_validate_download_location() {
        let mut recipe = valid();
        recipe.source.download_path = "ftp://gmplib.org/download/gmp".to_string();
        assert_eq!(
            field_of(validate_recipe(&recipe, None).unwrap_err()),
            "source.download_path"
        );

        let mut recipe = valid();
        recipe.source.download_path = "gmplib.org/download".to_string();
        assert_eq!(
            field_of(validate_recipe(&recipe, None).unwrap_err()),
            "source.download_path"
        );

        let mut recipe = valid();
        recipe.source.file_name = "gmp-%(jobs)s.tar.xz".to_string();
        assert_eq!(field_of(validate_recipe(&recipe, None).unwrap_err()), "source.file_name");

        let mut recipe = valid();
        recipe.source.file_name = "gmp-6.3.0.zip".to_string();
        assert_eq!(field_of(validate_recipe(&recipe, None).unwrap_err()), "source.file_name");
    }

    #[test]
    fn test_validate_stage_lists() {
        let mut recipe = valid();
        recipe.stages.build.clear();
        assert_eq!(field_of(validate_recipe(&recipe, None).unwrap_err()), "stages.build");

        let mut recipe = valid();
        recipe.stages.stage.push("   ".to_string());
        assert_eq!(field_of(validate_recipe(&recipe, None).unwrap_err()), "stages.stage[1]");

        // preprocess may be empty, but not blank
        let mut recipe = valid();
        recipe.stages.preprocess.push(String::new());
        assert_eq!(
            field_of(validate_recipe(&recipe, None).unwrap_err()),
            "stages.preprocess[0]"
        );
    }

    #[test]
    fn test_validate_unknown_variable() {
        let mut recipe = valid();
        recipe.stages.build = vec!["make -j%(job)s".to_string()];
        assert_eq!(field_of(validate_recipe(&recipe, None).unwrap_err()), "stages.build[0]");

        recipe
            .variables
            .insert("job".to_string(), "%(jobs)s".to_string());
        assert!(validate_recipe(&recipe, None).is_ok());
    }

    #[test]
    fn test_validate_custom_variables() {
        let mut recipe = valid();
        recipe
            .variables
            .insert("version".to_string(), "7".to_string());
        assert_eq!(field_of(validate_recipe(&recipe, None).unwrap_err()), "variables.version");

        let mut recipe = valid();
        recipe.variables.insert("a".to_string(), "x".to_string());
        recipe.variables.insert("b".to_string(), "%(a)s".to_string());
        assert_eq!(field_of(validate_recipe(&recipe, None).unwrap_err()), "variables.b");
    }

    #[test]
    fn test_validate_patches() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("gmp-6.3.0-staging.patch"), "").unwrap();
        let with_patches = |files: &[&str]| {
            let mut recipe = valid();
            recipe.patches.files = files.iter().map(|f| f.to_string()).collect();
            recipe
        };

        let recipe = with_patches(&["gmp-6.3.0-staging.patch", "gmp-6.3.0-staging.patch"]);
        assert_eq!(
            field_of(validate_recipe(&recipe, Some(dir.path())).unwrap_err()),
            "patches.files"
        );

        let recipe = with_patches(&["../escape.patch"]);
        assert_eq!(
            field_of(validate_recipe(&recipe, Some(dir.path())).unwrap_err()),
            "patches.files"
        );

        let mut recipe = with_patches(&["gmp-6.3.0-staging.patch"]);
        recipe.patches.strip = 9;
        assert_eq!(
            field_of(validate_recipe(&recipe, Some(dir.path())).unwrap_err()),
            "patches.strip"
        );
    }

    #[test]
    fn test_validate_patch_dir() {
        let dir = TempDir::new().unwrap();
        let mut recipe = valid();
        recipe.patches.files = vec!["gmp-6.3.0-staging.patch".to_string()];
        assert_eq!(
            field_of(validate_recipe(&recipe, Some(dir.path())).unwrap_err()),
            "patches.files"
        );

        std::fs::write(dir.path().join("gmp-6.3.0-staging.patch"), "").unwrap();
        assert!(validate_recipe(&recipe, Some(dir.path())).is_ok());
    }

    #[test]
    fn test_patches_need_a_patch_dir() {
        let mut recipe = valid();
        recipe.patches.files = vec!["does-not-exist.patch".to_string()];
        match validate_recipe(&recipe, None).unwrap_err() {
            Error::InvalidRecipe { field, reason } => {
                assert_eq!(field, "patches.files");
                assert!(reason.contains("no patch directory"), "reason: {}", reason);
            }
            other => panic!("expected InvalidRecipe, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_environment_names() {
        let mut recipe = valid();
        recipe
            .build
            .environment
            .insert("1BAD".to_string(), "x".to_string());
        assert_eq!(
            field_of(validate_recipe(&recipe, None).unwrap_err()),
            "build.environment.1BAD"
        );
    }

    #[test]
    fn test_validate_warnings() {
        let mut recipe = valid();
        recipe.package.summary = None;
        recipe.package.license = None;
        recipe.build.config_options.clear();
        recipe.stages.configure = vec!["./configure".to_string()];

        let warnings = validate_recipe(&recipe, None).unwrap();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("summary")));
        assert!(warnings.iter().any(|w| w.contains("license")));
        assert!(warnings.iter().any(|w| w.contains("stagingdir")));

        // A custom variable that points into staging counts
        recipe
            .variables
            .insert("prefix".to_string(), "%(stagingdir)s/usr".to_string());
        recipe.stages.stage = vec!["make install prefix=%(prefix)s".to_string()];
        let warnings = validate_recipe(&recipe, None).unwrap();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_unused_config_options_warn() {
        let mut recipe = valid();
        recipe.stages.configure = vec!["./configure --prefix=%(stagingdir)s".to_string()];
        let warnings = validate_recipe(&recipe, None).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("%(configopts)s"));

        // Reaching configure through a custom variable is enough
        recipe
            .variables
            .insert("opts".to_string(), "%(configopts)s".to_string());
        recipe.stages.configure = vec!["./configure --prefix=%(stagingdir)s %(opts)s".to_string()];
        assert!(validate_recipe(&recipe, None).unwrap().is_empty());
    }

    #[test]
    fn test_validate_config_option_templates() {
        let mut recipe = valid();
        recipe.build.config_options = vec!["--libdir=%(stagingdir)s/lib".to_string()];
        assert!(validate_recipe(&recipe, None).is_ok());

        recipe.build.config_options = vec!["--libdir=%(libdir)s".to_string()];
        assert_eq!(
            field_of(validate_recipe(&recipe, None).unwrap_err()),
            "build.config_options[0]"
        );

        recipe.build.config_options = vec!["--enable-cxx".to_string(), "%(configopts)s".to_string()];
        assert_eq!(
            field_of(validate_recipe(&recipe, None).unwrap_err()),
            "build.config_options[1]"
        );

        // An option pointing into staging satisfies the staging check
        recipe.build.config_options = vec!["--prefix=%(stagingdir)s".to_string()];
        recipe.stages.configure = vec!["./configure %(configopts)s".to_string()];
        assert!(validate_recipe(&recipe, None).unwrap().is_empty());
    }

    #[test]
    fn test_load_recipe_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gmp.toml");
        std::fs::write(&path, VALID).unwrap();

        let loaded = load_recipe(&path, None).unwrap();
        assert_eq!(loaded.recipe.package.version, "6.3.0");
        assert!(loaded.warnings.is_empty());

        let err = load_recipe(&dir.path().join("missing.toml"), None).unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }
}
