// src/recipe/template.rs

//! `%(name)s` command templates
//!
//! Recipe strings reference variables with the `%(name)s` placeholder. A
//! literal `%(` is written `%%(`. Substitution is a single textual pass:
//! substituted values are never rescanned, and a reference to a variable that
//! is not defined is an error rather than something passed through to the
//! shell.

use crate::error::{Error, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Variables the kitchen defines for every cook
///
/// The toolchain variables at the end are only defined when the build
/// context supplies them.
pub const BUILTIN_VARIABLES: &[&str] = &[
    "name",
    "version",
    "filename",
    "url",
    "stagingdir",
    "destdir",
    "jobs",
    "srcdir",
    "workdir",
    "patchdir",
    "configopts",
    "host",
    "target",
    "sysroot",
    "cc",
    "cxx",
    "ar",
    "ranlib",
    "cflags",
    "ldflags",
];

/// Variables available to the source location templates
///
/// The download location has to be known before anything else about the
/// build exists, so only the package identity may appear in it.
pub const SOURCE_VARIABLES: &[&str] = &["name", "version"];

/// Check whether a name is one of the built-in variables
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_VARIABLES.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Var(&'a str),
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(pos) = rest.find("%(") {
        // `%%(` is an escaped literal `%(`
        if rest[..pos].ends_with('%') {
            segments.push(Segment::Text(&rest[..pos - 1]));
            segments.push(Segment::Text("%("));
            rest = &rest[pos + 2..];
            continue;
        }

        segments.push(Segment::Text(&rest[..pos]));
        let after = &rest[pos + 2..];
        let end = after.find(")s").ok_or_else(|| {
            Error::TemplateError(format!("unterminated placeholder in `{}`", template))
        })?;

        let name = &after[..end];
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::TemplateError(format!(
                "invalid variable name `{}` in `{}`",
                name, template
            )));
        }

        segments.push(Segment::Var(name));
        rest = &after[end + 2..];
    }

    segments.push(Segment::Text(rest));
    Ok(segments)
}

/// Names of the variables a template references, in order of appearance
pub fn references(template: &str) -> Result<Vec<&str>> {
    Ok(parse(template)?
        .into_iter()
        .filter_map(|seg| match seg {
            Segment::Var(name) => Some(name),
            Segment::Text(_) => None,
        })
        .collect())
}

/// A set of variable values for rendering templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.values
    }

    /// Render a template against these values
    pub fn render(&self, template: &str) -> Result<String> {
        let mut out = String::with_capacity(template.len());

        for segment in parse(template)? {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Var(name) => match self.get(name) {
                    Some(value) => out.push_str(value),
                    None if is_builtin(name) => {
                        return Err(Error::TemplateError(format!(
                            "variable `{}` in `{}` is not provided by the build context",
                            name, template
                        )));
                    }
                    None => {
                        return Err(Error::TemplateError(format!(
                            "unknown variable `{}` in `{}`",
                            name, template
                        )));
                    }
                },
            }
        }

        Ok(out)
    }
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_+=/.,:@%".contains(c)
}

/// Quote a word for `/bin/sh` if it contains anything special
pub fn shell_quote(word: &str) -> Cow<'_, str> {
    if !word.is_empty() && word.chars().all(is_shell_safe) {
        return Cow::Borrowed(word);
    }
    Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
}

/// Join configure options into the `%(configopts)s` value
pub fn join_options(options: &[String]) -> String {
    options
        .iter()
        .map(|opt| shell_quote(opt))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Variables {
        let mut vars = Variables::new();
        vars.insert("name", "gmp");
        vars.insert("version", "6.3.0");
        vars.insert("stagingdir", "/tmp/stage");
        vars
    }

    #[test]
    fn test_render_substitutes_all_references() {
        let out = vars()
            .render("./configure --prefix=%(stagingdir)s # %(name)s-%(version)s")
            .unwrap();
        assert_eq!(out, "./configure --prefix=/tmp/stage # gmp-6.3.0");
    }

    #[test]
    fn test_render_is_single_pass() {
        let mut vars = Variables::new();
        vars.insert("a", "%(b)s");
        vars.insert("b", "nope");
        assert_eq!(vars.render("x %(a)s").unwrap(), "x %(b)s");
    }

    #[test]
    fn test_render_unknown_variable() {
        let err = vars().render("make %(jobz)s").unwrap_err();
        assert!(matches!(err, Error::TemplateError(ref m) if m.contains("unknown variable `jobz`")));
    }

    #[test]
    fn test_render_builtin_not_provided() {
        let err = vars().render("%(cc)s -c foo.c").unwrap_err();
        assert!(
            matches!(err, Error::TemplateError(ref m) if m.contains("not provided by the build context"))
        );
    }

    #[test]
    fn test_escaped_placeholder() {
        assert_eq!(vars().render("printf '%%(name)s'").unwrap(), "printf '%(name)s'");
        assert_eq!(vars().render("printf '%s' 100%").unwrap(), "printf '%s' 100%");
    }

    #[test]
    fn test_malformed_placeholders() {
        assert!(parse("%(name").is_err());
        assert!(parse("%(na me)s").is_err());
        assert!(parse("%()s").is_err());
    }

    #[test]
    fn test_references() {
        let refs = references("%(cc)s %(cflags)s -o %(srcdir)s/x %%(skip)s").unwrap();
        assert_eq!(refs, vec!["cc", "cflags", "srcdir"]);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("--enable-cxx"), "--enable-cxx");
        assert_eq!(shell_quote("CFLAGS=-O2 -g"), "'CFLAGS=-O2 -g'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_join_options() {
        let opts = vec!["--enable-cxx".to_string(), "--with-pic=yes please".to_string()];
        assert_eq!(join_options(&opts), "--enable-cxx '--with-pic=yes please'");
        assert_eq!(join_options(&[]), "");
    }
}
