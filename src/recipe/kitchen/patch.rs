// src/recipe/kitchen/patch.rs

//! Applying unified diffs to an unpacked source tree
//!
//! Patch files may touch several files each. Every hunk of every patch is
//! applied in memory first; the source tree is only written once the whole
//! series has applied cleanly, so a failing patch leaves no file modified.

use crate::error::{Error, Result};
use crate::recipe::format::PlannedPatch;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// The part of a patch file that changes one file
#[derive(Debug, Clone, PartialEq, Eq)]
struct FilePatch {
    /// Path on the `---` line, `None` for `/dev/null`
    old_path: Option<String>,
    /// Path on the `+++` line, `None` for `/dev/null`
    new_path: Option<String>,
    /// Normalized diff for this file only
    text: Vec<u8>,
}

/// Outcome of applying a patch series
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSummary {
    /// Files written, relative to the source root
    pub modified: Vec<PathBuf>,
    /// Files removed, relative to the source root
    pub deleted: Vec<PathBuf>,
}

/// Apply patches in order with the given strip level
pub fn apply_patches(source_dir: &Path, patches: &[PlannedPatch], strip: u32) -> Result<PatchSummary> {
    // None marks a file deleted by an earlier hunk
    let mut overlay: BTreeMap<PathBuf, Option<Vec<u8>>> = BTreeMap::new();

    for patch in patches {
        let fail = |reason: String| Error::PatchApply {
            patch: patch.name.clone(),
            reason,
        };

        let content = fs::read(&patch.path)
            .map_err(|e| fail(format!("cannot read {}: {}", patch.path.display(), e)))?;
        let files = split_patch(&content).map_err(fail)?;
        debug!("Patch {} touches {} file(s)", patch.name, files.len());

        for file in files {
            let old_rel = file
                .old_path
                .as_deref()
                .map(|p| strip_path(p, strip))
                .transpose()
                .map_err(fail)?;
            let new_rel = file
                .new_path
                .as_deref()
                .map(|p| strip_path(p, strip))
                .transpose()
                .map_err(fail)?;

            let target = match (&new_rel, &old_rel) {
                (Some(rel), _) | (None, Some(rel)) => rel.clone(),
                (None, None) => return Err(fail("diff has /dev/null on both sides".to_string())),
            };

            let base = match &old_rel {
                Some(rel) => load(&overlay, source_dir, rel).map_err(fail)?,
                None => {
                    if exists(&overlay, source_dir, &target) {
                        return Err(fail(format!("{} already exists", target.display())));
                    }
                    Vec::new()
                }
            };

            let parsed = diffy::Patch::from_bytes(&file.text)
                .map_err(|e| fail(format!("{}: {}", target.display(), e)))?;
            let patched = diffy::apply_bytes(&base, &parsed)
                .map_err(|e| fail(format!("{}: {}", target.display(), e)))?;

            if new_rel.is_none() {
                overlay.insert(target, None);
                continue;
            }
            if let Some(old) = old_rel
                && old != target
            {
                overlay.insert(old, None);
            }
            overlay.insert(target, Some(patched));
        }

        info!("Patch {} applies cleanly", patch.name);
    }

    let mut summary = PatchSummary::default();
    for (rel, content) in overlay {
        let path = source_dir.join(&rel);
        match content {
            Some(bytes) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, bytes)?;
                summary.modified.push(rel);
            }
            None => {
                if path.exists() {
                    fs::remove_file(&path)?;
                }
                summary.deleted.push(rel);
            }
        }
    }

    Ok(summary)
}

fn load(
    overlay: &BTreeMap<PathBuf, Option<Vec<u8>>>,
    source_dir: &Path,
    rel: &Path,
) -> std::result::Result<Vec<u8>, String> {
    match overlay.get(rel) {
        Some(Some(bytes)) => Ok(bytes.clone()),
        Some(None) => Err(format!("{} was deleted by an earlier hunk", rel.display())),
        None => fs::read(source_dir.join(rel))
            .map_err(|e| format!("cannot read {}: {}", rel.display(), e)),
    }
}

fn exists(overlay: &BTreeMap<PathBuf, Option<Vec<u8>>>, source_dir: &Path, rel: &Path) -> bool {
    match overlay.get(rel) {
        Some(content) => content.is_some(),
        None => source_dir.join(rel).exists(),
    }
}

/// Drop `strip` leading components from a diff header path
fn strip_path(path: &str, strip: u32) -> std::result::Result<PathBuf, String> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    let strip = strip as usize;
    if parts.len() <= strip {
        return Err(format!("cannot strip {} component(s) from `{}`", strip, path));
    }

    let rel: PathBuf = parts[strip..].iter().collect();
    if rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(format!("`{}` points outside the source tree", path));
    }
    Ok(rel)
}

/// Path from a `---`/`+++` header line, without timestamp
fn header_path(rest: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(rest);
    let path = text.trim_end_matches(['\n', '\r']);
    let path = path.split('\t').next().unwrap_or(path).trim();
    if path == "/dev/null" {
        None
    } else {
        Some(path.to_string())
    }
}

/// `(old_start, old_count, new_start, new_count)` from an `@@` line
fn parse_hunk_header(line: &[u8]) -> Option<(usize, usize, usize, usize)> {
    let line = std::str::from_utf8(line).ok()?;
    let body = line.strip_prefix("@@ -")?;
    let end = body.find(" @@")?;
    let (old, new) = body[..end].split_once(" +")?;

    fn range(r: &str) -> Option<(usize, usize)> {
        match r.split_once(',') {
            Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
            None => Some((r.parse().ok()?, 1)),
        }
    }

    let (old_start, old_count) = range(old)?;
    let (new_start, new_count) = range(new)?;
    Some((old_start, old_count, new_start, new_count))
}

/// Split a patch file into per-file diffs
///
/// Text outside file sections (commit messages, `diff --git` and `index`
/// lines) is skipped. Hunks are consumed by their declared line counts.
/// Lines are handled as bytes so files in any encoding can be patched.
fn split_patch(content: &[u8]) -> std::result::Result<Vec<FilePatch>, String> {
    let lines: Vec<&[u8]> = content.split_inclusive(|b| *b == b'\n').collect();
    let mut files = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let is_header = lines[i].starts_with(b"--- ")
            && lines.get(i + 1).is_some_and(|next| next.starts_with(b"+++ "));
        if !is_header {
            i += 1;
            continue;
        }

        let old_path = header_path(&lines[i][4..]);
        let new_path = header_path(&lines[i + 1][4..]);
        let mut text = b"--- original\n+++ modified\n".to_vec();
        i += 2;

        let mut hunks = 0;
        while let Some(line) = lines.get(i).filter(|l| l.starts_with(b"@@ ")) {
            let (old_start, old_count, new_start, new_count) = parse_hunk_header(line)
                .ok_or_else(|| format!("malformed hunk header: {}", lossy(line)))?;
            text.extend_from_slice(
                format!("@@ -{},{} +{},{} @@\n", old_start, old_count, new_start, new_count)
                    .as_bytes(),
            );
            i += 1;

            let (mut old_seen, mut new_seen) = (0, 0);
            while old_seen < old_count || new_seen < new_count {
                let Some(body) = lines.get(i) else {
                    return Err("patch ends in the middle of a hunk".to_string());
                };
                match body.first() {
                    Some(b' ') => {
                        old_seen += 1;
                        new_seen += 1;
                        text.extend_from_slice(body);
                    }
                    // Blank context line whose leading space was lost
                    Some(b'\n') | Some(b'\r') => {
                        old_seen += 1;
                        new_seen += 1;
                        text.push(b' ');
                        text.extend_from_slice(body);
                    }
                    Some(b'-') => {
                        old_seen += 1;
                        text.extend_from_slice(body);
                    }
                    Some(b'+') => {
                        new_seen += 1;
                        text.extend_from_slice(body);
                    }
                    Some(b'\\') => text.extend_from_slice(body),
                    _ => return Err(format!("unexpected line in hunk: {}", lossy(body))),
                }
                i += 1;
            }

            while let Some(marker) = lines.get(i).filter(|l| l.starts_with(b"\\")) {
                text.extend_from_slice(marker);
                i += 1;
            }
            hunks += 1;
        }

        if hunks == 0 {
            return Err(format!(
                "no hunks for {}",
                new_path.as_deref().or(old_path.as_deref()).unwrap_or("/dev/null")
            ));
        }

        files.push(FilePatch {
            old_path,
            new_path,
            text,
        });
    }

    if files.is_empty() {
        return Err("no file changes found".to_string());
    }
    Ok(files)
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LIST: &str = "alpha\nbeta\ngamma\ndelta\n";

    const UPPERCASE_BETA: &str = "\
From: A Developer
Subject: uppercase beta

diff --git a/list.txt b/list.txt
index 1111111..2222222 100644
--- a/list.txt\t2024-01-01 00:00:00
+++ b/list.txt\t2024-01-02 00:00:00
@@ -1,4 +1,4 @@ heading
 alpha
-beta
+BETA
 gamma
 delta
";

    fn setup(patches: &[(&str, &str)]) -> (TempDir, PathBuf, Vec<PlannedPatch>) {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("list.txt"), LIST).unwrap();

        let planned = patches
            .iter()
            .map(|(name, text)| {
                let path = dir.path().join(name);
                fs::write(&path, text).unwrap();
                PlannedPatch {
                    name: name.to_string(),
                    path,
                }
            })
            .collect();
        (dir, src, planned)
    }

    #[test]
    fn test_apply_single_patch() {
        let (_dir, src, patches) = setup(&[("upper.patch", UPPERCASE_BETA)]);
        let summary = apply_patches(&src, &patches, 1).unwrap();

        assert_eq!(summary.modified, vec![PathBuf::from("list.txt")]);
        assert_eq!(
            fs::read_to_string(src.join("list.txt")).unwrap(),
            "alpha\nBETA\ngamma\ndelta\n"
        );
    }

    #[test]
    fn test_multi_file_patch_creates_file() {
        let patch = format!(
            "{}--- /dev/null\n+++ b/docs/NEW\n@@ -0,0 +1,2 @@\n+one\n+two\n",
            UPPERCASE_BETA
        );
        let (_dir, src, patches) = setup(&[("multi.patch", &patch)]);
        apply_patches(&src, &patches, 1).unwrap();

        assert_eq!(fs::read_to_string(src.join("docs/NEW")).unwrap(), "one\ntwo\n");
        assert!(fs::read_to_string(src.join("list.txt")).unwrap().contains("BETA"));
    }

    #[test]
    fn test_failed_patch_leaves_tree_untouched() {
        let broken = "--- a/list.txt\n+++ b/list.txt\n@@ -1,3 +1,3 @@\n alpha\n-epsilon\n+EPSILON\n gamma\n";
        let (_dir, src, patches) =
            setup(&[("01-upper.patch", UPPERCASE_BETA), ("02-broken.patch", broken)]);

        let err = apply_patches(&src, &patches, 1).unwrap_err();
        assert!(matches!(err, Error::PatchApply { ref patch, .. } if patch == "02-broken.patch"));
        assert_eq!(fs::read_to_string(src.join("list.txt")).unwrap(), LIST);
    }

    #[test]
    fn test_non_utf8_files() {
        let (_dir, src, _) = setup(&[]);
        fs::write(src.join("AUTHORS"), b"Authors:\nTorbj\xf6rn Granlund\nold entry\n").unwrap();

        let patch: &[u8] = b"--- a/AUTHORS\n+++ b/AUTHORS\n@@ -1,3 +1,3 @@\n Authors:\n Torbj\xf6rn Granlund\n-old entry\n+new entry\n";
        let path = src.parent().unwrap().join("authors.patch");
        fs::write(&path, patch).unwrap();
        let patches = vec![PlannedPatch {
            name: "authors.patch".to_string(),
            path,
        }];

        apply_patches(&src, &patches, 1).unwrap();
        assert_eq!(
            fs::read(src.join("AUTHORS")).unwrap(),
            b"Authors:\nTorbj\xf6rn Granlund\nnew entry\n"
        );
    }

    #[test]
    fn test_patches_apply_in_order() {
        let second = "--- a/list.txt\n+++ b/list.txt\n@@ -1,3 +1,3 @@\n alpha\n-BETA\n+Beta\n gamma\n";
        let (_dir, src, patches) =
            setup(&[("01-upper.patch", UPPERCASE_BETA), ("02-title.patch", second)]);
        apply_patches(&src, &patches, 1).unwrap();
        assert_eq!(
            fs::read_to_string(src.join("list.txt")).unwrap(),
            "alpha\nBeta\ngamma\ndelta\n"
        );
    }

    #[test]
    fn test_strip_zero_and_delete() {
        let delete = "--- list.txt\n+++ /dev/null\n@@ -1,4 +0,0 @@\n-alpha\n-beta\n-gamma\n-delta\n";
        let (_dir, src, patches) = setup(&[("rm.patch", delete)]);
        let summary = apply_patches(&src, &patches, 0).unwrap();
        assert_eq!(summary.deleted, vec![PathBuf::from("list.txt")]);
        assert!(!src.join("list.txt").exists());
    }

    #[test]
    fn test_missing_patch_file() {
        let dir = TempDir::new().unwrap();
        let patches = vec![PlannedPatch {
            name: "gone.patch".to_string(),
            path: dir.path().join("gone.patch"),
        }];
        let err = apply_patches(dir.path(), &patches, 1).unwrap_err();
        assert!(matches!(err, Error::PatchApply { .. }));
    }

    #[test]
    fn test_split_patch_handles_blank_context() {
        let patch = "--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n a\n\n-b\n+c\n";
        let files = split_patch(patch.as_bytes()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].text.ends_with(b" a\n \n-b\n+c\n"));
    }

    #[test]
    fn test_split_patch_errors() {
        assert!(split_patch(b"just some text\n").is_err());
        assert!(split_patch(b"--- a/f\n+++ b/f\n").is_err());
        assert!(split_patch(b"--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n a\n").is_err());
    }

    #[test]
    fn test_strip_path() {
        assert_eq!(strip_path("a/src/x.c", 1).unwrap(), PathBuf::from("src/x.c"));
        assert_eq!(strip_path("x.c", 0).unwrap(), PathBuf::from("x.c"));
        assert!(strip_path("x.c", 1).is_err());
        assert!(strip_path("a/../../etc/passwd", 1).is_err());
    }

    #[test]
    fn test_parse_hunk_header() {
        assert_eq!(parse_hunk_header(b"@@ -1,4 +1,5 @@"), Some((1, 4, 1, 5)));
        assert_eq!(parse_hunk_header(b"@@ -3 +3 @@ fn main()"), Some((3, 1, 3, 1)));
        assert_eq!(parse_hunk_header(b"@@ garbage @@"), None);
    }
}
