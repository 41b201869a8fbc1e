// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use pantry::hash::sha256_bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One file in a fixture source tree: (path, contents, mode)
pub type FixtureFile<'a> = (&'a str, &'a str, u32);

/// A configure script that records its arguments
pub const RECORDING_CONFIGURE: &str = "#!/bin/sh\necho \"$@\" > configure.args\n";

/// The default fixture tree for `demo-1.0`
pub fn demo_tree() -> Vec<FixtureFile<'static>> {
    vec![
        ("demo-1.0/configure", RECORDING_CONFIGURE, 0o755),
        ("demo-1.0/greeting.txt", "hello\nfrom\ndemo\n", 0o644),
        ("demo-1.0/README", "demo project\n", 0o644),
    ]
}

fn tar_bytes(files: &[FixtureFile<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data, mode) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        header.set_mtime(1_700_000_000);
        header.set_cksum();
        builder.append_data(&mut header, path, data.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Build a `.tar.gz` archive in memory
pub fn tar_gz(files: &[FixtureFile<'_>]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar_bytes(files)).unwrap();
    encoder.finish().unwrap()
}

/// Build a `.tar.xz` archive in memory
pub fn tar_xz(files: &[FixtureFile<'_>]) -> Vec<u8> {
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    encoder.write_all(&tar_bytes(files)).unwrap();
    encoder.finish().unwrap()
}

/// A scratch area for one test: a mirror directory serving archives over
/// `file://`, plus recipe, patch, work, cache and staging directories.
pub struct TestBed {
    pub root: TempDir,
}

impl TestBed {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        for dir in ["mirror", "recipes/patches", "work", "cache"] {
            std::fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        Self { root }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    pub fn mirror(&self) -> PathBuf {
        self.path("mirror")
    }

    pub fn patch_dir(&self) -> PathBuf {
        self.path("recipes/patches")
    }

    /// `file://` URL of the mirror directory, with a trailing slash
    pub fn mirror_url(&self) -> String {
        let url = url::Url::from_directory_path(self.mirror()).unwrap();
        url.to_string()
    }

    /// Put an archive on the mirror and return its SHA-256
    pub fn publish(&self, name: &str, bytes: &[u8]) -> String {
        std::fs::write(self.mirror().join(name), bytes).unwrap();
        sha256_bytes(bytes).as_str().to_string()
    }

    pub fn write_patch(&self, name: &str, content: &str) {
        std::fs::write(self.patch_dir().join(name), content).unwrap();
    }

    pub fn write_recipe(&self, file: &str, content: &str) -> PathBuf {
        let path = self.path("recipes").join(file);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// An absolute marker path outside the build directory
    pub fn marker(&self, name: &str) -> PathBuf {
        self.path(name)
    }

    /// Directories left behind under the work root (lock files aside)
    pub fn kept_build_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(self.path("work"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        dirs
    }
}

/// Stage command lists for a fixture recipe
#[derive(Debug, Default)]
pub struct Stages {
    lines: Vec<String>,
}

impl Stages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: &str, commands: &[&str]) -> Self {
        self.lines
            .push(format!("{} = [{}]\n", stage, quote_list(commands)));
        self
    }
}

/// Recipe text for the `demo` fixture with the given stage commands
pub fn demo_recipe(mirror_url: &str, sha256: &str, patches: &[&str], stages: Stages) -> String {
    let mut text = format!(
        r#"[package]
name = "demo"
version = "1.0"
summary = "Fixture package"
license = "MIT"

[source]
download_path = "{mirror_url}"
file_name = "%(name)s-%(version)s.tar.gz"
sha256 = "{sha256}"

[patches]
files = [{patches}]

[build]
config_options = ["--enable-cxx", "--with-doc=no docs"]

[stages]
"#,
        mirror_url = mirror_url,
        sha256 = sha256,
        patches = quote_list(patches)
    );
    for line in stages.lines {
        text.push_str(&line);
    }
    text
}

fn quote_list(items: &[&str]) -> String {
    items
        .iter()
        .map(|s| format!("'''{}'''", s))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read a file under a directory to a string
pub fn read(dir: &Path, rel: &str) -> String {
    std::fs::read_to_string(dir.join(rel)).unwrap()
}
