// src/recipe/kitchen/archive.rs

//! Source archive download, verification and extraction

use crate::error::{Error, Result};
use crate::hash::{self, Sha256Digest};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::config::KitchenConfig;

/// Retry delay in milliseconds (multiplied by the attempt number)
const RETRY_DELAY_MS: u64 = 1000;

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Supported source archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    TarXz,
    TarZst,
}

impl ArchiveFormat {
    /// Detect the format from an archive file name
    pub fn from_filename(name: &str) -> Option<Self> {
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            Some(Self::TarZst)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::TarXz => "tar.xz",
            Self::TarZst => "tar.zst",
        }
    }

    fn decoder<'a, R: Read + 'a>(&self, reader: R) -> Result<Box<dyn Read + 'a>> {
        match self {
            Self::Tar => Ok(Box::new(reader)),
            Self::TarGz => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
            Self::TarXz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
            Self::TarZst => {
                let decoder = zstd::Decoder::new(reader).map_err(|e| {
                    Error::IoError(format!("Failed to create zstd decoder: {}", e))
                })?;
                Ok(Box::new(decoder))
            }
        }
    }
}

/// Check a file against its expected digest
pub fn verify_file(path: &Path, expected: &Sha256Digest, label: &str) -> Result<()> {
    let actual = hash::hash_file(path)?;
    if &actual != expected {
        return Err(Error::DigestMismatch {
            file: label.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    debug!("Verified {} (sha256:{})", label, actual.short());
    Ok(())
}

/// Downloads source archives over HTTP(S) or from `file://` URLs
pub struct Downloader {
    client: Client,
    retries: u32,
    progress: bool,
}

impl Downloader {
    pub fn new(config: &KitchenConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retries: config.retries.max(1),
            progress: config.progress,
        })
    }

    /// Download a URL to `dest`, returning the number of bytes written
    pub fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::DownloadError(format!("Invalid URL {}: {}", url, e)))?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        match parsed.scheme() {
            "file" => copy_local(&parsed, dest),
            "http" | "https" => self.download_http(url, dest),
            other => Err(Error::DownloadError(format!(
                "Unsupported URL scheme `{}` in {}",
                other, url
            ))),
        }
    }

    fn download_http(&self, url: &str, dest: &Path) -> Result<u64> {
        info!("Downloading {}", url);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_download(url, dest) {
                Ok(bytes) => {
                    info!("Downloaded {} bytes to {}", bytes, dest.display());
                    return Ok(bytes);
                }
                Err(Transfer::Fatal(e)) => return Err(e),
                Err(Transfer::Retryable(e)) => {
                    if attempt >= self.retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to download {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    fn try_download(&self, url: &str, dest: &Path) -> std::result::Result<u64, Transfer> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Transfer::Retryable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Transfer::Retryable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(Transfer::Fatal(Error::DownloadError(format!(
                "HTTP {} from {}",
                status, url
            ))));
        }

        let total_size = response.content_length().unwrap_or(0);
        let mut file = File::create(dest).map_err(|e| {
            Transfer::Fatal(Error::IoError(format!(
                "Failed to create {}: {}",
                dest.display(),
                e
            )))
        })?;

        let progress = self.progress.then(|| download_bar(url, total_size));
        let result = stream_to_file(response, &mut file, progress.as_ref());
        if let Some(pb) = &progress {
            pb.finish_and_clear();
        }
        result
    }
}

/// Outcome of a single transfer attempt
enum Transfer {
    Retryable(String),
    Fatal(Error),
}

fn download_bar(url: &str, total_size: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_size);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    let name = url.rsplit('/').next().unwrap_or(url);
    pb.set_message(name.to_string());
    pb
}

fn stream_to_file(
    mut response: reqwest::blocking::Response,
    file: &mut File,
    progress: Option<&ProgressBar>,
) -> std::result::Result<u64, Transfer> {
    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];

    loop {
        let n = response
            .read(&mut buffer)
            .map_err(|e| Transfer::Retryable(format!("Failed to read response: {}", e)))?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n]).map_err(|e| {
            Transfer::Fatal(Error::IoError(format!("Failed to write data: {}", e)))
        })?;
        downloaded += n as u64;
        if let Some(pb) = progress {
            pb.set_position(downloaded);
        }
    }

    Ok(downloaded)
}

fn copy_local(url: &Url, dest: &Path) -> Result<u64> {
    let path = url
        .to_file_path()
        .map_err(|_| Error::DownloadError(format!("Invalid file URL: {}", url)))?;
    debug!("Copying local source {}", path.display());

    fs::copy(&path, dest).map_err(|e| {
        Error::DownloadError(format!("Failed to read {}: {}", path.display(), e))
    })
}

/// Extract an archive into `dest`
///
/// Every entry must stay inside `dest`: absolute paths and `..` components
/// are rejected before anything is written for that entry.
pub fn extract_archive(archive: &Path, format: ArchiveFormat, dest: &Path) -> Result<usize> {
    fs::create_dir_all(dest)?;
    let file = File::open(archive).map_err(|e| {
        Error::IoError(format!("Failed to open archive {}: {}", archive.display(), e))
    })?;
    let decoder = format.decoder(io::BufReader::new(file))?;

    let mut tar = tar::Archive::new(decoder);
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);

    let mut count = 0;
    let entries = tar
        .entries()
        .map_err(|e| Error::IoError(format!("Failed to read archive: {}", e)))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::IoError(format!("Corrupt archive entry: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| Error::IoError(format!("Invalid entry path: {}", e)))?
            .into_owned();

        if !is_contained(&path) {
            return Err(Error::IoError(format!(
                "Archive entry escapes extraction directory: {}",
                path.display()
            )));
        }

        let unpacked = entry.unpack_in(dest).map_err(|e| {
            Error::IoError(format!("Failed to extract {}: {}", path.display(), e))
        })?;
        if !unpacked {
            return Err(Error::IoError(format!(
                "Archive entry escapes extraction directory: {}",
                path.display()
            )));
        }
        count += 1;
    }

    debug!("Extracted {} entries from {}", count, archive.display());
    Ok(count)
}

fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Pick the source root inside an extraction directory
///
/// Uses `extract_dir` when given, otherwise the single top-level directory
/// if there is exactly one entry, otherwise the extraction directory itself.
pub fn find_source_root(extracted: &Path, extract_dir: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = extract_dir {
        let root = extracted.join(dir);
        if !root.is_dir() {
            return Err(Error::NotFound(format!(
                "extract_dir `{}` not present in archive",
                dir
            )));
        }
        return Ok(root);
    }

    let entries: Vec<_> = fs::read_dir(extracted)?.collect::<io::Result<_>>()?;
    if let [only] = entries.as_slice()
        && only.file_type()?.is_dir()
    {
        return Ok(only.path());
    }

    Ok(extracted.to_path_buf())
}
