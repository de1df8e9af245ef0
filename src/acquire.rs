use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use tempfile::TempDir;
use tokio::process::Command;

use crate::error::{Result, ServiceError};
use crate::util::file_stem;

pub const DEFAULT_MAX_DURATION_SECS: u64 = 1200;
pub const DEFAULT_FORMAT: &str =
    "bestvideo[ext=mp4][height<=720]+bestaudio[ext=m4a]/best[ext=mp4][height<=720]/best";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";

const PRIMARY_EXTENSION: &str = "mp4";
const FALLBACK_EXTENSIONS: &[&str] = &["webm", "mkv"];
const DEFAULT_TITLE: &str = "video";
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Metadata reported by the extractor before anything is downloaded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    /// Seconds; some extractors report fractional values.
    pub duration: Option<f64>,
}

/// Probes and downloads remote media.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Fetch metadata only.
    async fn probe(&self, url: &str) -> Result<MediaInfo>;

    /// Download a rendition into `dir`, named `<stem>.<ext>` with an extension of the extractor's choosing.
    ///
    /// `dir` is private to the request and removed afterwards, along with anything else written there.
    async fn download(&self, url: &str, dir: &Path, stem: &str) -> Result<()>;
}

/// [`MediaExtractor`] backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    binary: PathBuf,
    format: String,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            format: format.into(),
        }
    }

    async fn run(&self, args: &[&str], label: &str) -> Result<Output> {
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("launching {} for {label}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{label} failed (exit code {:?}): {}",
                output.status.code(),
                stderr.trim()
            ));
        }
        Ok(output)
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn probe(&self, url: &str) -> Result<MediaInfo> {
        let output = self
            .run(
                &[
                    "--dump-single-json",
                    "--skip-download",
                    "--no-playlist",
                    "--no-warnings",
                    "--user-agent",
                    BROWSER_UA,
                    "--",
                    url,
                ],
                "metadata probe",
            )
            .await?;
        serde_json::from_slice(&output.stdout).context("parsing yt-dlp metadata")
    }

    async fn download(&self, url: &str, dir: &Path, stem: &str) -> Result<()> {
        let template = dir.join(format!("{stem}.%(ext)s"));
        let template = template.to_string_lossy();
        self.run(
            &[
                "--format",
                self.format.as_str(),
                "--output",
                template.as_ref(),
                "--no-playlist",
                "--quiet",
                "--no-warnings",
                "--no-progress",
                "--user-agent",
                BROWSER_UA,
                "--",
                url,
            ],
            "download",
        )
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AcquireConfig {
    pub download_dir: PathBuf,
    pub max_duration_secs: u64,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            download_dir: std::env::temp_dir(),
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }
}

/// A downloaded video held in memory.
#[derive(Debug, Clone)]
pub struct AcquiredVideo {
    pub payload: Vec<u8>,
    pub title: String,
    pub duration_seconds: u64,
    pub size_bytes: u64,
    /// Container extension of the artifact the payload was read from.
    pub container: String,
}

/// Fetches source videos under the configured duration ceiling.
#[derive(Clone)]
pub struct Acquirer {
    extractor: Arc<dyn MediaExtractor>,
    config: AcquireConfig,
}

impl Acquirer {
    pub fn new(extractor: Arc<dyn MediaExtractor>, config: AcquireConfig) -> Self {
        Self { extractor, config }
    }

    pub fn config(&self) -> &AcquireConfig {
        &self.config
    }

    /// Probe, check the ceiling, download, then read the artifact into memory.
    pub async fn acquire(&self, source_url: &str) -> Result<AcquiredVideo, ServiceError> {
        let source_url = source_url.trim();
        if source_url.is_empty() {
            return Err(ServiceError::InvalidRequest("URL manquante".to_owned()));
        }

        let info = self
            .extractor
            .probe(source_url)
            .await
            .map_err(ServiceError::upstream)?;

        let duration = info.duration.unwrap_or(0.0).max(0.0);
        let duration_secs = duration as u64;
        if duration > self.config.max_duration_secs as f64 {
            tracing::info!(
                url = source_url,
                duration_secs,
                limit_secs = self.config.max_duration_secs,
                "rejecting source over duration ceiling"
            );
            return Err(ServiceError::DurationExceeded {
                duration_secs,
                limit_secs: self.config.max_duration_secs,
            });
        }

        let stem = file_stem(info.id.as_deref().unwrap_or_default());
        let workspace = tempfile::Builder::new()
            .prefix(&format!("{stem}-"))
            .tempdir_in(&self.config.download_dir)
            .with_context(|| {
                format!(
                    "creating download workspace in {}",
                    self.config.download_dir.display()
                )
            })
            .map_err(ServiceError::upstream)?;

        let outcome = self.fetch_artifact(source_url, workspace.path(), &stem).await;
        release_workspace(workspace).await;
        let (payload, container) = outcome?;

        let size_bytes = payload.len() as u64;
        tracing::info!(url = source_url, duration_secs, size_bytes, "video acquired");

        Ok(AcquiredVideo {
            payload,
            title: info.title.unwrap_or_else(|| DEFAULT_TITLE.to_owned()),
            duration_seconds: duration_secs,
            size_bytes,
            container,
        })
    }

    /// Download into `dir` and read the resolved artifact, returning its bytes and extension.
    async fn fetch_artifact(
        &self,
        source_url: &str,
        dir: &Path,
        stem: &str,
    ) -> Result<(Vec<u8>, String), ServiceError> {
        self.extractor
            .download(source_url, dir, stem)
            .await
            .map_err(ServiceError::upstream)?;

        let path = resolve_artifact(dir, stem).await.ok_or_else(|| {
            ServiceError::NotFound("Fichier vidéo non trouvé après téléchargement".to_owned())
        })?;
        let payload = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading artifact {}", path.display()))
            .map_err(ServiceError::upstream)?;
        let container = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or(PRIMARY_EXTENSION)
            .to_owned();
        Ok((payload, container))
    }
}

/// First existing `<dir>/<stem>.<ext>`, canonical extension first.
async fn resolve_artifact(dir: &Path, stem: &str) -> Option<PathBuf> {
    for ext in std::iter::once(PRIMARY_EXTENSION).chain(FALLBACK_EXTENSIONS.iter().copied()) {
        let path = dir.join(format!("{stem}.{ext}"));
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Some(path);
        }
    }
    None
}

/// Removes the per-request download directory and everything the extractor left in it.
async fn release_workspace(workspace: TempDir) {
    let path = workspace.path().to_path_buf();
    let removal = tokio::task::spawn_blocking(move || workspace.close()).await;
    match removal {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!("failed to remove workspace {}: {err}", path.display()),
        Err(err) => tracing::warn!("workspace cleanup task for {} failed: {err}", path.display()),
    }
}
