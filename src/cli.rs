use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::acquire::{self, AcquireConfig};
use crate::model;
use crate::rubric::VideoType;
use crate::scorer::{self, ScoringPolicy};
use crate::session::{self, SessionConfig};

/// Command-line options for the highlight scout.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Video highlight acquisition and frame scoring", long_about = None)]
pub struct CliArgs {
    /// Run the HTTP service instead of a one-shot command.
    #[arg(long = "serve", action = ArgAction::SetTrue)]
    pub serve: bool,

    /// Listen address for the HTTP service (requires `--serve`).
    #[arg(long = "listen", value_name = "ADDR", requires = "serve")]
    pub listen: Option<String>,

    /// Provider API key used by one-shot frame scoring. The service takes keys per request.
    #[arg(long = "api-key", env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the inference provider.
    #[arg(long = "api-base", env = "HIGHLIGHT_SCOUT_API_BASE", default_value = session::DEFAULT_API_BASE)]
    pub api_base: String,

    /// Model identifier used when a request does not name one.
    #[arg(
        long = "model",
        default_value = model::DEFAULT_MODEL_ID,
        value_parser = model::model_value_parser()
    )]
    pub model: String,

    /// Rubric for one-shot frame scoring.
    #[arg(long = "video-type", value_enum, default_value_t = VideoType::Gaming)]
    pub video_type: VideoType,

    /// Upper bound on the length of each model reply.
    #[arg(long = "max-tokens", default_value_t = scorer::DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Score assigned when a reply carries no usable score.
    #[arg(long = "default-score", default_value_t = scorer::DEFAULT_SCORE, allow_negative_numbers = true)]
    default_score: i64,

    /// Longest source video accepted, in seconds.
    #[arg(long = "max-duration", env = "HIGHLIGHT_SCOUT_MAX_DURATION", default_value_t = acquire::DEFAULT_MAX_DURATION_SECS)]
    max_duration_secs: u64,

    /// Directory for transient downloads (defaults to the system temp dir).
    #[arg(long = "download-dir", value_name = "PATH", env = "HIGHLIGHT_SCOUT_DOWNLOAD_DIR")]
    download_dir: Option<PathBuf>,

    /// Path to the yt-dlp executable.
    #[arg(long = "yt-dlp", value_name = "PATH", env = "HIGHLIGHT_SCOUT_YT_DLP", default_value = acquire::DEFAULT_YT_DLP)]
    pub yt_dlp: PathBuf,

    /// yt-dlp format selector for downloads.
    #[arg(long = "format", default_value = acquire::DEFAULT_FORMAT)]
    pub format: String,

    /// Network timeout (seconds) applied to model requests.
    #[arg(long = "timeout", default_value_t = 120, value_parser = clap::value_parser!(u64).range(1..=600))]
    timeout_secs: u64,

    /// Maximum HTTP request body size in megabytes.
    #[arg(long = "body-limit-mb", default_value_t = 25, value_parser = clap::value_parser!(u64).range(1..=1024))]
    body_limit_mb: u64,

    /// JPEG frame to score; repeat to score several and rank them.
    #[arg(long = "frame", value_name = "PATH", conflicts_with_all = ["serve", "acquire"])]
    pub frames: Vec<PathBuf>,

    /// Minimum score for a frame to count as a highlight.
    #[arg(long = "min-score", default_value_t = 7, allow_negative_numbers = true)]
    pub min_score: i64,

    /// Download the video at this URL instead of scoring frames.
    #[arg(long = "acquire", value_name = "URL", conflicts_with = "serve")]
    pub acquire: Option<String>,

    /// Where to write the acquired video (defaults to `video.<container>`).
    #[arg(long = "output", value_name = "PATH", requires = "acquire")]
    pub output: Option<PathBuf>,
}

impl CliArgs {
    /// Returns the configured network timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn body_limit_bytes(&self) -> usize {
        (self.body_limit_mb as usize) * 1024 * 1024
    }

    /// Convert CLI arguments into a provider session configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.api_base.clone(), self.timeout())
    }

    pub fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            default_score: self.default_score,
            max_tokens: self.max_tokens,
        }
    }

    pub fn acquire_config(&self) -> AcquireConfig {
        AcquireConfig {
            download_dir: self
                .download_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            max_duration_secs: self.max_duration_secs,
        }
    }
}
