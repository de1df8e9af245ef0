use thiserror::Error;

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;

/// Failures surfaced by the scoring and acquisition operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A required field is missing or unusable.
    #[error("{0}")]
    InvalidRequest(String),

    /// The source video is longer than the configured ceiling.
    #[error(
        "Vidéo trop longue ({} min). Maximum : {} minutes.",
        .duration_secs / 60,
        .limit_secs / 60
    )]
    DurationExceeded { duration_secs: u64, limit_secs: u64 },

    /// The inference provider or the media extractor failed.
    #[error("{0}")]
    Upstream(String),

    /// Extraction reported success but left no artifact behind.
    #[error("{0}")]
    NotFound(String),
}

impl ServiceError {
    pub fn upstream(err: anyhow::Error) -> Self {
        Self::Upstream(format!("{err:#}"))
    }
}
