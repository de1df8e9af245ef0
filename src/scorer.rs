use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ServiceError;
use crate::rubric::VideoType;
use crate::session::HttpSession;

pub const DEFAULT_SCORE: i64 = 5;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

const FRAME_MEDIA_TYPE: &str = "image/jpeg";
const SCORE_MARKER: &str = "Score:";
const DESCRIPTION_MARKER: &str = "Description:";
const MAX_ERROR_BODY_CHARS: usize = 5000;

/// Tunables applied to every scoring call.
#[derive(Debug, Clone, Copy)]
pub struct ScoringPolicy {
    pub default_score: i64,
    pub max_tokens: u32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            default_score: DEFAULT_SCORE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// One frame to evaluate, with the caller's own credential.
#[derive(Debug, Clone, Copy)]
pub struct ScoreRequest<'a> {
    pub frame: &'a [u8],
    pub credential: &'a str,
    pub model_id: &'a str,
    pub video_type: VideoType,
}

/// Parsed model verdict for a frame. `raw` is the untouched model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameScore {
    pub score: i64,
    pub description: String,
    pub raw: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// Ask the vision model to rate a single frame.
///
/// Format drift in the reply never fails the call; only transport and
/// provider errors do.
pub async fn score_frame(
    session: &HttpSession,
    request: &ScoreRequest<'_>,
    policy: &ScoringPolicy,
) -> Result<FrameScore, ServiceError> {
    if request.frame.is_empty() || request.credential.trim().is_empty() {
        return Err(ServiceError::InvalidRequest(
            "Il manque la frame ou la clé API".to_owned(),
        ));
    }

    let raw = request_analysis(session, request, policy)
        .await
        .map_err(ServiceError::upstream)?;
    let result = parse_analysis(&raw, policy.default_score);

    tracing::info!(
        model = request.model_id,
        video_type = request.video_type.as_str(),
        score = result.score,
        "frame scored"
    );
    Ok(result)
}

async fn request_analysis(
    session: &HttpSession,
    request: &ScoreRequest<'_>,
    policy: &ScoringPolicy,
) -> anyhow::Result<String> {
    let url = session.messages_url()?;
    let payload = build_analysis_payload(request, policy.max_tokens);

    let response = session
        .client()
        .post(url)
        .header("x-api-key", request.credential)
        .json(&payload)
        .send()
        .await
        .context("sending analysis request")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let truncated = body.chars().take(MAX_ERROR_BODY_CHARS).collect::<String>();
        tracing::warn!(
            status = status.as_u16(),
            body_len = body.len(),
            "provider rejected analysis request"
        );
        anyhow::bail!("provider error (status {}): {}", status.as_u16(), truncated);
    }

    let reply: MessagesResponse = response
        .json()
        .await
        .context("parsing analysis response")?;

    reply
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .find_map(|block| block.text)
        .context("analysis response contained no text content")
}

fn build_analysis_payload(request: &ScoreRequest<'_>, max_tokens: u32) -> serde_json::Value {
    json!({
        "model": request.model_id,
        "max_tokens": max_tokens,
        "messages": [
            {
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": FRAME_MEDIA_TYPE,
                            "data": BASE64_STANDARD.encode(request.frame),
                        }
                    },
                    {
                        "type": "text",
                        "text": request.video_type.rubric(),
                    }
                ]
            }
        ],
    })
}

/// Turn free-form model output into a score and a description.
///
/// Each extraction step is independent and falls back to its default.
pub fn parse_analysis(raw: &str, default_score: i64) -> FrameScore {
    let score = extract_score(raw).unwrap_or(default_score);
    let description = extract_description(raw).unwrap_or_else(|| raw.to_owned());

    FrameScore {
        score,
        description,
        raw: raw.to_owned(),
    }
}

fn extract_score(raw: &str) -> Option<i64> {
    let line = raw.split('\n').find(|line| line.contains(SCORE_MARKER))?;
    let (before_slash, _) = line.split_once('/')?;
    let value = before_slash.split(':').nth(1)?;
    value.trim().parse().ok()
}

fn extract_description(raw: &str) -> Option<String> {
    let segment = raw.split(DESCRIPTION_MARKER).nth(1)?;
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}
