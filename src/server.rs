use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as AnyhowContext;
use axum::{
    debug_handler,
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    acquire::{Acquirer, YtDlpExtractor},
    cli::CliArgs,
    error::{Result, ServiceError},
    model,
    rubric::VideoType,
    scorer::{self, ScoreRequest, ScoringPolicy},
    session::HttpSession,
    util::decode_base64_payload,
};

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
const MISSING_SCORE_FIELDS: &str = "Il manque la frame ou la clé API";
const MISSING_URL: &str = "URL manquante";

#[derive(Clone)]
pub struct ServerState {
    session: HttpSession,
    default_model: String,
    policy: ScoringPolicy,
    acquirer: Acquirer,
}

impl ServerState {
    pub fn new(
        session: HttpSession,
        default_model: String,
        policy: ScoringPolicy,
        acquirer: Acquirer,
    ) -> Self {
        Self {
            session,
            default_model,
            policy,
            acquirer,
        }
    }
}

type SharedState = ServerState;

pub async fn run_server(args: &CliArgs) -> Result<()> {
    let listen = args
        .listen
        .clone()
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned());
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("parsing listen address `{listen}`"))?;

    let session = HttpSession::new(&args.session_config())?;
    let extractor = YtDlpExtractor::new(args.yt_dlp.clone(), args.format.clone());
    let acquirer = Acquirer::new(Arc::new(extractor), args.acquire_config());
    tracing::info!(
        provider = %session.base_url(),
        download_dir = %acquirer.config().download_dir.display(),
        max_duration_secs = acquirer.config().max_duration_secs,
        "highlight service configured"
    );

    let state = ServerState::new(session, args.model.clone(), args.scoring_policy(), acquirer);
    let router = build_router(state, args.body_limit_bytes());

    let listener = TcpListener::bind(addr)
        .await
        .context("binding highlight service address")?;
    println!(
        "Highlight service listening on http://{}",
        listener.local_addr().unwrap_or(addr)
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::warn!("failed to listen for shutdown signal: {err:?}");
            }
            println!("Shutdown signal received; stopping server…");
        })
        .await
        .context("running highlight service")?;

    Ok(())
}

pub fn build_router(state: ServerState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS, Method::GET])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/api/analyze", post(analyze_frame).options(preflight))
        .route(
            "/api/download_youtube",
            post(download_video).options(preflight),
        )
        .route("/api/models", get(list_models))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                error: message.into(),
            },
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!("internal server error: {message}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidRequest(_) | ServiceError::DurationExceeded { .. } => {
                Self::bad_request(err.to_string())
            }
            ServiceError::Upstream(_) | ServiceError::NotFound(_) => Self::internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn list_models(State(state): State<SharedState>) -> Response {
    Json(json!({
        "object": "list",
        "data": model::MODELS,
        "default": state.default_model,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    frame: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    video_type: Option<String>,
}

#[debug_handler]
async fn analyze_frame(
    State(state): State<SharedState>,
    payload: std::result::Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    match analyze_frame_inner(&state, payload).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn analyze_frame_inner(
    state: &ServerState,
    payload: std::result::Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult<scorer::FrameScore> {
    let Json(request) = payload?;

    let (frame, api_key) = match (non_empty(&request.frame), non_empty(&request.api_key)) {
        (Some(frame), Some(api_key)) => (frame, api_key),
        _ => return Err(ApiError::bad_request(MISSING_SCORE_FIELDS)),
    };
    let frame = decode_base64_payload(frame)
        .map_err(|err| ApiError::bad_request(format!("frame is not valid base64: {err}")))?;

    let score_request = ScoreRequest {
        frame: &frame,
        credential: api_key,
        model_id: model::resolve_model_id(request.model.as_deref(), &state.default_model),
        video_type: VideoType::from_tag(request.video_type.as_deref()),
    };

    Ok(scorer::score_frame(&state.session, &score_request, &state.policy).await?)
}

#[derive(Debug, Deserialize)]
struct DownloadRequest {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct DownloadResponse {
    video_base64: String,
    title: String,
    duration: u64,
    size: u64,
}

#[debug_handler]
async fn download_video(
    State(state): State<SharedState>,
    payload: std::result::Result<Json<DownloadRequest>, JsonRejection>,
) -> Response {
    match download_video_inner(&state, payload).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn download_video_inner(
    state: &ServerState,
    payload: std::result::Result<Json<DownloadRequest>, JsonRejection>,
) -> ApiResult<DownloadResponse> {
    let Json(request) = payload?;
    let url = non_empty(&request.url).ok_or_else(|| ApiError::bad_request(MISSING_URL))?;

    let video = state.acquirer.acquire(url).await?;

    Ok(DownloadResponse {
        video_base64: BASE64_STANDARD.encode(&video.payload),
        title: video.title,
        duration: video.duration_seconds,
        size: video.size_bytes,
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::{AcquireConfig, MediaExtractor, MediaInfo};
    use crate::session::SessionConfig;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use httpmock::prelude::*;
    use serde_json::Value;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    struct StubExtractor {
        duration: f64,
        probe_error: Option<&'static str>,
        download_error: Option<&'static str>,
        downloads: AtomicUsize,
    }

    #[async_trait]
    impl MediaExtractor for StubExtractor {
        async fn probe(&self, _url: &str) -> Result<MediaInfo> {
            if let Some(message) = self.probe_error {
                return Err(anyhow::anyhow!(message));
            }
            Ok(MediaInfo {
                id: Some("clip".to_owned()),
                title: None,
                duration: Some(self.duration),
            })
        }

        async fn download(&self, _url: &str, dir: &Path, stem: &str) -> Result<()> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = self.download_error {
                std::fs::write(dir.join(format!("{stem}.webm.part")), b"hel")?;
                return Err(anyhow::anyhow!(message));
            }
            std::fs::write(dir.join(format!("{stem}.webm")), b"hello")?;
            Ok(())
        }
    }

    struct Harness {
        router: Router,
        extractor: Arc<StubExtractor>,
        download_dir: tempfile::TempDir,
    }

    fn harness(api_base: String, duration: f64) -> Harness {
        harness_with(
            api_base,
            StubExtractor {
                duration,
                probe_error: None,
                download_error: None,
                downloads: AtomicUsize::new(0),
            },
        )
    }

    fn harness_with(api_base: String, extractor: StubExtractor) -> Harness {
        let dir = tempfile::TempDir::new().unwrap();
        let extractor = Arc::new(extractor);
        let acquirer = Acquirer::new(
            extractor.clone(),
            AcquireConfig {
                download_dir: dir.path().to_path_buf(),
                max_duration_secs: 1200,
            },
        );
        let session =
            HttpSession::new(&SessionConfig::new(api_base, Duration::from_secs(5))).unwrap();
        let state = ServerState::new(
            session,
            model::DEFAULT_MODEL_ID.to_owned(),
            ScoringPolicy::default(),
            acquirer,
        );
        Harness {
            router: build_router(state, 1024 * 1024),
            extractor,
            download_dir: dir,
        }
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ORIGIN, "https://frontend.example")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn allow_origin(response: &Response) -> Option<&str> {
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|value| value.to_str().ok())
    }

    #[tokio::test]
    async fn analyze_returns_parsed_score() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/messages")
                    .header("x-api-key", "sk-x")
                    .body_contains("Tu analyses une vidéo de sport.");
                then.status(200).json_body(json!({
                    "content": [
                        { "type": "text", "text": "Score: 8/10\nDescription: A last-second goal." }
                    ]
                }));
            })
            .await;

        let app = harness(server.base_url(), 10.0);
        let response = app
            .router
            .oneshot(post_json(
                "/api/analyze",
                json!({
                    "frame": BASE64_STANDARD.encode(b"jpeg"),
                    "api_key": "sk-x",
                    "video_type": "sport"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(allow_origin(&response), Some("*"));
        assert_eq!(
            read_json(response).await,
            json!({
                "score": 8,
                "description": "A last-second goal.",
                "raw": "Score: 8/10\nDescription: A last-second goal."
            })
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn analyze_without_api_key_is_rejected_locally() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/messages");
                then.status(200);
            })
            .await;

        let app = harness(server.base_url(), 10.0);
        let response = app
            .router
            .oneshot(post_json(
                "/api/analyze",
                json!({ "frame": BASE64_STANDARD.encode(b"jpeg") }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(allow_origin(&response), Some("*"));
        assert_eq!(
            read_json(response).await,
            json!({ "error": MISSING_SCORE_FIELDS })
        );
        assert_eq!(mock.hits_async().await, 0);
    }

    #[tokio::test]
    async fn analyze_surfaces_provider_failure_as_500() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/messages");
                then.status(529).body("overloaded");
            })
            .await;

        let app = harness(server.base_url(), 10.0);
        let response = app
            .router
            .oneshot(post_json(
                "/api/analyze",
                json!({ "frame": BASE64_STANDARD.encode(b"jpeg"), "api_key": "sk-x" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("overloaded"));
    }

    #[tokio::test]
    async fn download_rejects_long_video_with_minutes() {
        let app = harness("http://127.0.0.1:9".to_owned(), 1500.0);
        let response = app
            .router
            .oneshot(post_json(
                "/api/download_youtube",
                json!({ "url": "https://example.com/v" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_json(response).await,
            json!({ "error": "Vidéo trop longue (25 min). Maximum : 20 minutes." })
        );
        assert_eq!(app.extractor.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn download_returns_encoded_video() {
        let app = harness("http://127.0.0.1:9".to_owned(), 95.0);
        let response = app
            .router
            .oneshot(post_json(
                "/api/download_youtube",
                json!({ "url": "https://example.com/v" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            read_json(response).await,
            json!({
                "video_base64": BASE64_STANDARD.encode(b"hello"),
                "title": "video",
                "duration": 95,
                "size": 5
            })
        );
    }

    fn failing_extractor(
        probe_error: Option<&'static str>,
        download_error: Option<&'static str>,
    ) -> StubExtractor {
        StubExtractor {
            duration: 60.0,
            probe_error,
            download_error,
            downloads: AtomicUsize::new(0),
        }
    }

    fn download_dir_entries(app: &Harness) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(app.download_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[tokio::test]
    async fn download_metadata_failure_is_500_with_extractor_text() {
        let message = "ERROR: [youtube] abc123: Video unavailable";
        let app = harness_with(
            "http://127.0.0.1:9".to_owned(),
            failing_extractor(Some(message), None),
        );
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/api/download_youtube",
                json!({ "url": "https://example.com/v" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(allow_origin(&response), Some("*"));
        assert_eq!(read_json(response).await, json!({ "error": message }));
        assert_eq!(app.extractor.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn download_failure_is_500_and_leaves_nothing_behind() {
        let message = "ERROR: unable to download video data: HTTP Error 403: Forbidden";
        let app = harness_with(
            "http://127.0.0.1:9".to_owned(),
            failing_extractor(None, Some(message)),
        );
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/api/download_youtube",
                json!({ "url": "https://example.com/v" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await, json!({ "error": message }));
        assert_eq!(app.extractor.downloads.load(Ordering::SeqCst), 1);
        assert!(download_dir_entries(&app).is_empty());
    }

    #[tokio::test]
    async fn download_without_url_is_bad_request() {
        let app = harness("http://127.0.0.1:9".to_owned(), 10.0);
        let response = app
            .router
            .oneshot(post_json("/api/download_youtube", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await, json!({ "error": MISSING_URL }));
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let app = harness("http://127.0.0.1:9".to_owned(), 10.0);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn preflight_is_permissive() {
        let app = harness("http://127.0.0.1:9".to_owned(), 10.0);
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/analyze")
            .header(header::ORIGIN, "https://frontend.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(allow_origin(&response), Some("*"));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn bare_options_request_succeeds() {
        let app = harness("http://127.0.0.1:9".to_owned(), 10.0);
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/download_youtube")
            .body(Body::empty())
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn lists_model_catalog() {
        let app = harness("http://127.0.0.1:9".to_owned(), 10.0);
        let request = Request::builder()
            .uri("/api/models")
            .body(Body::empty())
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();
        let body = read_json(response).await;
        assert_eq!(body["default"], json!(model::DEFAULT_MODEL_ID));
        assert_eq!(body["data"].as_array().unwrap().len(), model::MODELS.len());
    }
}
