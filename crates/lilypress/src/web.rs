//! HTTP API.
//!
//! Conversions return both artifacts inline (base64) and a download URL
//! under `/artifacts`, which streams straight from the cache directory.

use crate::DEFAULT_BASE_NAME;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use engrave::{templates, Artifact, Converter, EngraveError, ExecutableLocation};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

/// Shared state for web handlers
#[derive(Clone)]
pub struct WebState {
    pub converter: Converter,
    /// `None` when LilyPond could not be found; conversions then fail with 503.
    pub lilypond: Option<ExecutableLocation>,
    pub start_time: Instant,
}

impl WebState {
    pub fn new(converter: Converter, lilypond: Option<ExecutableLocation>) -> Self {
        Self {
            converter,
            lilypond,
            start_time: Instant::now(),
        }
    }
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(serve_root))
        .route("/health", get(health))
        .route("/templates", get(list_templates))
        .route("/templates/{name}", get(get_template))
        .route("/title", post(title))
        .route("/convert", post(convert))
        .route("/artifacts/{filename}", get(download_artifact))
        .route("/midi-to-ly", post(midi_to_ly))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP status for a failed conversion or re-encode.
pub fn status_for(err: &EngraveError) -> StatusCode {
    match err {
        EngraveError::ExecutableNotFound => StatusCode::SERVICE_UNAVAILABLE,
        EngraveError::BaseNameBusy(_) => StatusCode::CONFLICT,
        EngraveError::InvalidBaseName(_) => StatusCode::BAD_REQUEST,
        EngraveError::ExternalTool { .. }
        | EngraveError::MissingOutputArtifact
        | EngraveError::MalformedScoreInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngraveError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        EngraveError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: &EngraveError) -> Response {
    let body = serde_json::json!({
        "status": "failure",
        "kind": err.kind(),
        "message": err.to_string(),
    });
    (status_for(err), Json(body)).into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    let body = serde_json::json!({
        "status": "failure",
        "kind": "bad_request",
        "message": message.into(),
    });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

/// Serve root discovery endpoint
async fn serve_root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "lilypress",
        "version": env!("CARGO_PKG_VERSION"),
        "links": {
            "health": "/health",
            "templates": "/templates",
            "title": "/title",
            "convert": "/convert",
            "artifacts": "/artifacts/{filename}",
            "midi_to_ly": "/midi-to-ly",
        }
    }))
}

async fn health(State(state): State<WebState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "lilypond": state.lilypond,
        "cache_dir": state.converter.cache().dir(),
    }))
}

async fn list_templates() -> impl IntoResponse {
    Json(serde_json::json!({ "templates": templates::names() }))
}

async fn get_template(Path(name): Path<String>) -> Response {
    match templates::get(&name) {
        Some(source) => (
            [(header::CONTENT_TYPE, "text/x-lilypond; charset=utf-8")],
            source,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct TitleRequest {
    source: String,
}

#[derive(Debug, Serialize)]
struct TitleResponse {
    title: Option<String>,
    suggested_name: String,
}

async fn title(Json(request): Json<TitleRequest>) -> Json<TitleResponse> {
    Json(TitleResponse {
        title: engrave::extract_title(&request.source),
        suggested_name: engrave::suggest_base_name(&request.source, DEFAULT_BASE_NAME),
    })
}

#[derive(Debug, Deserialize)]
struct ConvertRequest {
    source: String,
    #[serde(default)]
    output_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct ArtifactResponse {
    filename: String,
    size: usize,
    url: String,
    base64: String,
}

impl From<&Artifact> for ArtifactResponse {
    fn from(artifact: &Artifact) -> Self {
        Self {
            filename: artifact.filename.clone(),
            size: artifact.bytes.len(),
            url: format!("/artifacts/{}", artifact.filename),
            base64: base64::engine::general_purpose::STANDARD.encode(&artifact.bytes),
        }
    }
}

#[tracing::instrument(name = "http.convert", skip(state, request), fields(source_len = request.source.len()))]
async fn convert(State(state): State<WebState>, Json(request): Json<ConvertRequest>) -> Response {
    let Some(lilypond) = &state.lilypond else {
        return failure(&EngraveError::ExecutableNotFound);
    };

    let base = match request.output_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => engrave::suggest_base_name(&request.source, DEFAULT_BASE_NAME),
    };

    match state
        .converter
        .try_convert(&request.source, &base, lilypond.path())
        .await
    {
        Ok(artifacts) => Json(serde_json::json!({
            "status": "success",
            "pdf": ArtifactResponse::from(&artifacts.pdf),
            "midi": artifacts.midi.as_ref().map(ArtifactResponse::from),
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(kind = e.kind(), "conversion failed: {}", e);
            failure(&e)
        }
    }
}

fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "pdf" => "application/pdf",
        Some(ext) if ext == "midi" || ext == "mid" => "audio/midi",
        _ => "application/octet-stream",
    }
}

async fn download_artifact(State(state): State<WebState>, Path(filename): Path<String>) -> Response {
    let Some(path) = state.converter.cache().path_for(&filename) else {
        return bad_request(format!("invalid artifact name {:?}", filename));
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            tracing::error!("Failed to open {}: {}", path.display(), e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&filename))
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", filename.replace('"', "_")),
        )
        .body(body)
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
        .unwrap_or_else(|status| status.into_response())
}

fn default_title() -> String {
    "Untitled".to_string()
}

fn default_composer() -> String {
    "Unknown".to_string()
}

fn default_enhance() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct MidiToLyRequest {
    midi_base64: String,
    #[serde(default = "default_title")]
    title: String,
    #[serde(default = "default_composer")]
    composer: String,
    #[serde(default = "default_enhance")]
    enhance: bool,
}

async fn midi_to_ly(Json(request): Json<MidiToLyRequest>) -> Response {
    let midi = match base64::engine::general_purpose::STANDARD.decode(request.midi_base64.trim()) {
        Ok(bytes) => bytes,
        Err(e) => return bad_request(format!("midi_base64 is not valid base64: {}", e)),
    };

    // Re-encoding is CPU-bound, keep it off the async workers
    let encoded = tokio::task::spawn_blocking(move || {
        engrave::midi_to_notation(&midi, &request.title, &request.composer, request.enhance)
    })
    .await;

    match encoded {
        Ok(Ok(source)) => Json(serde_json::json!({ "source": source })).into_response(),
        Ok(Err(e)) => {
            tracing::warn!(kind = e.kind(), "re-encode failed: {}", e);
            failure(&e)
        }
        Err(e) => {
            tracing::error!("Re-encode task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
