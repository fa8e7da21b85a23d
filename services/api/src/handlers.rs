//! Axum Handlers for the proxy routes
//!
//! Each handler resolves the provider key (request first, then server), calls
//! the upstream service and relays its answer. `utoipa` attributes generate the
//! OpenAPI document.

use axum::{
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Json, Response},
};
use base64::{Engine, prelude::BASE64_STANDARD};
use serde_json::Value;
use std::sync::Arc;
use talkbook_core::{
    provider::{Provider, SessionRequest},
    sdp::validate_offer,
    vision::strip_data_url,
};
use tracing::{error, info, instrument, warn};

use crate::{
    models::{
        CreateSessionPayload, ErrorResponse, RealtimeKeyPayload, ScrapePayload, ScrapeResponse,
        SdpPayload, TranscribePayload, TranscribeResponse,
    },
    scrape::scrape_html,
    state::AppState,
    upstream::UpstreamError,
};

pub enum ApiError {
    BadRequest(String),
    /// A failure with a status and body decided by the handler, usually relayed
    /// from the upstream service.
    Upstream(StatusCode, ErrorResponse),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
            }
            ApiError::Upstream(status, body) => (status, Json(body)).into_response(),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(message)),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Unwraps a JSON body, reporting a rejected one in the usual error shape.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e.body_text())))
}

/// The request's key when given, else the server's.
fn resolve_key(requested: Option<&str>, configured: Option<&str>) -> Option<String> {
    requested
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .or(configured)
        .map(str::to_string)
}

fn openai_key(state: &AppState, requested: Option<&str>) -> Result<String, ApiError> {
    resolve_key(requested, state.config.api_key(Provider::OpenAI))
        .ok_or_else(|| ApiError::BadRequest("OpenAI API key is required".to_string()))
}

/// Extracts `error.message` from an OpenAI error body.
fn upstream_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .pointer("/error/message")?
        .as_str()
        .map(str::to_string)
}

async fn mint_openai_session(state: &AppState, api_key: &str) -> Result<Value, ApiError> {
    let provider = Provider::OpenAI;
    let request = SessionRequest::for_provider(provider, None, None);
    state
        .upstream
        .create_session(provider, state.config.api_base(provider), api_key, &request)
        .await
        .map_err(|e| match e {
            UpstreamError::Status { status, body } => ApiError::Upstream(
                status,
                ErrorResponse::new(
                    upstream_message(&body).unwrap_or_else(|| "Failed to create session".into()),
                ),
            ),
            UpstreamError::Http(e) => e.into(),
        })
}

/// Create a realtime session with the chosen provider.
///
/// Returns the provider's session, including the ephemeral client secret.
#[utoipa::path(
    post,
    path = "/api/session",
    request_body = CreateSessionPayload,
    responses(
        (status = 200, description = "Provider session with an ephemeral client secret"),
        (status = 400, description = "Invalid body or no API key available", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateSessionPayload>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let payload = json_body(payload)?;
    let provider = payload.provider;
    info!(%provider, "Creating realtime session");

    let api_key = resolve_key(payload.api_key.as_deref(), state.config.api_key(provider))
        .ok_or_else(|| {
            warn!("{} is not set and no key was supplied", provider.api_key_var());
            ApiError::BadRequest("API key not configured".to_string())
        })?;

    let request = SessionRequest::for_provider(
        provider,
        payload.model.as_deref(),
        payload.instructions.as_deref(),
    );
    let session = state
        .upstream
        .create_session(provider, state.config.api_base(provider), &api_key, &request)
        .await
        .map_err(|e| match e {
            UpstreamError::Status { status, body } => ApiError::Upstream(
                status,
                ErrorResponse {
                    error: format!("{} API Error", provider),
                    status: Some(status.as_u16()),
                    details: Some(body),
                },
            ),
            UpstreamError::Http(e) => e.into(),
        })?;

    Ok(Json(session))
}

/// Create an OpenAI realtime session, optionally with the caller's key.
#[utoipa::path(
    post,
    path = "/api/realtime",
    request_body = RealtimeKeyPayload,
    responses(
        (status = 200, description = "OpenAI realtime session"),
        (status = 400, description = "No OpenAI key available", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn create_realtime_session(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let payload: RealtimeKeyPayload = if body.trim().is_empty() {
        RealtimeKeyPayload::default()
    } else {
        serde_json::from_str(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?
    };
    let api_key = openai_key(&state, payload.api_key.as_deref())?;
    Ok(Json(mint_openai_session(&state, &api_key).await?))
}

/// Create an OpenAI realtime session with the server's key.
#[utoipa::path(
    get,
    path = "/api/realtime/session",
    responses(
        (status = 200, description = "OpenAI realtime session"),
        (status = 400, description = "No OpenAI key configured", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn get_realtime_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let api_key = openai_key(&state, None)?;
    Ok(Json(mint_openai_session(&state, &api_key).await?))
}

/// Exchange an SDP offer for OpenAI's SDP answer.
///
/// Accepts the bare offer (`application/sdp` or `text/plain`) or the JSON form
/// `{ "sdp": "...", "apiKey": "..." }`.
#[utoipa::path(
    post,
    path = "/api/realtime/sdp",
    request_body(content = String, content_type = "application/sdp", description = "SDP offer"),
    responses(
        (status = 200, description = "SDP answer", body = String, content_type = "application/sdp"),
        (status = 400, description = "Missing key or invalid offer", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn exchange_sdp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, ApiError> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    let payload = if is_json {
        serde_json::from_str::<SdpPayload>(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?
    } else {
        SdpPayload {
            sdp: Some(body),
            api_key: None,
            model: None,
        }
    };

    let api_key = openai_key(&state, payload.api_key.as_deref())?;
    let offer = payload
        .sdp
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("SDP offer is required".to_string()))?;
    validate_offer(&offer).map_err(|e| ApiError::BadRequest(format!("Invalid SDP offer: {}", e)))?;

    let model = payload
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| Provider::OpenAI.default_model().to_string());
    let answer = state
        .upstream
        .exchange_sdp(
            state.config.api_base(Provider::OpenAI),
            &api_key,
            &model,
            offer,
        )
        .await
        .map_err(|e| match e {
            UpstreamError::Status { status, body } => {
                ApiError::Upstream(status, ErrorResponse::new(format!("SDP error: {}", body)))
            }
            UpstreamError::Http(e) => e.into(),
        })?;

    Ok(([(CONTENT_TYPE, "application/sdp")], answer).into_response())
}

/// Transcribe a rendered page image to Markdown.
#[utoipa::path(
    post,
    path = "/api/transcribe",
    request_body = TranscribePayload,
    responses(
        (status = 200, description = "Markdown transcription", body = TranscribeResponse),
        (status = 400, description = "Invalid body or missing image", body = ErrorResponse),
        (status = 500, description = "Vision model failure", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn transcribe(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TranscribePayload>, JsonRejection>,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let payload = json_body(payload)?;
    let image = payload
        .image
        .filter(|i| !i.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Image data is required".to_string()))?;
    if BASE64_STANDARD.decode(strip_data_url(&image)).is_err() {
        return Err(ApiError::BadRequest(
            "Image data is not valid base64".to_string(),
        ));
    }

    let transcription = state
        .vision
        .transcribe_image(&image, payload.prompt)
        .await
        .map_err(|e| {
            error!(error = %format!("{:#}", e), "Vision transcription failed");
            ApiError::Upstream(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(e.to_string()),
            )
        })?;

    Ok(Json(TranscribeResponse { transcription }))
}

/// Fetch a web page and return its title, visible text and sanitised HTML.
#[utoipa::path(
    post,
    path = "/api/scrape",
    request_body = ScrapePayload,
    responses(
        (status = 200, description = "Scraped page", body = ScrapeResponse),
        (status = 400, description = "Invalid body or missing URL", body = ErrorResponse),
        (status = 500, description = "Fetch or parse failure", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn scrape(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScrapePayload>, JsonRejection>,
) -> Result<Json<ScrapeResponse>, ApiError> {
    let payload = json_body(payload)?;
    let url = payload
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("URL is required".to_string()))?;

    let html = state.upstream.fetch_html(&url).await.map_err(|e| match e {
        UpstreamError::Status { status, body } => {
            ApiError::Upstream(status, ErrorResponse::new(format!("Failed to fetch URL: {}", body)))
        }
        UpstreamError::Http(e) => {
            warn!(url = %url, error = %e, "Scrape request failed");
            ApiError::Upstream(StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new(e.to_string()))
        }
    })?;

    let page = scrape_html(&html);
    info!(url = %url, title = %page.title, "Scraped page");
    Ok(Json(ScrapeResponse {
        title: page.title,
        content: page.content,
        html: page.html,
        url,
    }))
}
