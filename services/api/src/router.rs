//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the proxy routes and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        CreateSessionPayload, ErrorResponse, RealtimeKeyPayload, ScrapePayload, ScrapeResponse,
        SdpPayload, TranscribePayload, TranscribeResponse,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_session,
        handlers::create_realtime_session,
        handlers::get_realtime_session,
        handlers::exchange_sdp,
        handlers::transcribe,
        handlers::scrape,
    ),
    components(
        schemas(
            CreateSessionPayload,
            RealtimeKeyPayload,
            SdpPayload,
            TranscribePayload,
            TranscribeResponse,
            ScrapePayload,
            ScrapeResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "Talk To Book API", description = "Realtime session, transcription and scraping proxy for the PDF reader")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/api/session", post(handlers::create_session))
        .route("/api/realtime", post(handlers::create_realtime_session))
        .route("/api/realtime/session", get(handlers::get_realtime_session))
        .route("/api/realtime/sdp", post(handlers::exchange_sdp))
        .route("/api/transcribe", post(handlers::transcribe))
        .route("/api/scrape", post(handlers::scrape))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
