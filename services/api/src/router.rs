//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{ErrorResponse, ParseQuestionsPayload, ParsedQuestions},
    state::AppState,
    ws::ws_handler,
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
    paths(handlers::parse_questions),
    components(schemas(ParseQuestionsPayload, ParsedQuestions, ErrorResponse)),
    tags(
        (name = "Interview API", description = "Question checks for the voice mock-interview service")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/questions/parse", post(handlers::parse_questions))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
