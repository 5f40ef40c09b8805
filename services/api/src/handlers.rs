//! Axum Handlers for the REST API
//!
//! The interview itself runs over the WebSocket; these endpoints let a client
//! check a generated question payload before starting a call.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use interview_core::questions::{self, ParseError};
use tracing::warn;

use crate::models::{ErrorResponse, ParseQuestionsPayload, ParsedQuestions};

pub enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        warn!(cleaned = err.cleaned(), "Rejected question payload");
        Self::BadRequest(err.to_string())
    }
}

/// Parse a generated question payload into the list an interview would ask.
#[utoipa::path(
    post,
    path = "/questions/parse",
    request_body = ParseQuestionsPayload,
    responses(
        (status = 200, description = "Questions parsed successfully", body = ParsedQuestions),
        (status = 400, description = "Payload is not a list of questions", body = ErrorResponse)
    )
)]
pub async fn parse_questions(
    Json(payload): Json<ParseQuestionsPayload>,
) -> Result<Json<ParsedQuestions>, ApiError> {
    let list = questions::parse(&payload.raw)?;
    if list.is_empty() {
        return Err(ApiError::BadRequest(
            "No interview questions were provided.".to_string(),
        ));
    }
    Ok(Json(ParsedQuestions {
        questions: list.into(),
    }))
}
