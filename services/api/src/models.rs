//! REST API Models
//!
//! Request and response bodies for the HTTP endpoints, annotated with `utoipa`
//! for the generated OpenAPI document.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema, Debug)]
pub struct ParseQuestionsPayload {
    /// The question generator's output, with or without code fences and quoting.
    #[schema(example = "```json\n[\"Tell me about yourself.\", \"Why this role?\"]\n```")]
    pub raw: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ParsedQuestions {
    #[schema(example = json!(["Tell me about yourself.", "Why this role?"]))]
    pub questions: Vec<String>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}
