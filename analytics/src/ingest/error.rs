use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("ingest batch was empty")]
    EmptyBatch,
    #[error("every record in the batch was missing a required field")]
    AllRecordsInvalid,
}

impl IngestError {
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::EmptyBatch => "empty_batch",
            Self::AllRecordsInvalid => "all_records_invalid",
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.error_type(),
            "message": self.to_string(),
        }));
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}
