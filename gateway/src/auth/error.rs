//! Authentication error type (§4.1 step 1, §7 `ClientAuthError`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy)]
pub enum AuthError {
    #[error("missing X-API-Key header")]
    MissingCredential,
    #[error("X-API-Key shorter than 8 characters")]
    CredentialTooShort,
}

impl AuthError {
    #[must_use]
    pub const fn error_type(self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::CredentialTooShort => "credential_too_short",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.error_type(),
            "message": self.to_string(),
        }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}
