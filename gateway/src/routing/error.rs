//! Routing error type (§4.1 step 3, §7 `RouteNotFound` / `UpstreamError`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no configured route matches this path")]
    NoMatch,
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl RouteError {
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NoMatch => "route_not_found",
            Self::Upstream(e) if e.is_timeout() => "upstream_timeout",
            Self::Upstream(_) => "upstream_error",
        }
    }

    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NoMatch => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({
            "error": self.error_type(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
