//! Handler-level error type. Every API failure renders as
//! `{"status": "error", "message": ...}` with a matching status code.

use axum::{
  extract::{rejection::JsonRejection, FromRequest},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::agent::AgentError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  BadRequest(String),
  #[error("{0}")]
  Forbidden(&'static str),
  #[error("{0}")]
  NotFound(String),
  #[error(transparent)]
  Agent(#[from] AgentError),
  #[error(transparent)]
  Store(#[from] StoreError),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Agent(_) => StatusCode::BAD_GATEWAY,
      ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(target: "nfr_study", %status, error = %self, "Request failed");
    }
    (status, Json(json!({ "status": "error", "message": self.to_string() }))).into_response()
  }
}

/// Malformed bodies, missing fields and wrong content types are all 400s.
impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    ApiError::BadRequest(rejection.body_text())
  }
}

/// `Json` body extractor whose rejections render as `ApiError`.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct AppJsonIn<T>(pub T);

pub type ApiResult<T> = Result<T, ApiError>;
