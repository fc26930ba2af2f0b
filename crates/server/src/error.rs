use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use echotext_common::EchoTextError;
use std::fmt;

use crate::types::ErrorResponse;

/// HTTP-facing wrapper around `EchoTextError`.
///
/// Every failure is answered with `{"detail": "<message>"}` and the status
/// the underlying error maps to.
#[derive(Debug)]
pub struct ApiError(pub EchoTextError);

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            detail: detail_message(&self.0),
        })
    }
}

impl From<EchoTextError> for ApiError {
    fn from(err: EchoTextError) -> Self {
        ApiError(err)
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        ApiError(EchoTextError::internal(format!("Blocking task failed: {}", err)))
    }
}

impl From<actix_multipart::MultipartError> for ApiError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        ApiError(EchoTextError::invalid_input(format!("Malformed upload: {}", err)))
    }
}

/// Client-facing message. 400/404/503 carry the bare reason; server-side
/// failures keep their category prefix.
fn detail_message(err: &EchoTextError) -> String {
    match err {
        EchoTextError::InvalidInput(msg)
        | EchoTextError::NotFound(msg)
        | EchoTextError::ServiceUnavailable(msg) => msg.clone(),
        other => other.to_string(),
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
