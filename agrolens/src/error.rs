use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body of every error answered by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommonError {
    pub code: u16,
    pub datetime: String,
    pub message: String,
    pub details: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Pest not found")]
    NotFound,
    #[error("Payload too large")]
    PayloadTooLarge,
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_body(&self) -> CommonError {
        let (message, details) = match self {
            ApiError::BadRequest(details) => ("Bad request", details.as_str()),
            ApiError::Unauthorized => ("Unauthorized", "Not authorized."),
            ApiError::Forbidden => ("Forbidden", "Access to this resource is forbidden."),
            ApiError::NotFound => (
                "Pest not found in our database",
                "The pest could not be found in our database.",
            ),
            ApiError::PayloadTooLarge => (
                "Payload too large",
                "The uploaded file exceeds the size limit.",
            ),
            ApiError::Internal => ("Internal error", "Internal server error."),
        };

        CommonError {
            code: self.status_code().as_u16(),
            datetime: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            message: message.to_string(),
            details: details.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_body())).into_response()
    }
}
