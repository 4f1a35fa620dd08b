use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hyper::ext::ReasonPhrase;
use thiserror::Error;
use tracing::{error, warn};

/// Handler error. The message travels in the HTTP status line
/// (`400 Bad Request: <message>`); the body is always empty.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Forbidden: {0}")]
    ForbiddenBecause(&'static str),

    #[error("Not Found")]
    NotFound,

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden | ApiError::ForbiddenBecause(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref e) = self {
            error!("Internal error: {:#}", e);
        }

        let status = self.status();
        let mut response = status.into_response();

        match ReasonPhrase::try_from(self.to_string()) {
            Ok(phrase) => {
                response.extensions_mut().insert(phrase);
            }
            Err(_) => warn!("Reason phrase not representable for {} response", status),
        }

        response
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
