//! HTTP error mapping. Bodies are plain text.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::error::StreamError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("missing ?url= parameter")]
    MissingUrl,

    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingUrl => StatusCode::BAD_REQUEST,
            Self::Stream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
