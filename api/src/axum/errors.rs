use axum::http::StatusCode;
use axum_derive_error::ErrorResponse;
use docchat::Service;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, ErrorResponse)]
pub enum ApiError {
    #[error("{0}")]
    #[status(StatusCode::BAD_REQUEST)]
    MalformedRequest(String),

    #[error("The {0} is unavailable, please try again later.")]
    #[status(StatusCode::BAD_GATEWAY)]
    DependencyFailure(Service),

    #[error(transparent)]
    ServerError(#[from] anyhow::Error),
}

impl From<docchat::Error> for ApiError {
    fn from(error: docchat::Error) -> Self {
        match error.service() {
            Some(service) => Self::DependencyFailure(service),
            None => Self::ServerError(error.into()),
        }
    }
}

impl PartialEq for ApiError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string() && self.status_code() == other.status_code()
    }
}
