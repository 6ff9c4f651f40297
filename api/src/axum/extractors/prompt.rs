use axum::{async_trait, body::Bytes, extract::FromRequest, http::Request};

use crate::axum::errors::ApiError;

/// The question carried by a chat request, as `{"prompt": "..."}`.
///
/// The body is read as JSON whatever its `Content-Type`.
#[derive(Debug)]
pub struct Prompt(pub String);

#[derive(Debug, serde::Deserialize)]
struct ChatRequest {
    prompt: String,
}

#[async_trait]
impl<S, B> FromRequest<S, B> for Prompt
where
    Bytes: FromRequest<S, B>,
    B: Send + 'static,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state).await.map_err(|_| {
            ApiError::MalformedRequest("Failed to read the request body.".to_string())
        })?;

        let ChatRequest { prompt } = serde_json::from_slice(&body).map_err(|_| {
            ApiError::MalformedRequest(
                "The request body must be a JSON object with a \"prompt\" string.".to_string(),
            )
        })?;

        if prompt.is_empty() {
            return Err(ApiError::MalformedRequest(
                "The prompt must not be empty.".to_string(),
            ));
        }

        Ok(Self(prompt))
    }
}
