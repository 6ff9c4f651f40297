use std::{
    pin::Pin,
    task::{Context, Poll},
};

use axum::{
    body::{Bytes, StreamBody},
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use docchat::FragmentStream;
use futures::{ready, Stream};
use tracing::info;

use crate::axum::{errors::ApiResult, extractors::Prompt, state::AppState};

/// Answers the prompt, streaming the generated text back as plain text.
///
/// Failures before the first fragment become error responses. Once streaming has begun,
/// a failure closes the connection without writing anything else.
pub async fn stream(State(state): State<AppState>, Prompt(prompt): Prompt) -> ApiResult<Response> {
    let answer = state.pipeline.ask(prompt).await?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        StreamBody::new(Relay::new(answer.fragments)),
    )
        .into_response())
}

/// Forwards fragments to the response body as they arrive.
///
/// Dropped by hyper when the client goes away, which drops the in-flight completion too.
struct Relay {
    fragments: FragmentStream,
    finished: bool,
}

impl Relay {
    const fn new(fragments: FragmentStream) -> Self {
        Self {
            fragments,
            finished: false,
        }
    }
}

impl Stream for Relay {
    type Item = Result<Bytes, docchat::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let item = ready!(self.fragments.as_mut().poll_next(cx));

        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }

        Poll::Ready(item.map(|fragment| fragment.map(Bytes::from)))
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if !self.finished {
            info!("Client disconnected before the answer completed, cancelling it");
        }
    }
}
