use std::{pin::Pin, sync::Arc, time::Duration};

use async_fn_stream::try_fn_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::{
    error::{bounded, Error, Result, Service},
    memory::ConversationMemory,
    prompt::{build_messages, ChatMessage},
    retrieval::RetrievedContext,
    stream::Stage,
};

/// A lazy, finite sequence of answer fragments. It cannot be restarted, and it ends
/// after the first error.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A chat-completion model that streams its answer.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<FragmentStream>;
}

#[derive(Clone)]
pub struct Generator {
    completer: Arc<dyn Completer>,
    system_prompt: String,
    timeout: Duration,
}

impl Generator {
    pub fn new(completer: Arc<dyn Completer>, system_prompt: String, timeout: Duration) -> Self {
        Self {
            completer,
            system_prompt,
            timeout,
        }
    }

    /// Streams the model's answer to `question`, grounded on `context`.
    ///
    /// Nothing is sent to the completion API until the returned stream is first polled,
    /// and dropping the stream drops the in-flight request. The finished exchange is
    /// recorded into `memory`.
    pub fn answer(
        &self,
        question: String,
        context: &RetrievedContext,
        mut memory: ConversationMemory,
    ) -> FragmentStream {
        let messages = build_messages(&self.system_prompt, &question, context, &memory);
        let completer = self.completer.clone();
        let timeout = self.timeout;

        Box::pin(try_fn_stream(|emitter| async move {
            let mut fragments = bounded(
                Service::Completion,
                timeout,
                completer.stream(messages),
            )
            .await?;

            let mut answer = String::new();
            loop {
                let next = tokio::time::timeout(timeout, fragments.next())
                    .await
                    .map_err(|_| Error::Timeout(Service::Completion))?;

                let Some(fragment) = next else {
                    break;
                };
                let fragment = fragment?;

                answer.push_str(&fragment);
                emitter.emit(fragment).await;
            }

            debug!(stage = %Stage::Completed, "Answer finished after {} bytes", answer.len());
            // Memory is request-local and dropped with the stream.
            memory.record(question, answer);

            Ok::<(), Error>(())
        }))
    }
}
