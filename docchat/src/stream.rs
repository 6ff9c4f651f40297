use std::{fmt::Display, sync::Arc};

use futures::{stream, StreamExt};
use tracing::{debug, warn};

use crate::{
    config::{Config, VectorStoreConfig},
    error::{bounded, Result, Service},
    generation::{Completer, FragmentStream, Generator},
    memory::ConversationMemory,
    pinecone::Pinecone,
    qdrant::Qdrant,
    retrieval::{Embedder, RetrievedContext, Retriever, VectorIndex},
    OpenAI,
};

/// Where a single request is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Retrieving,
    Generating,
    Completed,
    Aborted,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Retrieving => write!(f, "retrieving"),
            Self::Generating => write!(f, "generating"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// The answer to a question, streamed as the model produces it.
pub struct AnswerStream {
    pub context: RetrievedContext,
    pub fragments: FragmentStream,
}

/// Retrieval-augmented question answering: embed, look up, then stream a completion.
///
/// Holds no per-request state, so a single pipeline serves concurrent requests.
#[derive(Clone)]
pub struct Pipeline {
    retriever: Retriever,
    generator: Generator,
}

impl Pipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        completer: Arc<dyn Completer>,
        config: &Config,
    ) -> Self {
        Self {
            retriever: Retriever::new(embedder, index, config.retrieval.clone(), config.timeout),
            generator: Generator::new(completer, config.system_prompt.clone(), config.timeout),
        }
    }

    /// Builds the pipeline on OpenAI and the configured vector store.
    ///
    /// # Errors
    ///
    /// Fails if the Pinecone index host has to be resolved and the lookup fails.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let openai = Arc::new(OpenAI::new(&config.openai));

        let index: Arc<dyn VectorIndex> = match &config.vector_store {
            VectorStoreConfig::Pinecone {
                api_key,
                index_name,
                index_host,
                namespace,
                text_key,
            } => {
                let host = match index_host {
                    Some(host) => host.clone(),
                    None => {
                        bounded(
                            Service::VectorIndex,
                            config.timeout,
                            Pinecone::resolve_host(api_key, index_name),
                        )
                        .await?
                    }
                };

                Arc::new(Pinecone::new(
                    &host,
                    api_key.clone(),
                    namespace.clone(),
                    text_key.clone(),
                ))
            }
            VectorStoreConfig::Qdrant {
                url,
                collection,
                api_key,
                text_key,
            } => Arc::new(Qdrant::new(url, api_key.clone()).collection(collection, text_key)),
        };

        Ok(Self::new(openai.clone(), index, openai, config))
    }

    /// Looks up the passages relevant to `question` without generating an answer.
    ///
    /// # Errors
    ///
    /// Fails if the embedding API or the vector index fails.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievedContext> {
        self.retriever.retrieve(question).await
    }

    /// Answers `question`, returning once the first fragment of the answer is available.
    ///
    /// Any failure before that point is returned here. Failures after it end the
    /// returned stream with a single error item.
    ///
    /// # Errors
    ///
    /// Fails if retrieval fails, or if the completion API fails before producing a fragment.
    pub async fn ask(&self, question: String) -> Result<AnswerStream> {
        debug!(stage = %Stage::Received, "Answering question");

        debug!(stage = %Stage::Retrieving);
        let context = self.retriever.retrieve(&question).await.map_err(abort)?;

        debug!(stage = %Stage::Generating, passages = context.len());
        let mut fragments =
            self.generator
                .answer(question, &context, ConversationMemory::default());

        let first = match fragments.next().await {
            None => {
                debug!(stage = %Stage::Completed, "Model returned an empty answer");
                return Ok(AnswerStream {
                    context,
                    fragments: Box::pin(stream::empty::<Result<String>>()),
                });
            }
            Some(Err(e)) => return Err(abort(e)),
            Some(Ok(fragment)) => fragment,
        };

        let fragments = stream::iter([Ok(first)])
            .chain(fragments)
            .inspect(|item| {
                if let Err(e) = item {
                    warn!(stage = %Stage::Aborted, "Answer interrupted: {e}");
                }
            });

        Ok(AnswerStream {
            context,
            fragments: Box::pin(fragments),
        })
    }
}

fn abort(error: crate::Error) -> crate::Error {
    warn!(stage = %Stage::Aborted, "Request failed: {error}");
    error
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use futures::{stream, StreamExt};

    use super::*;
    use crate::{
        config::{OpenAIConfig, RetrievalConfig},
        error::{Error, Service},
        prompt::{ChatMessage, DEFAULT_SYSTEM_PROMPT},
        retrieval::Passage,
    };

    type Calls = Arc<Mutex<Vec<&'static str>>>;

    struct Stub {
        calls: Calls,
        passages: Vec<Passage>,
        fragments: Vec<&'static str>,
        fail_embedding: bool,
        fail_completion_after: Option<usize>,
    }

    impl Stub {
        fn new(passages: &[&str], fragments: &[&'static str]) -> Self {
            Self {
                calls: Calls::default(),
                passages: passages.iter().map(|t| Passage::new(*t, 0.9)).collect(),
                fragments: fragments.to_vec(),
                fail_embedding: false,
                fail_completion_after: None,
            }
        }

        fn pipeline(self) -> (Pipeline, Calls) {
            let calls = self.calls.clone();
            let stub = Arc::new(self);

            (Pipeline::new(stub.clone(), stub.clone(), stub, &config()), calls)
        }
    }

    #[async_trait]
    impl Embedder for Stub {
        async fn embed(&self, _: &str) -> Result<Vec<f32>> {
            self.calls.lock().unwrap().push("embed");

            if self.fail_embedding {
                return Err(Error::dependency(
                    Service::Embedding,
                    anyhow::anyhow!("quota exceeded"),
                ));
            }

            Ok(vec![1.0, 0.0])
        }
    }

    #[async_trait]
    impl VectorIndex for Stub {
        async fn query(&self, _: Vec<f32>, _: usize) -> Result<Vec<Passage>> {
            self.calls.lock().unwrap().push("query");
            Ok(self.passages.clone())
        }
    }

    #[async_trait]
    impl Completer for Stub {
        async fn stream(&self, _: Vec<ChatMessage>) -> Result<FragmentStream> {
            self.calls.lock().unwrap().push("complete");

            let mut items = self
                .fragments
                .iter()
                .map(|f| Ok((*f).to_string()))
                .collect::<Vec<_>>();
            if let Some(after) = self.fail_completion_after {
                items.truncate(after);
                items.push(Err(Error::dependency(
                    Service::Completion,
                    anyhow::anyhow!("reset"),
                )));
            }

            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn config() -> Config {
        Config {
            openai: OpenAIConfig {
                api_key: "sk-test".to_string(),
                api_base: None,
                embedding_model: "embedding".to_string(),
                chat_model: "chat".to_string(),
                temperature: 0.0,
            },
            vector_store: VectorStoreConfig::Qdrant {
                url: "http://localhost:6333".to_string(),
                collection: "docs".to_string(),
                api_key: None,
                text_key: "text".to_string(),
            },
            retrieval: RetrievalConfig {
                top_k: 4,
                score_threshold: None,
            },
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    async fn collect(answer: AnswerStream) -> Vec<Result<String>> {
        answer.fragments.collect().await
    }

    #[tokio::test]
    async fn calls_each_dependency_once_in_order() {
        let (pipeline, calls) =
            Stub::new(&["Refunds within 30 days."], &["Refunds ", "within 30 days."]).pipeline();

        let answer = pipeline.ask("What is the refund policy?".to_string()).await.unwrap();
        assert_eq!(answer.context.len(), 1);

        let fragments = collect(answer).await;
        let fragments = fragments.into_iter().map(Result::unwrap).collect::<Vec<_>>();

        assert_eq!(fragments, vec!["Refunds ", "within 30 days."]);
        assert_eq!(*calls.lock().unwrap(), vec!["embed", "query", "complete"]);
    }

    #[tokio::test]
    async fn generates_without_context() {
        let (pipeline, calls) = Stub::new(&[], &["I don't know."]).pipeline();

        let answer = pipeline.ask("Anything?".to_string()).await.unwrap();

        assert!(answer.context.is_empty());
        assert_eq!(collect(answer).await.len(), 1);
        assert_eq!(*calls.lock().unwrap(), vec!["embed", "query", "complete"]);
    }

    #[tokio::test]
    async fn aborts_before_generation_when_retrieval_fails() {
        let mut stub = Stub::new(&["Refunds within 30 days."], &["never"]);
        stub.fail_embedding = true;
        let (pipeline, calls) = stub.pipeline();

        let Err(err) = pipeline.ask("Refunds?".to_string()).await else {
            panic!("expected the request to fail");
        };

        assert_eq!(err.service(), Some(Service::Embedding));
        assert_eq!(*calls.lock().unwrap(), vec!["embed"]);
    }

    #[tokio::test]
    async fn reports_completion_failures_before_the_first_fragment() {
        let mut stub = Stub::new(&[], &["never"]);
        stub.fail_completion_after = Some(0);
        let (pipeline, _) = stub.pipeline();

        let Err(err) = pipeline.ask("Refunds?".to_string()).await else {
            panic!("expected the request to fail");
        };

        assert_eq!(err.service(), Some(Service::Completion));
    }

    #[tokio::test]
    async fn ends_the_stream_on_mid_stream_failure() {
        let mut stub = Stub::new(&[], &["Partial answer", "never"]);
        stub.fail_completion_after = Some(1);
        let (pipeline, _) = stub.pipeline();

        let fragments = collect(pipeline.ask("Refunds?".to_string()).await.unwrap()).await;

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].as_deref().unwrap(), "Partial answer");
        assert!(fragments[1].is_err());
    }
}
