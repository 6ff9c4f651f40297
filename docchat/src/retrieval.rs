use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    config::RetrievalConfig,
    error::{bounded, Result, Service},
};

/// Turns text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// A nearest-neighbour index over stored passages.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns up to `count` passages, most similar first.
    async fn query(&self, vector: Vec<f32>, count: usize) -> Result<Vec<Passage>>;
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Passage {
    pub text: String,
    pub score: f32,
    pub metadata: Map<String, Value>,
}

impl Passage {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score,
            metadata: Map::new(),
        }
    }

    /// Builds a passage from a match's metadata, taking its text from `text_key`.
    pub(crate) fn from_metadata(
        mut metadata: Map<String, Value>,
        score: f32,
        text_key: &str,
    ) -> Option<Self> {
        let Some(Value::String(text)) = metadata.remove(text_key) else {
            return None;
        };

        Some(Self {
            text,
            score,
            metadata,
        })
    }
}

/// Passages retrieved for a single question, most relevant first.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct RetrievedContext {
    pub passages: Vec<Passage>,
}

impl RetrievedContext {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.passages.len()
    }
}

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
    timeout: Duration,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
            timeout,
        }
    }

    /// Embeds the question and looks up its nearest passages, keeping the index's ranking.
    ///
    /// The score threshold assumes a similarity metric (cosine or dot product), where
    /// higher scores are better.
    ///
    /// # Errors
    ///
    /// Fails if either the embedding API or the vector index fails or times out. An
    /// empty result is not an error.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievedContext> {
        let vector = bounded(
            Service::Embedding,
            self.timeout,
            self.embedder.embed(question),
        )
        .await?;

        let mut passages = bounded(
            Service::VectorIndex,
            self.timeout,
            self.index.query(vector, self.config.top_k),
        )
        .await?;

        if let Some(threshold) = self.config.score_threshold {
            passages.retain(|passage| passage.score >= threshold);
        }
        passages.truncate(self.config.top_k);

        debug!("Retrieved {} passages", passages.len());

        Ok(RetrievedContext { passages })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::error::Error;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl Embedder for SlowEmbedder {
        async fn embed(&self, _: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct FixedIndex {
        passages: Vec<Passage>,
        requested: Mutex<Option<usize>>,
    }

    #[async_trait]
    impl VectorIndex for FixedIndex {
        async fn query(&self, _: Vec<f32>, count: usize) -> Result<Vec<Passage>> {
            *self.requested.lock().unwrap() = Some(count);
            Ok(self.passages.clone())
        }
    }

    fn retriever(
        embedder: Arc<dyn Embedder>,
        index: Arc<FixedIndex>,
        threshold: Option<f32>,
    ) -> Retriever {
        Retriever::new(
            embedder,
            index,
            RetrievalConfig {
                top_k: 2,
                score_threshold: threshold,
            },
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn keeps_the_index_ranking() {
        // Distance metrics rank lower scores first.
        let index = Arc::new(FixedIndex {
            passages: vec![
                Passage::new("closest", 0.1),
                Passage::new("middle", 0.5),
                Passage::new("farthest", 0.9),
            ],
            ..FixedIndex::default()
        });

        let context = retriever(Arc::new(FixedEmbedder), index.clone(), None)
            .retrieve("question")
            .await
            .unwrap();

        let texts = context
            .passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["closest", "middle"]);
        assert_eq!(*index.requested.lock().unwrap(), Some(2));
    }

    #[tokio::test]
    async fn drops_passages_below_the_threshold() {
        let index = Arc::new(FixedIndex {
            passages: vec![Passage::new("a", 0.9), Passage::new("b", 0.5)],
            ..FixedIndex::default()
        });

        let context = retriever(Arc::new(FixedEmbedder), index, Some(0.8))
            .retrieve("question")
            .await
            .unwrap();

        assert_eq!(context.len(), 1);
    }

    #[tokio::test]
    async fn empty_results_are_not_an_error() {
        let context = retriever(Arc::new(FixedEmbedder), Arc::default(), None)
            .retrieve("question")
            .await
            .unwrap();

        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn times_out_slow_embeddings() {
        let err = retriever(Arc::new(SlowEmbedder), Arc::default(), None)
            .retrieve("question")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(Service::Embedding)));
    }

    #[test]
    fn reads_passage_text_from_metadata() {
        let metadata = json!({ "text": "Refunds within 30 days.", "source": "faq.md" });
        let Value::Object(metadata) = metadata else {
            unreachable!()
        };

        let passage = Passage::from_metadata(metadata.clone(), 0.8, "text").unwrap();
        assert_eq!(passage.text, "Refunds within 30 days.");
        assert_eq!(passage.metadata.get("source"), Some(&json!("faq.md")));

        assert!(Passage::from_metadata(metadata, 0.8, "content").is_none());
    }
}
