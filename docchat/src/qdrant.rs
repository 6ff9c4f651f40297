use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    error::{Error, Result, Service},
    retrieval::{Passage, VectorIndex},
};

pub struct Qdrant {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl Qdrant {
    #[must_use]
    pub fn new(url: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    #[must_use]
    pub fn collection(self, name: &str, text_key: &str) -> Collection {
        Collection {
            client: self.client,
            api_key: self.api_key,
            text_key: text_key.to_string(),
            base_url: format!("{}/collections/{name}", self.base_url),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct SearchResponse {
    result: Vec<PointResult>,
}

#[derive(Debug, serde::Deserialize)]
struct PointResult {
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

impl SearchResponse {
    /// Keeps the points whose payload carries `text_key`, in the order Qdrant ranked them.
    fn into_passages(self, text_key: &str) -> Result<Vec<Passage>> {
        let total = self.result.len();
        let passages = self
            .result
            .into_iter()
            .filter_map(|point| {
                Passage::from_metadata(point.payload.unwrap_or_default(), point.score, text_key)
            })
            .collect::<Vec<_>>();

        if passages.len() < total {
            debug!("Skipped {} points without a \"{text_key}\" payload", total - passages.len());
        }

        if total > 0 && passages.is_empty() {
            return Err(Error::dependency(
                Service::VectorIndex,
                anyhow!("No point carried a \"{text_key}\" payload field"),
            ));
        }

        Ok(passages)
    }
}

pub struct Collection {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    text_key: String,
}

impl Collection {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn search(&self, vector: Vec<f32>, count: usize) -> reqwest::Result<SearchResponse> {
        self.authorize(self.client.post(format!("{}/points/search", self.base_url)))
            .json(&serde_json::json!({
                "limit": count,
                "vector": vector,
                "with_payload": true,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl VectorIndex for Collection {
    async fn query(&self, vector: Vec<f32>, count: usize) -> Result<Vec<Passage>> {
        self.search(vector, count)
            .await
            .map_err(|e| Error::dependency(Service::VectorIndex, e))?
            .into_passages(&self.text_key)
    }
}
