use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{
    error::{Error, Result, Service},
    retrieval::{Passage, VectorIndex},
};

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

/// A Pinecone index, queried through its data-plane host.
pub struct Pinecone {
    client: Client,
    host: String,
    api_key: String,
    namespace: Option<String>,
    text_key: String,
}

#[derive(Debug, serde::Deserialize)]
struct IndexDescription {
    host: String,
}

#[derive(Debug, serde::Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Debug, serde::Deserialize)]
struct Match {
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

impl QueryResponse {
    fn into_passages(self, text_key: &str) -> Result<Vec<Passage>> {
        let total = self.matches.len();
        let passages = self
            .matches
            .into_iter()
            .filter_map(|m| {
                Passage::from_metadata(m.metadata.unwrap_or_default(), m.score, text_key)
            })
            .collect::<Vec<_>>();

        if total > 0 && passages.is_empty() {
            return Err(Error::dependency(
                Service::VectorIndex,
                anyhow!("No match carried a \"{text_key}\" metadata field"),
            ));
        }

        debug!("Pinecone returned {} of {total} matches with text", passages.len());

        Ok(passages)
    }
}

impl Pinecone {
    #[must_use]
    pub fn new(host: &str, api_key: String, namespace: Option<String>, text_key: String) -> Self {
        let host = host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };

        Self {
            client: Client::new(),
            host,
            api_key,
            namespace,
            text_key,
        }
    }

    /// Looks up the data-plane host of `index_name` through the control plane.
    ///
    /// # Errors
    ///
    /// Fails if the index does not exist or the credential is rejected.
    pub async fn resolve_host(api_key: &str, index_name: &str) -> Result<String> {
        let description: IndexDescription = Client::new()
            .get(format!("{CONTROL_PLANE_URL}/indexes/{index_name}"))
            .header("Api-Key", api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::dependency(Service::VectorIndex, e))?
            .json()
            .await
            .map_err(|e| Error::dependency(Service::VectorIndex, e))?;

        info!("Resolved Pinecone index {index_name} to {}", description.host);

        Ok(description.host)
    }

    fn query_body(&self, vector: Vec<f32>, count: usize) -> Value {
        let mut body = serde_json::json!({
            "vector": vector,
            "topK": count,
            "includeMetadata": true,
            "includeValues": false,
        });

        if let Some(namespace) = &self.namespace {
            body["namespace"] = Value::String(namespace.clone());
        }

        body
    }
}

#[async_trait]
impl VectorIndex for Pinecone {
    async fn query(&self, vector: Vec<f32>, count: usize) -> Result<Vec<Passage>> {
        let response: QueryResponse = self
            .client
            .post(format!("{}/query", self.host))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&self.query_body(vector, count))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::dependency(Service::VectorIndex, e))?
            .json()
            .await
            .map_err(|e| Error::dependency(Service::VectorIndex, e))?;

        response.into_passages(&self.text_key)
    }
}
