use std::{env, str::FromStr, time::Duration};

use crate::{
    error::{Error, Result},
    prompt::{CONTEXT_PLACEHOLDER, DEFAULT_SYSTEM_PROMPT},
};

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TOP_K: usize = 4;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub openai: OpenAIConfig,
    pub vector_store: VectorStoreConfig,
    pub retrieval: RetrievalConfig,
    pub system_prompt: String,
    /// Upper bound for every dependency call, and for each wait on the next streamed fragment.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub api_base: Option<String>,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorStoreConfig {
    Pinecone {
        api_key: String,
        index_name: String,
        index_host: Option<String>,
        namespace: Option<String>,
        text_key: String,
    },
    Qdrant {
        url: String,
        collection: String,
        api_key: Option<String>,
        text_key: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Minimum similarity score. Only meaningful for cosine or dot-product indexes.
    pub score_threshold: Option<f32>,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] listing every missing or malformed variable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, treating empty values as unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] listing every missing or malformed variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut vars = Vars::new(lookup);

        let api_key = vars
            .optional("OPENAI_API_KEY")
            .or_else(|| vars.optional("OPENAI_KEY"));
        if api_key.is_none() {
            vars.missing.push("OPENAI_API_KEY".to_string());
        }

        let openai = OpenAIConfig {
            api_key: api_key.unwrap_or_default(),
            api_base: vars.optional("OPENAI_API_BASE"),
            embedding_model: vars
                .optional("OPENAI_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            chat_model: vars
                .optional("OPENAI_CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            temperature: vars.parsed("OPENAI_TEMPERATURE", DEFAULT_TEMPERATURE),
        };

        let text_key = vars
            .optional("VECTOR_TEXT_KEY")
            .unwrap_or_else(|| "text".to_string());

        let vector_store = match vars.optional("VECTOR_STORE").as_deref() {
            None | Some("pinecone") => VectorStoreConfig::Pinecone {
                api_key: vars.required("PINECONE_API_KEY"),
                index_name: vars.required("PINECONE_INDEX_NAME"),
                index_host: vars.optional("PINECONE_INDEX_HOST"),
                namespace: vars.optional("PINECONE_NAMESPACE"),
                text_key,
            },
            Some("qdrant") => VectorStoreConfig::Qdrant {
                url: vars.required("QDRANT_URL"),
                collection: vars.required("QDRANT_COLLECTION"),
                api_key: vars.optional("QDRANT_API_KEY"),
                text_key,
            },
            Some(other) => {
                vars.invalid.push(format!(
                    "VECTOR_STORE must be \"pinecone\" or \"qdrant\", got \"{other}\""
                ));
                VectorStoreConfig::Qdrant {
                    url: String::new(),
                    collection: String::new(),
                    api_key: None,
                    text_key,
                }
            }
        };

        let retrieval = RetrievalConfig {
            top_k: vars.parsed("RAG_TOP_K", DEFAULT_TOP_K),
            score_threshold: vars.parsed_optional("RAG_SCORE_THRESHOLD"),
        };
        if retrieval.top_k == 0 {
            vars.invalid
                .push("RAG_TOP_K must be greater than zero".to_string());
        }

        let system_prompt = vars
            .optional("RAG_SYSTEM_PROMPT")
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        if !system_prompt.contains(CONTEXT_PLACEHOLDER) {
            vars.invalid.push(format!(
                "RAG_SYSTEM_PROMPT must contain the {CONTEXT_PLACEHOLDER} placeholder"
            ));
        }

        let timeout = Duration::from_secs(
            vars.parsed("DEPENDENCY_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS),
        );

        vars.finish()?;

        Ok(Self {
            openai,
            vector_store,
            retrieval,
            system_prompt,
            timeout,
        })
    }
}

struct Vars<F> {
    lookup: F,
    missing: Vec<String>,
    invalid: Vec<String>,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    const fn new(lookup: F) -> Self {
        Self {
            lookup,
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&mut self, key: &str) -> String {
        self.optional(key).unwrap_or_else(|| {
            self.missing.push(key.to_string());
            String::new()
        })
    }

    fn parsed<T: FromStr>(&mut self, key: &str, default: T) -> T {
        self.parsed_optional(key).unwrap_or(default)
    }

    fn parsed_optional<T: FromStr>(&mut self, key: &str) -> Option<T> {
        let value = self.optional(key)?;

        value.parse().map_or_else(
            |_| {
                self.invalid.push(format!("{key} has an invalid value \"{value}\""));
                None
            },
            Some,
        )
    }

    fn finish(self) -> Result<()> {
        let mut problems = Vec::new();

        if !self.missing.is_empty() {
            problems.push(format!("missing {}", self.missing.join(", ")));
        }
        problems.extend(self.invalid);

        if problems.is_empty() {
            return Ok(());
        }

        Err(Error::Configuration(problems.join("; ")))
    }
}
