#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
mod error;
pub mod generation;
mod memory;
mod openai;
mod pinecone;
pub mod prompt;
mod qdrant;
pub mod retrieval;
pub mod stream;

pub use config::Config;
pub use error::{Error, Result, Service};
pub use generation::{Completer, FragmentStream};
pub use memory::{ConversationMemory, Turn};
pub use openai::OpenAI;
pub use pinecone::Pinecone;
pub use qdrant::{Collection, Qdrant};
pub use retrieval::{Embedder, Passage, RetrievedContext, VectorIndex};
pub use stream::{AnswerStream, Pipeline, Stage};
