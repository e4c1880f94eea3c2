//! Embedding backend implementations

mod openai;
mod voyage;

pub use openai::OpenAiEmbeddingBackend;
pub use voyage::VoyageEmbeddingBackend;
