//! Embedding store implementations

mod in_memory;
mod pgvector;

pub use in_memory::InMemoryMessageStore;
pub use pgvector::{PgVectorMessageStore, PgVectorStoreConfig};
