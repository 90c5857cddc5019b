pub mod retrieval;
pub mod store;

pub use retrieval::RetrievalService;
pub use store::{copy_store_dir, ChunkStore, StoredChunk};
