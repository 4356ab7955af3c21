//! LanceDB adapter for the similarity-search collaborator.
//!
//! Each collection (global or per category) is its own table. Searches use
//! the cosine distance type, so `_distance` lands in `[0, 2]`.

pub mod schema;
pub mod store;
pub mod table;
pub mod writer;

pub use store::LanceVectorStore;
pub use writer::{ChunkRecord, CollectionWriter};
