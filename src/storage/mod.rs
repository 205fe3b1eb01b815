//! Storage backends for the contract graph
//!
//! Backends implement the `CategoryStore` trait. `SqliteStore` is the
//! persistent default; `InMemoryStore` serves tests and one-shot runs;
//! `SqliteVecStore` (feature `embeddings`) adds a sqlite-vec KNN index.

mod memory;
mod sqlite;
mod sqlite_vec;
mod traits;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
#[cfg(feature = "embeddings")]
pub use sqlite_vec::SqliteVecStore;
pub use traits::{CategoryStore, OpenStore, StorageError, StorageResult};
