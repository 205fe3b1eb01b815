//! SqliteVecStore: SQLite graph plus a sqlite-vec KNN index over segments
//!
//! Wraps `SqliteStore` for categories and segments and mirrors every
//! segment embedding into a vec0 virtual table. Each contract gets its own
//! partition via the `contract_id TEXT PARTITION KEY` column.
//!
//! Vectors are L2-normalized on insert so that L2 distance from vec0
//! can be converted to cosine similarity: `sim = 1 - dist² / 2`.
//!
//! Uses its own database connection to the same file to avoid contention
//! with the graph connection. A segment whose index entry cannot be written
//! is removed from the graph again, so every stored segment is searchable.

#[cfg(feature = "embeddings")]
mod inner {
    use crate::embedding::l2_normalize;
    use crate::graph::{ContractId, ScoredSegment, SegmentId, TextSegment};
    use crate::storage::sqlite::embedding_to_blob;
    use crate::storage::{CategoryStore, OpenStore, SqliteStore, StorageError, StorageResult};
    use rusqlite::Connection;
    use sqlite_vec::sqlite3_vec_init;
    use std::path::Path;
    use std::sync::Mutex;
    use tracing::warn;

    /// Persistent category store with a sqlite-vec similarity index.
    pub struct SqliteVecStore {
        graph: SqliteStore,
        conn: Mutex<Connection>,
        dimensions: usize,
    }

    /// Register the sqlite-vec extension globally (safe under parallel test execution).
    fn register_vec_extension() {
        use std::sync::Once;
        static INIT: Once = Once::new();
        INIT.call_once(|| unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        });
    }

    fn vec_error(e: rusqlite::Error) -> StorageError {
        StorageError::VectorIndex(e.to_string())
    }

    impl SqliteVecStore {
        /// Open a persistent store at the given path with a fixed embedding size.
        pub fn open(path: impl AsRef<Path>, dimensions: usize) -> StorageResult<Self> {
            register_vec_extension();
            let graph = SqliteStore::open(path.as_ref())?;
            let conn = Connection::open(path.as_ref())?;
            Self::init(graph, conn, dimensions)
        }

        /// Open an in-memory store (for tests).
        pub fn open_in_memory(dimensions: usize) -> StorageResult<Self> {
            register_vec_extension();
            let graph = SqliteStore::open_in_memory()?;
            let conn = Connection::open_in_memory()?;
            Self::init(graph, conn, dimensions)
        }

        fn init(graph: SqliteStore, conn: Connection, dimensions: usize) -> StorageResult<Self> {
            let create_sql = format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS vec_segments USING vec0(\
                     contract_id TEXT PARTITION KEY,\
                     segment_id TEXT,\
                     embedding float[{}]\
                 )",
                dimensions
            );
            conn.execute_batch(&create_sql).map_err(vec_error)?;
            Ok(Self {
                graph,
                conn: Mutex::new(conn),
                dimensions,
            })
        }

        /// The dimensionality of vectors stored in this store.
        pub fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn check(&self, vector: &[f32]) -> StorageResult<()> {
            if vector.len() != self.dimensions {
                return Err(StorageError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: vector.len(),
                });
            }
            Ok(())
        }
    }

    impl CategoryStore for SqliteVecStore {
        fn upsert_category(&self, contract: &ContractId, name: &str) -> StorageResult<bool> {
            self.graph.upsert_category(contract, name)
        }

        fn list_category_names(&self, contract: &ContractId) -> StorageResult<Vec<String>> {
            self.graph.list_category_names(contract)
        }

        fn category_count(&self, contract: &ContractId) -> StorageResult<usize> {
            self.graph.category_count(contract)
        }

        fn create_segment(
            &self,
            contract: &ContractId,
            category: &str,
            text: &str,
            embedding: Vec<f32>,
        ) -> StorageResult<TextSegment> {
            self.check(&embedding)?;
            let mut normalized = embedding.clone();
            l2_normalize(&mut normalized);

            let segment = self.graph.create_segment(contract, category, text, embedding)?;
            let indexed = {
                let conn = self.conn.lock().unwrap();
                conn.execute(
                    "INSERT INTO vec_segments(contract_id, segment_id, embedding) VALUES (?1, ?2, ?3)",
                    rusqlite::params![
                        contract.as_str(),
                        segment.id.as_str(),
                        embedding_to_blob(&normalized)
                    ],
                )
            };
            if let Err(e) = indexed {
                if let Err(cleanup) = self.graph.delete_segment(contract, &segment.id) {
                    warn!(segment = %segment.id, error = %cleanup, "failed to roll back unindexed segment");
                }
                return Err(vec_error(e));
            }
            Ok(segment)
        }

        fn list_segments_for_category(
            &self,
            contract: &ContractId,
            category: &str,
        ) -> StorageResult<Vec<TextSegment>> {
            self.graph.list_segments_for_category(contract, category)
        }

        fn nearest_segments(
            &self,
            contract: &ContractId,
            query: &[f32],
            k: usize,
        ) -> StorageResult<Vec<ScoredSegment>> {
            if k == 0 {
                return Ok(Vec::new());
            }
            self.check(query)?;
            let mut normalized = query.to_vec();
            l2_normalize(&mut normalized);

            // For unit vectors: L2_dist² = 2(1 - cos_sim), so cos_sim = 1 - dist²/2.
            let hits: Vec<(String, f32)> = {
                let conn = self.conn.lock().unwrap();
                let mut stmt = conn
                    .prepare(
                        "SELECT segment_id, distance \
                         FROM vec_segments \
                         WHERE embedding MATCH ?1 \
                           AND contract_id = ?2 \
                           AND k = ?3 \
                         ORDER BY distance",
                    )
                    .map_err(vec_error)?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![embedding_to_blob(&normalized), contract.as_str(), k as i64],
                        |row| Ok((row.get::<_, String>(0)?, row.get::<_, f32>(1)?)),
                    )
                    .map_err(vec_error)?;
                rows.collect::<Result<Vec<_>, _>>().map_err(vec_error)?
            };

            let mut results = Vec::with_capacity(hits.len());
            for (id, distance) in hits {
                if let Some(segment) = self.graph.load_segment(contract, &SegmentId::from_string(id))? {
                    results.push(ScoredSegment {
                        segment,
                        score: 1.0 - (distance * distance) / 2.0,
                    });
                }
            }
            Ok(results)
        }

        fn category_of(
            &self,
            contract: &ContractId,
            segment: &SegmentId,
        ) -> StorageResult<Option<String>> {
            self.graph.category_of(contract, segment)
        }

        fn segment_count(&self, contract: &ContractId) -> StorageResult<usize> {
            self.graph.segment_count(contract)
        }

        fn clear_contract(&self, contract: &ContractId) -> StorageResult<bool> {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "DELETE FROM vec_segments WHERE contract_id = ?1",
                rusqlite::params![contract.as_str()],
            )
            .map_err(vec_error)?;
            drop(conn);
            self.graph.clear_contract(contract)
        }
    }

}

#[cfg(feature = "embeddings")]
pub use inner::SqliteVecStore;
