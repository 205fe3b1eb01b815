//! SQLite storage backend for the contract graph

use super::traits::{
    check_dimensions, rank_segments, CategoryStore, OpenStore, StorageError, StorageResult,
};
use crate::graph::{ContractId, ScoredSegment, SegmentId, TextSegment};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

const SEGMENT_COLUMNS: &str = "id, category, text, embedding, sequence, created_at";

/// SQLite-backed category store
///
/// Uses a single SQLite database file with a `categories` table and a
/// `segments` table whose rows reference their category (BELONGS_TO).
/// Embeddings are stored as little-endian f32 blobs and searched by an
/// exhaustive cosine scan over the contract's partition.
/// Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Categories: name is the identity key within a contract
            CREATE TABLE IF NOT EXISTS categories (
                contract_id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (contract_id, name)
            );

            -- Segments: append-only, each BELONGS_TO exactly one category
            CREATE TABLE IF NOT EXISTS segments (
                id TEXT NOT NULL,
                contract_id TEXT NOT NULL,
                category TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                dimensions INTEGER NOT NULL,
                sequence INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (contract_id, id),
                FOREIGN KEY (contract_id, category)
                    REFERENCES categories(contract_id, name) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_segments_category
                ON segments(contract_id, category, sequence);

            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode for concurrent reads during ingestion
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Load a single segment by ID
    pub fn load_segment(
        &self,
        contract: &ContractId,
        segment: &SegmentId,
    ) -> StorageResult<Option<TextSegment>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM segments WHERE contract_id = ?1 AND id = ?2",
            SEGMENT_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![contract.as_str(), segment.as_str()], raw_segment)
            .optional()?;
        row.map(RawSegment::into_segment).transpose()
    }

    /// Remove one segment. Only used to roll back a segment whose index
    /// entry could not be written.
    pub(crate) fn delete_segment(
        &self,
        contract: &ContractId,
        segment: &SegmentId,
    ) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM segments WHERE contract_id = ?1 AND id = ?2",
            params![contract.as_str(), segment.as_str()],
        )?;
        Ok(deleted > 0)
    }

    /// Dimensionality fixed by the first stored segment, if any
    fn contract_dimensions(conn: &Connection, contract: &ContractId) -> StorageResult<Option<usize>> {
        let dims: Option<i64> = conn
            .query_row(
                "SELECT dimensions FROM segments WHERE contract_id = ?1 LIMIT 1",
                params![contract.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(dims.map(|d| d as usize))
    }

    fn load_segments(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Vec<TextSegment>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, raw_segment)?;
        let mut segments = Vec::new();
        for row in rows {
            segments.push(row?.into_segment()?);
        }
        Ok(segments)
    }
}

/// Column values of a segment row before decoding.
struct RawSegment {
    id: String,
    category: String,
    text: String,
    embedding: Vec<u8>,
    sequence: i64,
    created_at: String,
}

fn raw_segment(row: &Row<'_>) -> rusqlite::Result<RawSegment> {
    Ok(RawSegment {
        id: row.get(0)?,
        category: row.get(1)?,
        text: row.get(2)?,
        embedding: row.get(3)?,
        sequence: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl RawSegment {
    fn into_segment(self) -> StorageResult<TextSegment> {
        Ok(TextSegment {
            id: SegmentId::from_string(self.id),
            category: self.category,
            text: self.text,
            embedding: blob_to_embedding(&self.embedding),
            sequence: self.sequence as u64,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::DateParse(e.to_string()))
}

/// Encode an embedding as little-endian f32 bytes.
pub(crate) fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes; a trailing partial value is ignored.
pub(crate) fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }
}

impl CategoryStore for SqliteStore {
    // === Category Operations ===

    fn upsert_category(&self, contract: &ContractId, name: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "INSERT INTO categories (contract_id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(contract_id, name) DO NOTHING",
            params![contract.as_str(), name, Utc::now().to_rfc3339()],
        )?;
        Ok(rows > 0)
    }

    fn list_category_names(&self, contract: &ContractId) -> StorageResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT name FROM categories WHERE contract_id = ?1 ORDER BY name")?;
        let names = stmt
            .query_map(params![contract.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn category_count(&self, contract: &ContractId) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM categories WHERE contract_id = ?1",
            params![contract.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // === Segment Operations ===

    fn create_segment(
        &self,
        contract: &ContractId,
        category: &str,
        text: &str,
        embedding: Vec<f32>,
    ) -> StorageResult<TextSegment> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM categories WHERE contract_id = ?1 AND name = ?2",
            params![contract.as_str(), category],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StorageError::CategoryNotFound(category.to_string()));
        }

        check_dimensions(Self::contract_dimensions(&tx, contract)?, &embedding)?;

        let sequence: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence) + 1, 0) FROM segments WHERE contract_id = ?1",
            params![contract.as_str()],
            |row| row.get(0),
        )?;

        let segment = TextSegment::new(category, text, embedding, sequence as u64);
        tx.execute(
            r#"
            INSERT INTO segments (id, contract_id, category, text, embedding, dimensions, sequence, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                segment.id.as_str(),
                contract.as_str(),
                segment.category,
                segment.text,
                embedding_to_blob(&segment.embedding),
                segment.dimensions() as i64,
                sequence,
                segment.created_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        Ok(segment)
    }

    fn list_segments_for_category(
        &self,
        contract: &ContractId,
        category: &str,
    ) -> StorageResult<Vec<TextSegment>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM segments WHERE contract_id = ?1 AND category = ?2 ORDER BY sequence",
            SEGMENT_COLUMNS
        );
        Self::load_segments(&conn, &sql, params![contract.as_str(), category])
    }

    fn nearest_segments(
        &self,
        contract: &ContractId,
        query: &[f32],
        k: usize,
    ) -> StorageResult<Vec<ScoredSegment>> {
        let conn = self.conn.lock().unwrap();
        if let Some(expected) = Self::contract_dimensions(&conn, contract)? {
            check_dimensions(Some(expected), query)?;
        }
        let sql = format!(
            "SELECT {} FROM segments WHERE contract_id = ?1 ORDER BY sequence",
            SEGMENT_COLUMNS
        );
        let segments = Self::load_segments(&conn, &sql, params![contract.as_str()])?;
        Ok(rank_segments(segments, query, k))
    }

    fn category_of(
        &self,
        contract: &ContractId,
        segment: &SegmentId,
    ) -> StorageResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let name = conn
            .query_row(
                "SELECT category FROM segments WHERE contract_id = ?1 AND id = ?2",
                params![contract.as_str(), segment.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(name)
    }

    fn segment_count(&self, contract: &ContractId) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM segments WHERE contract_id = ?1",
            params![contract.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // === Partition Operations ===

    fn clear_contract(&self, contract: &ContractId) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let segments = conn.execute(
            "DELETE FROM segments WHERE contract_id = ?1",
            params![contract.as_str()],
        )?;
        let categories = conn.execute(
            "DELETE FROM categories WHERE contract_id = ?1",
            params![contract.as_str()],
        )?;
        Ok(segments + categories > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn contract() -> ContractId {
        ContractId::from_string("contract-a")
    }

    #[test]
    fn test_upsert_category_is_idempotent() {
        let store = create_test_store();
        let c = contract();

        assert!(store.upsert_category(&c, "Termination").unwrap());
        assert!(!store.upsert_category(&c, "Termination").unwrap());
        assert_eq!(store.category_count(&c).unwrap(), 1);
    }

    #[test]
    fn test_category_names_are_case_sensitive_and_sorted() {
        let store = create_test_store();
        let c = contract();

        store.upsert_category(&c, "termination").unwrap();
        store.upsert_category(&c, "Benefits").unwrap();
        store.upsert_category(&c, "Termination").unwrap();

        let names = store.list_category_names(&c).unwrap();
        assert_eq!(names, vec!["Benefits", "Termination", "termination"]);
    }

    #[test]
    fn test_segment_requires_existing_category() {
        let store = create_test_store();
        let err = store
            .create_segment(&contract(), "Missing", "text", vec![1.0])
            .unwrap_err();
        assert!(matches!(err, StorageError::CategoryNotFound(name) if name == "Missing"));
    }

    #[test]
    fn test_segments_round_trip_in_storage_order() {
        let store = create_test_store();
        let c = contract();
        store.upsert_category(&c, "Benefits").unwrap();
        store.upsert_category(&c, "Compensation").unwrap();

        store.create_segment(&c, "Benefits", "20 days vacation", vec![0.1, 0.2]).unwrap();
        store.create_segment(&c, "Compensation", "$60,000 per annum", vec![0.9, 0.1]).unwrap();
        store.create_segment(&c, "Benefits", "Health insurance", vec![0.2, 0.2]).unwrap();

        let benefits = store.list_segments_for_category(&c, "Benefits").unwrap();
        let texts: Vec<&str> = benefits.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["20 days vacation", "Health insurance"]);
        assert_eq!(benefits[0].embedding, vec![0.1, 0.2]);
        assert!(benefits[0].sequence < benefits[1].sequence);
        assert_eq!(store.segment_count(&c).unwrap(), 3);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let store = create_test_store();
        let c = contract();
        store.upsert_category(&c, "Benefits").unwrap();
        store.create_segment(&c, "Benefits", "a", vec![1.0, 0.0, 0.0]).unwrap();

        let err = store.create_segment(&c, "Benefits", "b", vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(err, StorageError::DimensionMismatch { expected: 3, actual: 2 }));
        assert_eq!(store.segment_count(&c).unwrap(), 1);
    }

    #[test]
    fn test_nearest_and_category_of() {
        let store = create_test_store();
        let c = contract();
        store.upsert_category(&c, "Termination").unwrap();
        store.upsert_category(&c, "Benefits").unwrap();
        store
            .create_segment(&c, "Termination", "30 days notice", vec![0.9, 0.1, 0.0])
            .unwrap();
        store
            .create_segment(&c, "Benefits", "paid vacation", vec![0.0, 0.2, 0.9])
            .unwrap();

        let hits = store.nearest_segments(&c, &[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].segment.text, "30 days notice");
        assert_eq!(
            store.category_of(&c, &hits[0].segment.id).unwrap().as_deref(),
            Some("Termination")
        );
    }

    #[test]
    fn test_nearest_on_empty_contract() {
        let store = create_test_store();
        assert!(store.nearest_segments(&contract(), &[1.0], 1).unwrap().is_empty());
    }

    #[test]
    fn test_contract_isolation() {
        let store = create_test_store();
        let a = ContractId::from_string("a");
        let b = ContractId::from_string("b");
        store.upsert_category(&a, "Termination").unwrap();
        store.create_segment(&a, "Termination", "notice", vec![1.0]).unwrap();

        assert!(store.list_category_names(&b).unwrap().is_empty());
        assert!(store.nearest_segments(&b, &[1.0], 1).unwrap().is_empty());
        // b may use a different model than a
        store.upsert_category(&b, "Termination").unwrap();
        store.create_segment(&b, "Termination", "notice", vec![1.0, 0.0]).unwrap();
    }

    #[test]
    fn test_clear_contract() {
        let store = create_test_store();
        let c = contract();
        store.upsert_category(&c, "Benefits").unwrap();
        store.create_segment(&c, "Benefits", "a", vec![1.0]).unwrap();

        assert!(store.clear_contract(&c).unwrap());
        assert_eq!(store.category_count(&c).unwrap(), 0);
        assert_eq!(store.segment_count(&c).unwrap(), 0);
        assert!(!store.clear_contract(&c).unwrap());
    }

    #[test]
    fn test_delete_segment() {
        let store = create_test_store();
        let c = contract();
        store.upsert_category(&c, "Benefits").unwrap();
        let kept = store.create_segment(&c, "Benefits", "kept", vec![1.0, 0.0]).unwrap();
        let dropped = store.create_segment(&c, "Benefits", "dropped", vec![0.0, 1.0]).unwrap();

        assert!(store.delete_segment(&c, &dropped.id).unwrap());
        assert!(!store.delete_segment(&c, &dropped.id).unwrap());
        assert_eq!(store.list_segments_for_category(&c, "Benefits").unwrap(), vec![kept]);
    }

    #[test]
    fn test_load_segment() {
        let store = create_test_store();
        let c = contract();
        store.upsert_category(&c, "Benefits").unwrap();
        let created = store.create_segment(&c, "Benefits", "a", vec![0.5, 0.5]).unwrap();

        let loaded = store.load_segment(&c, &created.id).unwrap().unwrap();
        assert_eq!(loaded.text, "a");
        assert_eq!(loaded.embedding, vec![0.5, 0.5]);
        assert!(store.load_segment(&c, &SegmentId::new()).unwrap().is_none());
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("graph.db");
        let c = contract();
        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert_category(&c, "Termination").unwrap();
            store.create_segment(&c, "Termination", "30 days notice", vec![1.0, 2.0]).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_category_names(&c).unwrap(), vec!["Termination"]);
        let segments = store.list_segments_for_category(&c, "Termination").unwrap();
        assert_eq!(segments[0].embedding, vec![1.0, 2.0]);
    }

    #[test]
    fn test_blob_encoding() {
        let v = vec![1.5f32, -0.25, 0.0];
        assert_eq!(blob_to_embedding(&embedding_to_blob(&v)), v);
    }
}
