//! Persisted result store (read side).
//!
//! Records are written by the surrounding pipeline. This module only reads
//! them back so the root cause node can classify a stored run.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;

use attest_core::PersistedRecord;

/// Errors from the result store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Store task failed: {0}")]
    Task(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Fetch one record by id.
    async fn fetch_record(&self, id: i64) -> Result<Option<PersistedRecord>, StoreError>;
}

/// Map-backed store for tests and embedding in other pipelines.
#[derive(Default)]
pub struct InMemoryResultStore {
    records: RwLock<BTreeMap<i64, PersistedRecord>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: PersistedRecord) {
        self.records.write().insert(record.id, record);
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn fetch_record(&self, id: i64) -> Result<Option<PersistedRecord>, StoreError> {
        Ok(self.records.read().get(&id).cloned())
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteResultStore;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use rusqlite::types::ValueRef;
    use rusqlite::{OptionalExtension, Row};
    use std::path::PathBuf;

    const SELECT_RECORD: &str = "SELECT id, metrics_ingestion, metrics_retrieval, \
         metrics_generation, metrics_compliance, answer FROM results WHERE id = ?1";

    /// Column as text whatever its storage class. Blobs are decoded lossily so
    /// a bad blob reaches the lenient record decoding instead of failing the row.
    fn text_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<String>> {
        Ok(match row.get_ref(index)? {
            ValueRef::Null => None,
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Integer(i) => Some(i.to_string()),
            ValueRef::Real(f) => Some(f.to_string()),
        })
    }

    /// Reads records from the `results` table of a SQLite database.
    ///
    /// Each lookup opens a read-only connection on the blocking pool.
    #[derive(Debug, Clone)]
    pub struct SqliteResultStore {
        path: PathBuf,
    }

    impl SqliteResultStore {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        pub fn path(&self) -> &std::path::Path {
            &self.path
        }
    }

    #[async_trait]
    impl ResultStore for SqliteResultStore {
        async fn fetch_record(&self, id: i64) -> Result<Option<PersistedRecord>, StoreError> {
            let path = self.path.clone();

            tokio::task::spawn_blocking(move || {
                let conn = rusqlite::Connection::open_with_flags(
                    &path,
                    rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
                )?;

                let record = conn
                    .query_row(SELECT_RECORD, [id], |row| {
                        Ok(PersistedRecord {
                            id: row.get(0)?,
                            metrics_ingestion: text_column(row, 1)?,
                            metrics_retrieval: text_column(row, 2)?,
                            metrics_generation: text_column(row, 3)?,
                            metrics_compliance: text_column(row, 4)?,
                            answer: text_column(row, 5)?,
                        })
                    })
                    .optional()?;

                Ok::<_, StoreError>(record)
            })
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_fetch() {
        let store = InMemoryResultStore::new();
        store.insert(PersistedRecord {
            id: 3,
            answer: Some("Stored answer".to_string()),
            ..Default::default()
        });

        let record = store.fetch_record(3).await.unwrap().unwrap();
        assert_eq!(record.answer_text(), "Stored answer");
        assert!(store.fetch_record(4).await.unwrap().is_none());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.db");

        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE results (
                id INTEGER PRIMARY KEY,
                metrics_ingestion TEXT,
                metrics_retrieval TEXT,
                metrics_generation TEXT,
                metrics_compliance TEXT,
                answer TEXT
            );",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO results (id, metrics_retrieval, metrics_compliance, answer) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                11,
                r#"{"distinct_source_count": 1}"#,
                "{broken",
                "Porcini grow under spruce."
            ],
        )
        .unwrap();
        drop(conn);

        let store = SqliteResultStore::new(&path);
        let record = store.fetch_record(11).await.unwrap().unwrap();

        assert_eq!(record.retrieval().get_f64("distinct_source_count"), Some(1.0));
        assert!(record.compliance().is_empty());
        assert!(record.ingestion().is_empty());
        assert_eq!(record.answer_text(), "Porcini grow under spruce.");

        assert!(store.fetch_record(12).await.unwrap().is_none());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_blob_columns_decode_leniently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.db");

        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE results (
                id INTEGER PRIMARY KEY,
                metrics_ingestion BLOB,
                metrics_retrieval BLOB,
                metrics_generation BLOB,
                metrics_compliance BLOB,
                answer TEXT
            );",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO results (id, metrics_ingestion, metrics_retrieval, metrics_generation, answer) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                5,
                br#"{"parsing_success_rate": 0.8}"#.to_vec(),
                vec![0xffu8, 0xfe, 0x00, 0x7b],
                42i64,
                "Fly agaric is red."
            ],
        )
        .unwrap();
        drop(conn);

        let record = SqliteResultStore::new(&path).fetch_record(5).await.unwrap().unwrap();

        assert_eq!(record.ingestion().get_f64("parsing_success_rate"), Some(0.8));
        assert!(record.retrieval().is_empty());
        assert!(record.generation().is_empty());
        assert!(record.compliance().is_empty());
        assert_eq!(record.answer_text(), "Fly agaric is red.");
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_missing_database_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteResultStore::new(dir.path().join("absent.db"));

        assert!(matches!(store.fetch_record(1).await, Err(StoreError::Database(_))));
    }
}
