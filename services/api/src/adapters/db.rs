//! services/api/src/adapters/db.rs
//!
//! This module contains the storage adapter, the concrete implementation of
//! the `CaseStore` port from the `core` crate. Each collection is a SQLite
//! table of `id → JSON record`; records are always written whole.

use crate::config::StorageTarget;
use async_trait::async_trait;
use lexchile_core::domain::{Case, NormativeDoc};
use lexchile_core::memory::MemoryStore;
use lexchile_core::ports::{CaseStore, PortError, PortResult};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

const CASES: &str = "cases";
const NORMS: &str = "norms";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A storage adapter that implements the `CaseStore` port on SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Creates a new `SqliteStore` over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `database_url` and makes
    /// sure both collections exist.
    pub async fn connect(database_url: &str) -> PortResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| PortError::StorageUnavailable(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        if let Some(parent) = database_path(database_url).as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;

        let store = Self::new(pool);
        store
            .ensure_collections()
            .await
            .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;
        info!("Durable store ready at {}", database_url);
        Ok(store)
    }

    /// Creates the collection tables on first use. There is no other schema
    /// versioning.
    pub async fn ensure_collections(&self) -> Result<(), sqlx::Error> {
        for table in [CASES, NORMS] {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, record TEXT NOT NULL)",
                table
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn read_all<T: DeserializeOwned>(&self, table: &str) -> PortResult<Vec<T>> {
        let rows = sqlx::query_as::<_, RecordRow>(&format!("SELECT id, record FROM {} ORDER BY id", table))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match row.to_domain() {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(table, record = %row.id, "Skipping undecodable record: {}", e);
                    None
                }
            })
            .collect())
    }

    async fn upsert<T: Serialize>(&self, table: &str, id: &str, record: &T) -> PortResult<()> {
        let json = serde_json::to_string(record).map_err(|e| PortError::PersistFailure(e.to_string()))?;
        sqlx::query(&format!(
            "INSERT INTO {} (id, record) VALUES (?1, ?2) ON CONFLICT(id) DO UPDATE SET record = excluded.record",
            table
        ))
        .bind(id)
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::PersistFailure(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, table: &str, id: &str) -> PortResult<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE id = ?1", table))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::PersistFailure(e.to_string()))?;
        Ok(())
    }
}

/// The file behind a `sqlite:` URL, or `None` for in-memory databases.
fn database_path(database_url: &str) -> Option<PathBuf> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

//=========================================================================================
// Store Selection
//=========================================================================================

/// Opens the configured store. A SQLite database that cannot be opened does
/// not stop the service: the session runs from empty collections and every
/// later write fails and is logged.
pub async fn open_store(target: &StorageTarget) -> Arc<dyn CaseStore> {
    match target {
        StorageTarget::Sqlite(url) => match SqliteStore::connect(url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!("Could not open the durable store at {}: {}", url, e);
                Arc::new(UnreachableStore::new(e.to_string()))
            }
        },
        StorageTarget::Memory => {
            warn!("Using the in-memory store; nothing will survive a restart.");
            Arc::new(MemoryStore::new())
        }
    }
}

/// Stands in for a database that could not be opened. Reads fail with
/// `StorageUnavailable`, writes with `PersistFailure`.
#[derive(Debug, Clone)]
pub struct UnreachableStore {
    reason: String,
}

impl UnreachableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    fn unavailable<T>(&self) -> PortResult<T> {
        Err(PortError::StorageUnavailable(self.reason.clone()))
    }

    fn not_persisted(&self) -> PortResult<()> {
        Err(PortError::PersistFailure(self.reason.clone()))
    }
}

#[async_trait]
impl CaseStore for UnreachableStore {
    async fn read_all_cases(&self) -> PortResult<Vec<Case>> {
        self.unavailable()
    }

    async fn write_case(&self, _case: &Case) -> PortResult<()> {
        self.not_persisted()
    }

    async fn delete_case(&self, _case_id: &str) -> PortResult<()> {
        self.not_persisted()
    }

    async fn read_all_norms(&self) -> PortResult<Vec<NormativeDoc>> {
        self.unavailable()
    }

    async fn write_norm(&self, _doc: &NormativeDoc) -> PortResult<()> {
        self.not_persisted()
    }

    async fn delete_norm(&self, _doc_id: &str) -> PortResult<()> {
        self.not_persisted()
    }
}

//=========================================================================================
// "Impure" Database Record Struct
//=========================================================================================

#[derive(FromRow)]
struct RecordRow {
    id: String,
    record: String,
}
impl RecordRow {
    fn to_domain<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.record)
    }
}

//=========================================================================================
// `CaseStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CaseStore for SqliteStore {
    async fn read_all_cases(&self) -> PortResult<Vec<Case>> {
        self.read_all(CASES).await
    }

    async fn write_case(&self, case: &Case) -> PortResult<()> {
        self.upsert(CASES, &case.id, case).await
    }

    async fn delete_case(&self, case_id: &str) -> PortResult<()> {
        self.remove(CASES, case_id).await
    }

    async fn read_all_norms(&self) -> PortResult<Vec<NormativeDoc>> {
        self.read_all(NORMS).await
    }

    async fn write_norm(&self, doc: &NormativeDoc) -> PortResult<()> {
        self.upsert(NORMS, &doc.id, doc).await
    }

    async fn delete_norm(&self, doc_id: &str) -> PortResult<()> {
        self.remove(NORMS, doc_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexchile_core::domain::{CaseEvent, CaseEventKind, CaseFile};
    use tempfile::TempDir;

    async fn open(dir: &TempDir) -> SqliteStore {
        let url = format!("sqlite://{}", dir.path().join("data").join("lexchile.db").display());
        SqliteStore::connect(&url).await.unwrap()
    }

    fn sample_case(id: &str) -> Case {
        Case {
            id: id.to_string(),
            rol: "C-4512-2024".to_string(),
            caratula: "SOTO / INMOBILIARIA LOS ANDES".to_string(),
            court: "2º Juzgado Civil de Valparaíso".to_string(),
            created_at: "2024-06-01".to_string(),
            files: vec![CaseFile {
                id: "f1".to_string(),
                name: "ebook.md".to_string(),
                upload_date: "2024-06-01".to_string(),
                mime_type: "text/markdown".to_string(),
                content: "IyBFYm9vaw==".to_string(),
            }],
            timeline: vec![
                CaseEvent {
                    date: "2024-04-02".to_string(),
                    title: "Demanda".to_string(),
                    description: "Se interpone demanda de cobro".to_string(),
                    kind: CaseEventKind::Filing,
                },
                CaseEvent {
                    date: "2024-04-05".to_string(),
                    title: "Traslado".to_string(),
                    description: "Téngase por interpuesta".to_string(),
                    kind: CaseEventKind::Resolution,
                },
            ],
        }
    }

    fn sample_norm(id: &str) -> NormativeDoc {
        NormativeDoc {
            id: id.to_string(),
            name: "Auto Acordado tramitación electrónica.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            content: "JVBERi0xLjQ=".to_string(),
        }
    }

    #[test]
    fn database_path_from_url() {
        assert_eq!(database_path("sqlite://data/lexchile.db"), Some(PathBuf::from("data/lexchile.db")));
        assert_eq!(database_path("sqlite:lexchile.db?mode=rwc"), Some(PathBuf::from("lexchile.db")));
        assert_eq!(database_path("sqlite::memory:"), None);
    }

    #[tokio::test]
    async fn case_round_trip_keeps_nested_records() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;
        let case = sample_case("c1");

        store.write_case(&case).await.unwrap();
        assert_eq!(store.read_all_cases().await.unwrap(), vec![case]);
    }

    #[tokio::test]
    async fn writing_twice_is_an_upsert() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;
        let mut case = sample_case("c1");

        store.write_case(&case).await.unwrap();
        store.write_case(&case).await.unwrap();
        assert_eq!(store.read_all_cases().await.unwrap().len(), 1);

        case.timeline.clear();
        store.write_case(&case).await.unwrap();
        assert_eq!(store.read_all_cases().await.unwrap(), vec![case]);
    }

    #[tokio::test]
    async fn delete_is_a_noop_for_absent_ids() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;
        store.write_case(&sample_case("c1")).await.unwrap();

        store.delete_case("c1").await.unwrap();
        store.delete_case("c1").await.unwrap();
        store.delete_norm("nunca-existio").await.unwrap();
        assert!(store.read_all_cases().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn collections_are_independent() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;
        store.write_case(&sample_case("same-id")).await.unwrap();
        store.write_norm(&sample_norm("same-id")).await.unwrap();

        store.delete_norm("same-id").await.unwrap();
        assert_eq!(store.read_all_cases().await.unwrap().len(), 1);
        assert!(store.read_all_norms().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn records_survive_reopening() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir).await;
            store.write_case(&sample_case("c1")).await.unwrap();
            store.write_norm(&sample_norm("n1")).await.unwrap();
            store.pool.close().await;
        }
        let reopened = open(&dir).await;
        assert_eq!(reopened.read_all_cases().await.unwrap(), vec![sample_case("c1")]);
        assert_eq!(reopened.read_all_norms().await.unwrap(), vec![sample_norm("n1")]);
    }

    /// A URL whose parent directory can never be created: it sits below a
    /// regular file.
    fn unopenable_url(dir: &TempDir) -> String {
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        format!("sqlite://{}", blocker.join("lexchile.db").display())
    }

    #[tokio::test]
    async fn unopenable_database_degrades_to_a_failing_store() {
        let dir = TempDir::new().unwrap();
        let url = unopenable_url(&dir);
        assert!(matches!(SqliteStore::connect(&url).await, Err(PortError::StorageUnavailable(_))));

        let store = open_store(&StorageTarget::Sqlite(url)).await;
        assert!(matches!(store.read_all_cases().await, Err(PortError::StorageUnavailable(_))));
        assert!(matches!(store.read_all_norms().await, Err(PortError::StorageUnavailable(_))));
        assert!(matches!(store.write_case(&sample_case("c1")).await, Err(PortError::PersistFailure(_))));
        assert!(matches!(store.delete_norm("n1").await, Err(PortError::PersistFailure(_))));
    }

    #[tokio::test]
    async fn session_over_unopenable_database_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&StorageTarget::Sqlite(unopenable_url(&dir))).await;
        let sync = lexchile_core::sync::Synchronizer::initialize(store).await;
        assert!(sync.cases().is_empty());
        assert!(sync.normative_docs().is_empty());

        sync.add_case(sample_case("c1"));
        sync.flush().await;
        assert_eq!(sync.cases(), vec![sample_case("c1")]);
    }

    #[tokio::test]
    async fn undecodable_rows_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;
        store.write_case(&sample_case("c1")).await.unwrap();
        sqlx::query("INSERT INTO cases (id, record) VALUES ('broken', '{not json')")
            .execute(&store.pool)
            .await
            .unwrap();

        let cases = store.read_all_cases().await.unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].id, "c1");
    }
}
