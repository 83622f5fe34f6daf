//! SQLite storage backend for a ResQLink node.

use super::{KeyValueStore, RequestStore};
use crate::error::StoreError;
use crate::locks::KeyedLocks;
use async_trait::async_trait;
use resq_types::{DeviceId, DisasterRequest, Location, RequestId, RequestStatus, StatusEntry};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

const SELECT_COLUMNS: &str =
    "id, timestamp, sender_id, type AS kind, description, status, status_history, location";

/// SQLite-based request store.
///
/// Uses WAL mode for concurrent reads/writes. The pool connects lazily; the
/// first operation runs the schema migration exactly once.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    initialized: Arc<OnceCell<()>>,
    locks: Arc<KeyedLocks>,
}

impl SqliteStore {
    /// Open a store backed by the database file at `path`.
    ///
    /// Nothing touches the disk until the first operation; open failures
    /// surface from [`RequestStore::init`] as [`StoreError::Unavailable`].
    pub fn open(path: &Path) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_lazy_with(options);

        Self::with_pool(pool)
    }

    /// Open the database at `path` and run the migration.
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        let store = Self::open(path);
        store.init().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StoreError::Unavailable)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // A single connection that is never recycled; dropping it drops the data.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_lazy_with(options);

        Ok(Self::with_pool(pool))
    }

    fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            initialized: Arc::new(OnceCell::new()),
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS requests (
                id TEXT PRIMARY KEY NOT NULL,
                timestamp INTEGER NOT NULL,
                sender_id TEXT NOT NULL,
                type TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                status_history TEXT NOT NULL,
                location TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_timestamp ON requests(timestamp)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        tracing::debug!("Request store schema ready");
        Ok(())
    }
}

#[async_trait]
impl RequestStore for SqliteStore {
    async fn init(&self) -> Result<(), StoreError> {
        self.initialized
            .get_or_try_init(|| self.run_migrations())
            .await?;
        Ok(())
    }

    async fn upsert(&self, record: &DisasterRequest) -> Result<(), StoreError> {
        self.init().await?;
        let _guard = self.locks.lock(&record.id).await;

        let history = serde_json::to_string(&record.status_history)?;
        let location = record
            .location
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO requests (id, timestamp, sender_id, type, description, status, status_history, location)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                timestamp = excluded.timestamp,
                sender_id = excluded.sender_id,
                type = excluded.type,
                description = excluded.description,
                status = excluded.status,
                status_history = excluded.status_history,
                location = excluded.location
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.timestamp)
        .bind(record.sender_id.as_str())
        .bind(record.kind.as_str())
        .bind(record.description.as_str())
        .bind(record.status.as_str())
        .bind(history)
        .bind(location)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(())
    }

    async fn get(&self, id: &RequestId) -> Result<Option<DisasterRequest>, StoreError> {
        self.init().await?;

        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM requests WHERE id = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        row.map(DisasterRequest::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<DisasterRequest>, StoreError> {
        self.init().await?;

        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM requests ORDER BY timestamp DESC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        rows.into_iter().map(DisasterRequest::try_from).collect()
    }

    async fn append_status_history(
        &self,
        id: &RequestId,
        entry: StatusEntry,
    ) -> Result<DisasterRequest, StoreError> {
        self.init().await?;
        let _guard = self.locks.lock(id).await;

        let entry_json = serde_json::to_string(&entry)?;

        // Read, append and write back in one statement.
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            UPDATE requests
            SET status = ?1,
                status_history = json_insert(status_history, '$[#]', json(?2))
            WHERE id = ?3
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(entry.status.as_str())
        .bind(entry_json)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        match row {
            Some(row) => DisasterRequest::try_from(row),
            None => Err(StoreError::NotFound { id: id.clone() }),
        }
    }

    async fn clear_all(&self) -> Result<u64, StoreError> {
        self.init().await?;

        let result = sqlx::query("DELETE FROM requests")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        tracing::info!("Cleared {} requests from local store", result.rows_affected());
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.init().await?;

        sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Unavailable)
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.init().await?;

        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(())
    }

    async fn set_value_if_absent(&self, key: &str, value: &str) -> Result<String, StoreError> {
        self.init().await?;

        sqlx::query("INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO NOTHING")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Unavailable)
    }

    async fn remove_value(&self, key: &str) -> Result<(), StoreError> {
        self.init().await?;

        sqlx::query("DELETE FROM settings WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        Ok(())
    }
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct RequestRow {
    id: String,
    timestamp: i64,
    sender_id: String,
    kind: String,
    description: String,
    status: String,
    status_history: String,
    location: Option<String>,
}

fn corrupt(id: &str, reason: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

impl TryFrom<RequestRow> for DisasterRequest {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let status = RequestStatus::from_str(&row.status).map_err(|e| corrupt(&row.id, e))?;

        let status_history: Vec<StatusEntry> = serde_json::from_str(&row.status_history)
            .map_err(|e| corrupt(&row.id, format!("status_history: {e}")))?;

        // Older rows store the literal `null` rather than SQL NULL.
        let location: Option<Location> = match row.location.as_deref() {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| corrupt(&row.id, format!("location: {e}")))?,
            None => None,
        };

        Ok(DisasterRequest {
            id: RequestId::new(row.id),
            timestamp: row.timestamp,
            sender_id: DeviceId::new(row.sender_id),
            kind: row.kind,
            description: row.description,
            status,
            status_history,
            location,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use tempfile::TempDir;

    fn request(description: &str, created_at: i64) -> DisasterRequest {
        DisasterRequest::create(
            DeviceId::from("device-a"),
            "medical",
            description,
            None,
            created_at,
        )
    }

    fn entry(status: RequestStatus, at: i64, by: &str) -> StatusEntry {
        StatusEntry::new(status, at, DeviceId::from(by))
    }

    // ===========================================
    // Schema / init
    // ===========================================

    #[tokio::test]
    async fn concurrent_init_succeeds() {
        let store = SqliteStore::in_memory().unwrap();

        let results = join_all((0..10).map(|_| store.init())).await;
        assert!(results.iter().all(|r| r.is_ok()));

        // Tables exist and are usable
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        store.init().await.unwrap();
        store.init().await.unwrap();
        store.run_migrations().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_path_is_unavailable() {
        let store = SqliteStore::open(Path::new("/nonexistent/dir/resq.db"));
        let err = store.init().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        let err = store.list().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    // ===========================================
    // Records
    // ===========================================

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = SqliteStore::in_memory().unwrap();
        let mut req = request("Family of four needs water", 1_000);
        req.location = Some(Location {
            latitude: 14.5995,
            longitude: 120.9842,
        });

        store.upsert(&req).await.unwrap();
        let loaded = store.get(&req.id).await.unwrap().unwrap();

        assert_eq!(loaded, req);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get(&RequestId::from("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_whole_record() {
        let store = SqliteStore::in_memory().unwrap();
        let mut req = request("Road blocked by landslide", 1_000);
        store.upsert(&req).await.unwrap();

        req.status_history
            .push(entry(RequestStatus::Forwarded, 2_000, "relay"));
        req.status = RequestStatus::Forwarded;
        store.upsert(&req).await.unwrap();

        let loaded = store.get(&req.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RequestStatus::Forwarded);
        assert_eq!(loaded.status_history.len(), 2);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = SqliteStore::in_memory().unwrap();
        let old = request("Oldest request here", 1_000);
        let new = request("Newest request here", 3_000);
        let mid = request("Middle request here", 2_000);

        for req in [&old, &new, &mid] {
            store.upsert(req).await.unwrap();
        }

        let ids: Vec<RequestId> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![new.id, mid.id, old.id]);
    }

    #[tokio::test]
    async fn append_sets_status_and_grows_history() {
        let store = SqliteStore::in_memory().unwrap();
        let req = request("Injured hiker on trail", 1_000);
        store.upsert(&req).await.unwrap();

        let updated = store
            .append_status_history(&req.id, entry(RequestStatus::Forwarded, 2_000, "relay"))
            .await
            .unwrap();
        assert_eq!(updated.status, RequestStatus::Forwarded);
        assert_eq!(updated.status_history.len(), 2);

        let updated = store
            .append_status_history(&req.id, entry(RequestStatus::Received, 3_000, "medic"))
            .await
            .unwrap();
        assert_eq!(updated.status, RequestStatus::Received);
        assert_eq!(updated.status_history.len(), 3);
        assert!(updated.status_is_consistent());

        assert_eq!(store.get(&req.id).await.unwrap().unwrap(), updated);
    }

    #[tokio::test]
    async fn append_unknown_id_is_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store
            .append_status_history(
                &RequestId::from("ghost"),
                entry(RequestStatus::Received, 1, "medic"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { ref id } if id.as_str() == "ghost"));
    }

    #[tokio::test]
    async fn concurrent_appends_keep_every_entry() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::connect(&dir.path().join("resq.db"))
            .await
            .unwrap();
        let req = request("Shelter needs blankets", 1_000);
        store.upsert(&req).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let id = req.id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_status_history(
                        &id,
                        entry(RequestStatus::Forwarded, 2_000 + i, &format!("relay-{i}")),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let loaded = store.get(&req.id).await.unwrap().unwrap();
        assert_eq!(loaded.status_history.len(), 21);
        assert_eq!(store.locks.len(), 0);
    }

    #[tokio::test]
    async fn clear_all_reports_count() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert(&request("First request text", 1)).await.unwrap();
        store.upsert(&request("Second request text", 2)).await.unwrap();

        assert_eq!(store.clear_all().await.unwrap(), 2);
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(store.clear_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn corrupt_history_is_reported() {
        let store = SqliteStore::in_memory().unwrap();
        store.init().await.unwrap();

        sqlx::query(
            "INSERT INTO requests (id, timestamp, sender_id, type, description, status, status_history, location)
             VALUES ('bad', 1, 'a', 'info', 'broken row', 'created', 'not json', NULL)",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let err = store.get(&RequestId::from("bad")).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref id, .. } if id == "bad"));
    }

    #[tokio::test]
    async fn literal_null_location_decodes_as_none() {
        let store = SqliteStore::in_memory().unwrap();
        store.init().await.unwrap();

        sqlx::query(
            r#"INSERT INTO requests (id, timestamp, sender_id, type, description, status, status_history, location)
               VALUES ('r', 1, 'a', 'info', 'legacy row', 'created',
                       '[{"status":"created","timestamp":1,"updatedBy":"a"}]', 'null')"#,
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let loaded = store.get(&RequestId::from("r")).await.unwrap().unwrap();
        assert_eq!(loaded.location, None);
        assert_eq!(loaded.status_history.len(), 1);
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resq.db");
        let req = request("Persisted across restarts", 5);

        {
            let store = SqliteStore::connect(&path).await.unwrap();
            store.upsert(&req).await.unwrap();
        }

        let store = SqliteStore::connect(&path).await.unwrap();
        assert_eq!(store.get(&req.id).await.unwrap(), Some(req));
    }

    // ===========================================
    // Settings
    // ===========================================

    #[tokio::test]
    async fn settings_round_trip() {
        let store = SqliteStore::in_memory().unwrap();

        assert_eq!(store.get_value("user_role").await.unwrap(), None);
        store.set_value("user_role", "request_sender").await.unwrap();
        store.set_value("user_role", "request_handler").await.unwrap();
        assert_eq!(
            store.get_value("user_role").await.unwrap().as_deref(),
            Some("request_handler")
        );

        store.remove_value("user_role").await.unwrap();
        assert_eq!(store.get_value("user_role").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_if_absent_keeps_first_writer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resq.db");
        let first = SqliteStore::connect(&path).await.unwrap();
        let second = SqliteStore::connect(&path).await.unwrap();

        assert_eq!(
            first.set_value_if_absent("device_id", "from-first").await.unwrap(),
            "from-first"
        );
        assert_eq!(
            second.set_value_if_absent("device_id", "from-second").await.unwrap(),
            "from-first"
        );
        assert_eq!(
            second.get_value("device_id").await.unwrap().as_deref(),
            Some("from-first")
        );
    }
}
