use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chorus_common::{ChorusError, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, warn};

/// File name used when no cache path is configured.
pub const DEFAULT_CACHE_FILE: &str = "model_cache.sqlite3";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS model_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";

fn sqlite_err(context: &'static str) -> impl Fn(rusqlite::Error) -> ChorusError {
    move |e| ChorusError::Cache(format!("SQLite {context} error: {e}"))
}

fn join_err(e: tokio::task::JoinError) -> ChorusError {
    ChorusError::Cache(format!("spawn_blocking error: {e}"))
}

/// Handle to an open cache database.
///
/// SQLite calls run on the blocking pool so the async runtime is never
/// stalled by disk I/O.
pub struct CacheStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl CacheStore {
    /// Open (or create) the cache database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            if let Some(parent) = open_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(&open_path).map_err(sqlite_err("open"))?;
            conn.execute(CREATE_TABLE, []).map_err(sqlite_err("create table"))?;
            Ok(conn)
        })
        .await
        .map_err(join_err)??;

        debug!(path = %path.display(), "Opened model cache");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// A throwaway in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sqlite_err("open"))?;
        conn.execute(CREATE_TABLE, []).map_err(sqlite_err("create table"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT value FROM model_cache WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(sqlite_err("query"))
        })
        .await
    }

    /// Look up several keys at once. Missing keys are absent from the map.
    pub async fn get_many(&self, keys: Vec<String>) -> Result<HashMap<String, String>> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare_cached("SELECT value FROM model_cache WHERE key = ?1")
                .map_err(sqlite_err("prepare"))?;

            let mut found = HashMap::new();
            for key in keys {
                let value = stmt
                    .query_row(rusqlite::params![key], |row| row.get::<_, String>(0))
                    .optional()
                    .map_err(sqlite_err("query"))?;
                if let Some(value) = value {
                    found.insert(key, value);
                }
            }
            Ok(found)
        })
        .await
    }

    /// Write `entries` in one transaction, in order. Returns the number
    /// of rows written.
    pub async fn commit(&self, entries: Vec<(String, String)>) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| ChorusError::Cache(format!("lock error: {e}")))?;

            let tx = conn.transaction().map_err(sqlite_err("begin"))?;
            {
                let mut stmt = tx
                    .prepare_cached("INSERT OR REPLACE INTO model_cache (key, value) VALUES (?1, ?2)")
                    .map_err(sqlite_err("prepare"))?;
                for (key, value) in &entries {
                    stmt.execute(rusqlite::params![key, value])
                        .map_err(sqlite_err("insert"))?;
                }
            }
            tx.commit().map_err(sqlite_err("commit"))?;
            Ok(entries.len())
        })
        .await
        .map_err(join_err)?
    }

    pub async fn len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM model_cache", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .map_err(sqlite_err("count"))
        })
        .await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn clear(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM model_cache", [])
                .map(|_| ())
                .map_err(sqlite_err("delete"))
        })
        .await
    }

    /// Close the database, surfacing any error SQLite reports on close.
    pub async fn close(self) -> Result<()> {
        let Ok(mutex) = Arc::try_unwrap(self.conn) else {
            warn!("Model cache still shared at close, leaving it to the last handle");
            return Ok(());
        };
        let conn = mutex
            .into_inner()
            .map_err(|e| ChorusError::Cache(format!("lock error: {e}")))?;

        tokio::task::spawn_blocking(move || conn.close().map_err(|(_, e)| sqlite_err("close")(e)))
            .await
            .map_err(join_err)?
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| ChorusError::Cache(format!("lock error: {e}")))?;
            f(&conn)
        })
        .await
        .map_err(join_err)?
    }
}
