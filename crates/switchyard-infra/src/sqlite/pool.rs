//! SQLite connection pools.
//!
//! One writer connection serializes every INSERT/UPDATE/DELETE, including
//! the conditional completion writes that race between the poll and webhook
//! paths. Reads go through a separate read-only pool so status lookups never
//! queue behind a write.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

const SQLITE_SCHEME: &str = "sqlite://";

/// Tunables for [`DatabasePool::connect`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub reader_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            reader_connections: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Reader/writer pool pair over one WAL-mode database file.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open with default settings and apply pending migrations.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::connect(database_url, &PoolSettings::default()).await
    }

    pub async fn connect(database_url: &str, settings: &PoolSettings) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(settings.busy_timeout)
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;

        // The read-only pool cannot create tables.
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(settings.reader_connections.max(1))
            .connect_with(options.read_only(true))
            .await?;

        tracing::debug!(
            database_url,
            readers = settings.reader_connections,
            "database pool ready"
        );
        Ok(Self { reader, writer })
    }

    /// Close both pools, waiting for checked-out connections.
    pub async fn close(&self) {
        self.reader.close().await;
        self.writer.close().await;
    }
}

/// Database URL under `data_dir`, or `{home}/.switchyard` when unset.
pub fn database_url_for(data_dir: Option<&str>, home: Option<&str>) -> String {
    let dir = match data_dir.filter(|d| !d.is_empty()) {
        Some(dir) => dir.trim_end_matches('/').to_string(),
        None => format!("{}/.switchyard", home.unwrap_or(".")),
    };
    format!("{SQLITE_SCHEME}{dir}/switchyard.db")
}

/// [`database_url_for`] with `SWITCHYARD_DATA_DIR` and `HOME` from the
/// environment.
pub fn default_database_url() -> String {
    let data_dir = std::env::var("SWITCHYARD_DATA_DIR").ok();
    let home = std::env::var("HOME").ok();
    database_url_for(data_dir.as_deref(), home.as_deref())
}

/// Create the parent directory of a file-backed SQLite URL.
///
/// In-memory and non-SQLite URLs are left alone.
pub async fn ensure_parent_dir(database_url: &str) -> std::io::Result<()> {
    let Some(path) = database_url.strip_prefix(SQLITE_SCHEME) else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }
    match Path::new(path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => tokio::fs::create_dir_all(dir).await,
        _ => Ok(()),
    }
}
