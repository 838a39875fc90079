//! SQLite persistence.
//!
//! All stores share one [`pool::DatabasePool`]. Timestamps are RFC 3339
//! text; structured columns are JSON text.

pub mod operation;
pub mod pool;
pub mod registration;

use chrono::{DateTime, Utc};

use switchyard_types::error::RepositoryError;

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> pool::DatabasePool {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    std::mem::forget(dir);
    pool::DatabasePool::new(&url).await.unwrap()
}
