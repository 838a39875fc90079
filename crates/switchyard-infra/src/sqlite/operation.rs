//! SQLite pending-operation and correlation store.
//!
//! Implements `OperationStore` and `CorrelationStore` from `switchyard-core`.
//! The terminal transition is a single conditional UPDATE on
//! `completed_at IS NULL`; its affected-row count decides who may emit.

use chrono::{DateTime, Utc};
use sqlx::Row;

use switchyard_core::repository::correlation::CorrelationStore;
use switchyard_core::repository::operation::OperationStore;
use switchyard_types::error::RepositoryError;
use switchyard_types::operation::{ExecutionId, PendingOperation, RemoteState};

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `OperationStore` + `CorrelationStore`.
#[derive(Clone)]
pub struct SqliteOperationStore {
    pool: DatabasePool,
}

impl SqliteOperationStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct OperationRow {
    execution_id: String,
    integration: String,
    correlation_key: String,
    correlation_value: String,
    remote_task_id: String,
    kickoff_time: String,
    timeout_secs: i64,
    poll_interval_secs: i64,
    last_known_state: String,
    completed_at: Option<String>,
}

impl OperationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            execution_id: row.try_get("execution_id")?,
            integration: row.try_get("integration")?,
            correlation_key: row.try_get("correlation_key")?,
            correlation_value: row.try_get("correlation_value")?,
            remote_task_id: row.try_get("remote_task_id")?,
            kickoff_time: row.try_get("kickoff_time")?,
            timeout_secs: row.try_get("timeout_secs")?,
            poll_interval_secs: row.try_get("poll_interval_secs")?,
            last_known_state: row.try_get("last_known_state")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_operation(self) -> Result<PendingOperation, RepositoryError> {
        let execution_id = self
            .execution_id
            .parse::<ExecutionId>()
            .map_err(|e| RepositoryError::Query(format!("invalid execution_id: {e}")))?;
        let last_known_state: RemoteState = serde_json::from_str(&self.last_known_state)
            .map_err(|e| RepositoryError::Query(format!("invalid last_known_state: {e}")))?;
        let completed_at = self.completed_at.as_deref().map(parse_datetime).transpose()?;

        Ok(PendingOperation {
            execution_id,
            integration: self.integration,
            correlation_key: self.correlation_key,
            correlation_value: self.correlation_value,
            remote_task_id: self.remote_task_id,
            kickoff_time: parse_datetime(&self.kickoff_time)?,
            timeout_secs: u64::try_from(self.timeout_secs).unwrap_or(0),
            poll_interval_secs: u64::try_from(self.poll_interval_secs).unwrap_or(0),
            last_known_state,
            completed_at,
        })
    }
}

/// SQLite integers are signed; refuse durations that do not fit.
fn seconds_column(value: u64, column: &str) -> Result<i64, RepositoryError> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::Query(format!("{column} out of range: {value}")))
}

fn state_json(state: &RemoteState) -> Result<String, RepositoryError> {
    serde_json::to_string(state)
        .map_err(|e| RepositoryError::Query(format!("failed to serialize state: {e}")))
}

// ---------------------------------------------------------------------------
// OperationStore implementation
// ---------------------------------------------------------------------------

impl OperationStore for SqliteOperationStore {
    async fn create_operation(&self, operation: &PendingOperation) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());
        let result = sqlx::query(
            r#"INSERT INTO pending_operations
               (execution_id, integration, correlation_key, correlation_value, remote_task_id,
                kickoff_time, timeout_secs, poll_interval_secs, last_known_state, completed_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(operation.execution_id.to_string())
        .bind(&operation.integration)
        .bind(&operation.correlation_key)
        .bind(&operation.correlation_value)
        .bind(&operation.remote_task_id)
        .bind(format_datetime(&operation.kickoff_time))
        .bind(seconds_column(operation.timeout_secs, "timeout_secs")?)
        .bind(seconds_column(operation.poll_interval_secs, "poll_interval_secs")?)
        .bind(state_json(&operation.last_known_state)?)
        .bind(operation.completed_at.as_ref().map(format_datetime))
        .bind(&now)
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                RepositoryError::Conflict(format!("operation {} already exists", operation.execution_id)),
            ),
            Err(e) => Err(query_error(e)),
        }
    }

    async fn get_operation(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Option<PendingOperation>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM pending_operations WHERE execution_id = ?")
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let op_row = OperationRow::from_row(&row).map_err(query_error)?;
                Ok(Some(op_row.into_operation()?))
            }
            None => Ok(None),
        }
    }

    async fn list_open(&self, integration: &str) -> Result<Vec<PendingOperation>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM pending_operations
               WHERE integration = ? AND completed_at IS NULL
               ORDER BY kickoff_time"#,
        )
        .bind(integration)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                OperationRow::from_row(row)
                    .map_err(query_error)?
                    .into_operation()
            })
            .collect()
    }

    async fn discard_operation(&self, execution_id: &ExecutionId) -> Result<bool, RepositoryError> {
        let id = execution_id.to_string();
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let removed = sqlx::query(
            "DELETE FROM pending_operations WHERE execution_id = ? AND completed_at IS NULL",
        )
        .bind(&id)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?
        .rows_affected()
            == 1;

        if removed {
            sqlx::query("DELETE FROM correlations WHERE execution_id = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(query_error)?;
        }

        tx.commit().await.map_err(query_error)?;
        Ok(removed)
    }

    async fn update_state(
        &self,
        execution_id: &ExecutionId,
        state: &RemoteState,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE pending_operations SET last_known_state = ?, updated_at = ?
               WHERE execution_id = ? AND completed_at IS NULL"#,
        )
        .bind(state_json(state)?)
        .bind(format_datetime(&Utc::now()))
        .bind(execution_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_operation(
        &self,
        execution_id: &ExecutionId,
        state: &RemoteState,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let completed = format_datetime(&completed_at);
        let result = sqlx::query(
            r#"UPDATE pending_operations
               SET last_known_state = ?, completed_at = ?, updated_at = ?
               WHERE execution_id = ? AND completed_at IS NULL"#,
        )
        .bind(state_json(state)?)
        .bind(&completed)
        .bind(&completed)
        .bind(execution_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }
}

// ---------------------------------------------------------------------------
// CorrelationStore implementation
// ---------------------------------------------------------------------------

impl CorrelationStore for SqliteOperationStore {
    async fn set_correlation(
        &self,
        key: &str,
        value: &str,
        execution_id: &ExecutionId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO correlations (key, value, execution_id, created_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (key, value) DO UPDATE SET execution_id = excluded.execution_id"#,
        )
        .bind(key)
        .bind(value)
        .bind(execution_id.to_string())
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn find_execution_by_correlation(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<ExecutionId>, RepositoryError> {
        let row = sqlx::query("SELECT execution_id FROM correlations WHERE key = ? AND value = ?")
            .bind(key)
            .bind(value)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let id: String = row.try_get("execution_id").map_err(query_error)?;
                let id = id
                    .parse::<ExecutionId>()
                    .map_err(|e| RepositoryError::Query(format!("invalid execution_id: {e}")))?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use switchyard_core::repository::correlation::resolve_first;
    use switchyard_types::operation::RemoteStatus;

    use crate::sqlite::test_pool;

    fn operation() -> PendingOperation {
        PendingOperation {
            execution_id: ExecutionId::new(),
            integration: "deploy".to_string(),
            correlation_key: "deployment".to_string(),
            correlation_value: "Deployments-100".to_string(),
            remote_task_id: "ServerTasks-100".to_string(),
            kickoff_time: Utc::now(),
            timeout_secs: 3600,
            poll_interval_secs: 30,
            last_known_state: RemoteState::new(RemoteStatus::Pending, "Queued"),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_operation() {
        let store = SqliteOperationStore::new(test_pool().await);
        let op = operation();
        store.create_operation(&op).await.unwrap();

        let loaded = store.get_operation(&op.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded.execution_id, op.execution_id);
        assert_eq!(loaded.remote_task_id, "ServerTasks-100");
        assert_eq!(loaded.last_known_state.vendor_state, "Queued");
        assert_eq!(loaded.timeout_secs, 3600);
        assert!(loaded.completed_at.is_none());

        assert!(store.get_operation(&ExecutionId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_is_conflict() {
        let store = SqliteOperationStore::new(test_pool().await);
        let op = operation();
        store.create_operation(&op).await.unwrap();
        let err = store.create_operation(&op).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_complete_is_compare_and_set() {
        let store = SqliteOperationStore::new(test_pool().await);
        let op = operation();
        store.create_operation(&op).await.unwrap();

        let success = RemoteState::new(RemoteStatus::Succeeded, "Success");
        let failure = RemoteState::new(RemoteStatus::Failed, "Failed");

        assert!(store
            .complete_operation(&op.execution_id, &success, Utc::now())
            .await
            .unwrap());
        assert!(!store
            .complete_operation(&op.execution_id, &failure, Utc::now())
            .await
            .unwrap());

        let loaded = store.get_operation(&op.execution_id).await.unwrap().unwrap();
        assert!(loaded.is_complete());
        assert_eq!(loaded.last_known_state.status, RemoteStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_concurrent_completions_have_one_winner() {
        let store = SqliteOperationStore::new(test_pool().await);
        let op = operation();
        store.create_operation(&op).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let id = op.execution_id;
            handles.push(tokio::spawn(async move {
                let state = RemoteState::new(RemoteStatus::Succeeded, "Success");
                store.complete_operation(&id, &state, Utc::now()).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_update_state_is_inert_after_completion() {
        let store = SqliteOperationStore::new(test_pool().await);
        let op = operation();
        store.create_operation(&op).await.unwrap();

        let running = RemoteState::new(RemoteStatus::Running, "Executing");
        assert!(store.update_state(&op.execution_id, &running).await.unwrap());

        let done = RemoteState::new(RemoteStatus::Succeeded, "Success");
        store
            .complete_operation(&op.execution_id, &done, Utc::now())
            .await
            .unwrap();

        assert!(!store.update_state(&op.execution_id, &running).await.unwrap());
        let loaded = store.get_operation(&op.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded.last_known_state.vendor_state, "Success");
    }

    #[tokio::test]
    async fn test_correlation_roundtrip_and_candidates() {
        let store = SqliteOperationStore::new(test_pool().await);
        let id = ExecutionId::new();
        store
            .set_correlation("deployment", "Deployments-100", &id)
            .await
            .unwrap();

        assert_eq!(
            store
                .find_execution_by_correlation("deployment", "Deployments-100")
                .await
                .unwrap(),
            Some(id)
        );
        assert_eq!(
            store
                .find_execution_by_correlation("sandbox_command", "Deployments-100")
                .await
                .unwrap(),
            None
        );

        let candidates = vec!["Deployments-999".to_string(), "Deployments-100".to_string()];
        let resolved = resolve_first(&store, "deployment", &candidates).await.unwrap();
        assert_eq!(resolved, Some(("Deployments-100".to_string(), id)));
    }

    #[tokio::test]
    async fn test_set_correlation_overwrites() {
        let store = SqliteOperationStore::new(test_pool().await);
        let first = ExecutionId::new();
        let second = ExecutionId::new();
        store.set_correlation("deployment", "d-1", &first).await.unwrap();
        store.set_correlation("deployment", "d-1", &second).await.unwrap();
        assert_eq!(
            store
                .find_execution_by_correlation("deployment", "d-1")
                .await
                .unwrap(),
            Some(second)
        );
    }

    #[tokio::test]
    async fn test_list_open_skips_completed_and_other_integrations() {
        let store = SqliteOperationStore::new(test_pool().await);

        let mut older = operation();
        older.kickoff_time = Utc::now() - chrono::Duration::minutes(5);
        let newer = operation();
        let done = operation();
        let mut other = operation();
        other.integration = "sandbox".to_string();
        for op in [&newer, &older, &done, &other] {
            store.create_operation(op).await.unwrap();
        }
        store
            .complete_operation(
                &done.execution_id,
                &RemoteState::new(RemoteStatus::Succeeded, "Success"),
                Utc::now(),
            )
            .await
            .unwrap();

        let open: Vec<ExecutionId> = store
            .list_open("deploy")
            .await
            .unwrap()
            .into_iter()
            .map(|op| op.execution_id)
            .collect();
        assert_eq!(open, vec![older.execution_id, newer.execution_id]);
    }

    #[tokio::test]
    async fn test_discard_removes_pending_operation_and_correlations() {
        let store = SqliteOperationStore::new(test_pool().await);
        let op = operation();
        store.create_operation(&op).await.unwrap();
        store
            .set_correlation("deployment", "Deployments-100", &op.execution_id)
            .await
            .unwrap();

        assert!(store.discard_operation(&op.execution_id).await.unwrap());
        assert!(store.get_operation(&op.execution_id).await.unwrap().is_none());
        assert_eq!(
            store
                .find_execution_by_correlation("deployment", "Deployments-100")
                .await
                .unwrap(),
            None
        );

        // The execution can be started again.
        store.create_operation(&op).await.unwrap();
    }

    #[tokio::test]
    async fn test_discard_keeps_completed_operation() {
        let store = SqliteOperationStore::new(test_pool().await);
        let op = operation();
        store.create_operation(&op).await.unwrap();
        store
            .complete_operation(
                &op.execution_id,
                &RemoteState::new(RemoteStatus::Failed, "Failed"),
                Utc::now(),
            )
            .await
            .unwrap();

        assert!(!store.discard_operation(&op.execution_id).await.unwrap());
        assert!(store.get_operation(&op.execution_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_out_of_range_timeout_is_rejected() {
        let store = SqliteOperationStore::new(test_pool().await);
        let mut op = operation();
        op.timeout_secs = u64::MAX;

        let err = store.create_operation(&op).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Query(m) if m.contains("timeout_secs")));
        assert!(store.get_operation(&op.execution_id).await.unwrap().is_none());
    }
}
