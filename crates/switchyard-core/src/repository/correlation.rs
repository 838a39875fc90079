//! Execution correlation store trait definition.
//!
//! Maps a vendor-issued id (deployment id, command id) to the execution that
//! started the remote operation, so a webhook that arrives with no execution
//! context can find its way back.

use switchyard_types::error::RepositoryError;
use switchyard_types::operation::ExecutionId;

pub trait CorrelationStore: Send + Sync {
    /// Record `key`/`value` -> `execution_id`. Overwrites an existing entry.
    fn set_correlation(
        &self,
        key: &str,
        value: &str,
        execution_id: &ExecutionId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Look up the execution for `key`/`value`. `None` when unknown.
    fn find_execution_by_correlation(
        &self,
        key: &str,
        value: &str,
    ) -> impl std::future::Future<Output = Result<Option<ExecutionId>, RepositoryError>> + Send;
}

/// Try each candidate value in order and return the first that resolves.
///
/// Vendor events often enumerate several related ids; misses on the others
/// are expected and not errors.
pub async fn resolve_first<S: CorrelationStore>(
    store: &S,
    key: &str,
    candidates: &[String],
) -> Result<Option<(String, ExecutionId)>, RepositoryError> {
    for candidate in candidates {
        if let Some(execution_id) = store.find_execution_by_correlation(key, candidate).await? {
            return Ok(Some((candidate.clone(), execution_id)));
        }
        tracing::trace!(key, candidate = %candidate, "correlation candidate did not resolve");
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapStore {
        entries: Mutex<HashMap<(String, String), ExecutionId>>,
    }

    impl CorrelationStore for MapStore {
        async fn set_correlation(
            &self,
            key: &str,
            value: &str,
            execution_id: &ExecutionId,
        ) -> Result<(), RepositoryError> {
            self.entries
                .lock()
                .unwrap()
                .insert((key.to_string(), value.to_string()), *execution_id);
            Ok(())
        }

        async fn find_execution_by_correlation(
            &self,
            key: &str,
            value: &str,
        ) -> Result<Option<ExecutionId>, RepositoryError> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(&(key.to_string(), value.to_string()))
                .copied())
        }
    }

    #[tokio::test]
    async fn test_resolve_first_skips_unresolvable_candidates() {
        let store = MapStore::default();
        let id = ExecutionId::new();
        store.set_correlation("deployment", "dep-100", &id).await.unwrap();

        let candidates = vec!["dep-999".to_string(), "dep-100".to_string()];
        let resolved = resolve_first(&store, "deployment", &candidates).await.unwrap();
        assert_eq!(resolved, Some(("dep-100".to_string(), id)));
    }

    #[tokio::test]
    async fn test_resolve_first_none_when_nothing_matches() {
        let store = MapStore::default();
        let candidates = vec!["dep-1".to_string(), "dep-2".to_string()];
        assert_eq!(
            resolve_first(&store, "deployment", &candidates).await.unwrap(),
            None
        );
        assert_eq!(resolve_first(&store, "deployment", &[]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolve_first_is_scoped_by_key() {
        let store = MapStore::default();
        store
            .set_correlation("sandbox_command", "dep-100", &ExecutionId::new())
            .await
            .unwrap();
        let candidates = vec!["dep-100".to_string()];
        assert_eq!(
            resolve_first(&store, "deployment", &candidates).await.unwrap(),
            None
        );
    }
}
