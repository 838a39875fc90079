//! Pending operation repository trait definition.

use chrono::{DateTime, Utc};

use switchyard_types::error::RepositoryError;
use switchyard_types::operation::{ExecutionId, PendingOperation, RemoteState};

/// Persistence for [`PendingOperation`] records.
///
/// Poll ticks and webhook deliveries for the same operation may run
/// concurrently with no mutual exclusion, so the terminal transition must be
/// a compare-and-set on `completed_at`.
pub trait OperationStore: Send + Sync {
    /// Persist a freshly kicked-off operation.
    /// Returns `Conflict` if the execution already has an operation.
    fn create_operation(
        &self,
        operation: &PendingOperation,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_operation(
        &self,
        execution_id: &ExecutionId,
    ) -> impl std::future::Future<Output = Result<Option<PendingOperation>, RepositoryError>> + Send;

    /// Operations of `integration` that have not completed, oldest first.
    fn list_open(
        &self,
        integration: &str,
    ) -> impl std::future::Future<Output = Result<Vec<PendingOperation>, RepositoryError>> + Send;

    /// Remove a still-pending operation together with every correlation
    /// pointing at it. Completed operations are kept.
    ///
    /// Returns whether an operation was removed.
    fn discard_operation(
        &self,
        execution_id: &ExecutionId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Record a non-terminal observation. Inert once the operation is complete.
    ///
    /// Returns whether a row was updated.
    fn update_state(
        &self,
        execution_id: &ExecutionId,
        state: &RemoteState,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Persist the final state and set `completed_at`, only if no other
    /// caller has done so already.
    ///
    /// Returns `true` iff this call performed the terminal transition. The
    /// caller that gets `true` is the only one allowed to emit.
    fn complete_operation(
        &self,
        execution_id: &ExecutionId,
        state: &RemoteState,
        completed_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
