//! Physical webhook registration repository trait definition.

use switchyard_types::error::RepositoryError;
use switchyard_types::subscription::{PhysicalWebhookRegistration, RegistrationId};

pub trait RegistrationStore: Send + Sync {
    fn get_registration(
        &self,
        id: &RegistrationId,
    ) -> impl std::future::Future<Output = Result<Option<PhysicalWebhookRegistration>, RepositoryError>>
    + Send;

    /// The registration shared by all triggers of `integration` on `account`.
    fn find_registration(
        &self,
        integration: &str,
        account: &str,
    ) -> impl std::future::Future<Output = Result<Option<PhysicalWebhookRegistration>, RepositoryError>>
    + Send;

    /// Insert or replace a registration (keyed by id).
    fn save_registration(
        &self,
        registration: &PhysicalWebhookRegistration,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a registration. Returns whether a row was removed.
    fn delete_registration(
        &self,
        id: &RegistrationId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
