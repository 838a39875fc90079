//! Webhook secret channel trait definition.
//!
//! Secrets are stored apart from [`PhysicalWebhookRegistration`] records so
//! that registrations can be compared and logged without exposing them.
//!
//! [`PhysicalWebhookRegistration`]: switchyard_types::subscription::PhysicalWebhookRegistration

use switchyard_types::error::RepositoryError;
use switchyard_types::secret::Redacted;
use switchyard_types::subscription::RegistrationId;

pub trait WebhookSecretStore: Send + Sync {
    /// Returns None if no secret has been stored for the registration.
    fn get_secret(
        &self,
        registration_id: &RegistrationId,
    ) -> impl std::future::Future<Output = Result<Option<Redacted>, RepositoryError>> + Send;

    fn set_secret(
        &self,
        registration_id: &RegistrationId,
        secret: &Redacted,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn delete_secret(
        &self,
        registration_id: &RegistrationId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
