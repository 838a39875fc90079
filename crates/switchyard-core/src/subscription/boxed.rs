//! BoxRegistrationManager -- object-safe dynamic dispatch wrapper for
//! [`RegistrationManager`].
//!
//! Each integration's manager is generic over its own reconciler, so the
//! host stores them type-erased:
//! 1. `RegistrationManagerDyn` is object-safe with boxed futures
//! 2. a blanket impl covers every `RegistrationManager<R, S>`
//! 3. `BoxRegistrationManager` wraps `Arc<dyn RegistrationManagerDyn>` and delegates

use std::sync::Arc;

use futures_util::future::BoxFuture;

use switchyard_types::subscription::{
    PhysicalWebhookRegistration, RegistrationId, WebhookSubscriptionRequest,
};

use crate::repository::registration::RegistrationStore;

use super::manager::{Attachment, DetachOutcome, RegistrationManager};
use super::reconciler::{SubscriptionError, SubscriptionReconciler};

/// Object-safe version of [`RegistrationManager`]'s public operations.
pub trait RegistrationManagerDyn: Send + Sync {
    fn integration(&self) -> &str;

    fn attach_boxed<'a>(
        &'a self,
        trigger_id: &'a str,
        account: &'a str,
        request: &'a WebhookSubscriptionRequest,
    ) -> BoxFuture<'a, Result<Attachment, SubscriptionError>>;

    fn detach_boxed<'a>(
        &'a self,
        trigger_id: &'a str,
        account: &'a str,
    ) -> BoxFuture<'a, Result<DetachOutcome, SubscriptionError>>;

    fn registration_boxed<'a>(
        &'a self,
        id: &'a RegistrationId,
    ) -> BoxFuture<'a, Result<Option<PhysicalWebhookRegistration>, SubscriptionError>>;
}

impl<R, S> RegistrationManagerDyn for RegistrationManager<R, S>
where
    R: SubscriptionReconciler,
    S: RegistrationStore,
{
    fn integration(&self) -> &str {
        RegistrationManager::integration(self)
    }

    fn attach_boxed<'a>(
        &'a self,
        trigger_id: &'a str,
        account: &'a str,
        request: &'a WebhookSubscriptionRequest,
    ) -> BoxFuture<'a, Result<Attachment, SubscriptionError>> {
        Box::pin(self.attach(trigger_id, account, request))
    }

    fn detach_boxed<'a>(
        &'a self,
        trigger_id: &'a str,
        account: &'a str,
    ) -> BoxFuture<'a, Result<DetachOutcome, SubscriptionError>> {
        Box::pin(self.detach(trigger_id, account))
    }

    fn registration_boxed<'a>(
        &'a self,
        id: &'a RegistrationId,
    ) -> BoxFuture<'a, Result<Option<PhysicalWebhookRegistration>, SubscriptionError>> {
        Box::pin(self.registration(id))
    }
}

/// Type-erased, cheaply cloneable registration manager.
#[derive(Clone)]
pub struct BoxRegistrationManager {
    inner: Arc<dyn RegistrationManagerDyn>,
}

impl BoxRegistrationManager {
    pub fn new<R, S>(manager: RegistrationManager<R, S>) -> Self
    where
        R: SubscriptionReconciler + 'static,
        S: RegistrationStore + 'static,
    {
        Self {
            inner: Arc::new(manager),
        }
    }

    pub fn integration(&self) -> &str {
        self.inner.integration()
    }

    pub async fn attach(
        &self,
        trigger_id: &str,
        account: &str,
        request: &WebhookSubscriptionRequest,
    ) -> Result<Attachment, SubscriptionError> {
        self.inner.attach_boxed(trigger_id, account, request).await
    }

    pub async fn detach(
        &self,
        trigger_id: &str,
        account: &str,
    ) -> Result<DetachOutcome, SubscriptionError> {
        self.inner.detach_boxed(trigger_id, account).await
    }

    pub async fn registration(
        &self,
        id: &RegistrationId,
    ) -> Result<Option<PhysicalWebhookRegistration>, SubscriptionError> {
        self.inner.registration_boxed(id).await
    }
}
