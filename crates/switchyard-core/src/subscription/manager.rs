//! Registration manager: multiplexes trigger subscriptions onto one physical
//! webhook registration per (integration, account).
//!
//! Coverage only widens while any trigger references a registration; the
//! remote subscription is deleted when the last reference is released.
//!
//! A registration row is saved before its first setup runs, with no metadata
//! and no triggers. A retried attach after a failed or interrupted setup
//! picks that row up again, so the reconciler sees the same registration id
//! and can adopt the remote subscription by its deterministic name.

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use switchyard_types::subscription::{
    PhysicalWebhookRegistration, RegistrationId, WebhookSubscriptionRequest,
};

use crate::repository::registration::RegistrationStore;

use super::reconciler::{CleanupContext, SetupContext, SubscriptionError, SubscriptionReconciler};

/// How an attach was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachOutcome {
    /// A new physical registration was provisioned.
    Created,
    /// The existing registration already covered the request.
    Reused,
    /// The existing registration was widened to cover the request.
    Widened,
}

/// Result of [`RegistrationManager::attach`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub registration_id: RegistrationId,
    pub url: String,
    pub outcome: AttachOutcome,
    pub covered: WebhookSubscriptionRequest,
}

/// Result of [`RegistrationManager::detach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DetachOutcome {
    /// The trigger did not reference a registration for this account.
    NotAttached,
    /// The reference was dropped; other triggers keep the registration alive.
    Released { remaining: usize },
    /// The last reference was dropped and the registration torn down.
    Removed,
}

pub struct RegistrationManager<R, S> {
    integration: String,
    public_base_url: String,
    reconciler: R,
    store: S,
    /// Serializes attach/detach so read-modify-write of a registration
    /// cannot interleave within this process.
    lock: Mutex<()>,
}

impl<R, S> RegistrationManager<R, S>
where
    R: SubscriptionReconciler,
    S: RegistrationStore,
{
    pub fn new(
        integration: impl Into<String>,
        public_base_url: impl Into<String>,
        reconciler: R,
        store: S,
    ) -> Self {
        Self {
            integration: integration.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            reconciler,
            store,
            lock: Mutex::new(()),
        }
    }

    pub fn integration(&self) -> &str {
        &self.integration
    }

    /// Public URL the vendor delivers to for a registration.
    pub fn webhook_url(&self, id: &RegistrationId) -> String {
        format!("{}/webhooks/{id}", self.public_base_url)
    }

    /// Make `trigger_id` a user of the account's registration, provisioning
    /// or widening it as needed.
    pub async fn attach(
        &self,
        trigger_id: &str,
        account: &str,
        request: &WebhookSubscriptionRequest,
    ) -> Result<Attachment, SubscriptionError> {
        let _guard = self.lock.lock().await;

        let mut registration = match self
            .store
            .find_registration(&self.integration, account)
            .await?
        {
            Some(registration) => registration,
            None => self.reserve(account, request).await?,
        };
        if registration.metadata.is_none() {
            return self.provision(registration, trigger_id, request).await;
        }

        let outcome = if self
            .reconciler
            .compare_config(&registration.covered, request)
        {
            AttachOutcome::Reused
        } else {
            let merged = self.reconciler.merge(&registration.covered, request);
            if merged.changed {
                let metadata = self
                    .reconciler
                    .setup(&SetupContext {
                        registration_id: &registration.id,
                        url: &registration.url,
                        config: &merged.config,
                        metadata: registration.metadata.as_ref(),
                    })
                    .await?;
                registration.covered = merged.config;
                registration.metadata = Some(metadata);
                AttachOutcome::Widened
            } else {
                AttachOutcome::Reused
            }
        };

        let inserted = registration.triggers.insert(trigger_id.to_string());
        if inserted || outcome == AttachOutcome::Widened {
            registration.updated_at = Utc::now();
            self.store.save_registration(&registration).await?;
        }

        tracing::info!(
            integration = %self.integration,
            account,
            trigger_id,
            registration_id = %registration.id,
            outcome = ?outcome,
            triggers = registration.triggers.len(),
            "trigger attached to webhook registration"
        );

        Ok(Attachment {
            registration_id: registration.id,
            url: registration.url,
            outcome,
            covered: registration.covered,
        })
    }

    /// Drop `trigger_id`'s reference; tear down on the last one.
    pub async fn detach(
        &self,
        trigger_id: &str,
        account: &str,
    ) -> Result<DetachOutcome, SubscriptionError> {
        let _guard = self.lock.lock().await;

        let Some(mut registration) = self
            .store
            .find_registration(&self.integration, account)
            .await?
        else {
            return Ok(DetachOutcome::NotAttached);
        };

        if !registration.triggers.remove(trigger_id) {
            return Ok(DetachOutcome::NotAttached);
        }

        if !registration.triggers.is_empty() {
            registration.updated_at = Utc::now();
            self.store.save_registration(&registration).await?;
            let remaining = registration.triggers.len();
            tracing::info!(
                integration = %self.integration,
                account,
                trigger_id,
                registration_id = %registration.id,
                remaining,
                "trigger released webhook registration"
            );
            return Ok(DetachOutcome::Released { remaining });
        }

        self.reconciler
            .cleanup(&CleanupContext {
                registration_id: &registration.id,
                metadata: registration.metadata.as_ref(),
            })
            .await?;
        self.store.delete_registration(&registration.id).await?;

        tracing::info!(
            integration = %self.integration,
            account,
            registration_id = %registration.id,
            "webhook registration removed"
        );
        Ok(DetachOutcome::Removed)
    }

    /// Load a registration by id.
    pub async fn registration(
        &self,
        id: &RegistrationId,
    ) -> Result<Option<PhysicalWebhookRegistration>, SubscriptionError> {
        Ok(self.store.get_registration(id).await?)
    }

    /// Save a registration that has not been set up yet.
    async fn reserve(
        &self,
        account: &str,
        request: &WebhookSubscriptionRequest,
    ) -> Result<PhysicalWebhookRegistration, SubscriptionError> {
        let id = RegistrationId::new();
        let url = self.webhook_url(&id);
        let registration =
            PhysicalWebhookRegistration::new(id, &self.integration, account, &url, request.clone());
        self.store.save_registration(&registration).await?;
        Ok(registration)
    }

    /// First successful setup of a reserved registration.
    async fn provision(
        &self,
        mut registration: PhysicalWebhookRegistration,
        trigger_id: &str,
        request: &WebhookSubscriptionRequest,
    ) -> Result<Attachment, SubscriptionError> {
        // A retry may ask for more than the attempt that reserved the row.
        let config = self.reconciler.merge(&registration.covered, request).config;

        let metadata = self
            .reconciler
            .setup(&SetupContext {
                registration_id: &registration.id,
                url: &registration.url,
                config: &config,
                metadata: None,
            })
            .await?;

        registration.covered = config;
        registration.metadata = Some(metadata);
        registration.triggers.insert(trigger_id.to_string());
        registration.updated_at = Utc::now();
        self.store.save_registration(&registration).await?;

        tracing::info!(
            integration = %self.integration,
            account = %registration.account,
            trigger_id,
            registration_id = %registration.id,
            "webhook registration created"
        );

        Ok(Attachment {
            registration_id: registration.id,
            url: registration.url,
            outcome: AttachOutcome::Created,
            covered: registration.covered,
        })
    }
}
