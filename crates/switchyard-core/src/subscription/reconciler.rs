//! Webhook registration reconciler.
//!
//! Drives idempotent create / update / delete of one remote subscription per
//! physical registration. Recovery from a crash between the remote create
//! and the local persist goes through the deterministic remote name: setup
//! without local metadata searches the vendor by name before creating.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use thiserror::Error;

use switchyard_types::error::{RepositoryError, VendorError};
use switchyard_types::secret::Redacted;
use switchyard_types::subscription::{
    RegistrationId, SubscriptionMetadata, WebhookSubscriptionRequest,
};

use crate::repository::secret::WebhookSecretStore;
use crate::vendor::subscription::{RemoteSubscriptionSpec, SubscriptionApi};

use super::merge::{self, Merged};

/// Number of random bytes in a generated webhook secret.
const SECRET_BYTES: usize = 32;

/// Errors from subscription setup and cleanup.
///
/// Vendor errors propagate unmodified.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    Vendor(#[from] VendorError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Inputs to [`SubscriptionReconciler::setup`].
#[derive(Debug, Clone, Copy)]
pub struct SetupContext<'a> {
    pub registration_id: &'a RegistrationId,
    pub url: &'a str,
    /// The (possibly merged) configuration the remote side must cover.
    pub config: &'a WebhookSubscriptionRequest,
    /// Metadata from a previous successful setup, if any.
    pub metadata: Option<&'a SubscriptionMetadata>,
}

/// Inputs to [`SubscriptionReconciler::cleanup`].
#[derive(Debug, Clone, Copy)]
pub struct CleanupContext<'a> {
    pub registration_id: &'a RegistrationId,
    pub metadata: Option<&'a SubscriptionMetadata>,
}

/// Per-integration capability for reconciling remote subscriptions.
///
/// `compare_config` and `merge` default to the "empty filter = match all"
/// rules in [`merge`](super::merge); integrations with vendor-specific
/// coverage semantics may override them.
pub trait SubscriptionReconciler: Send + Sync {
    fn compare_config(
        &self,
        existing: &WebhookSubscriptionRequest,
        requested: &WebhookSubscriptionRequest,
    ) -> bool {
        merge::compare_config(existing, requested)
    }

    fn merge(
        &self,
        current: &WebhookSubscriptionRequest,
        requested: &WebhookSubscriptionRequest,
    ) -> Merged {
        merge::merge(current, requested)
    }

    /// Ensure the remote subscription exists for `ctx.config`.
    fn setup(
        &self,
        ctx: &SetupContext<'_>,
    ) -> impl std::future::Future<Output = Result<SubscriptionMetadata, SubscriptionError>> + Send;

    /// Delete the remote subscription. Not-found and absent metadata are
    /// both success.
    fn cleanup(
        &self,
        ctx: &CleanupContext<'_>,
    ) -> impl std::future::Future<Output = Result<(), SubscriptionError>> + Send;
}

/// Deterministic remote name for a registration.
pub fn remote_name(registration_id: &RegistrationId) -> String {
    format!("switchyard-{registration_id}")
}

/// Generate a fresh random webhook secret (URL-safe base64, no padding).
pub fn generate_secret() -> Redacted {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    Redacted::new(URL_SAFE_NO_PAD.encode(bytes))
}

/// Reconciler over a vendor [`SubscriptionApi`] and the secret channel.
pub struct RemoteReconciler<A, K> {
    api: A,
    secrets: K,
}

impl<A, K> RemoteReconciler<A, K>
where
    A: SubscriptionApi,
    K: WebhookSecretStore,
{
    pub fn new(api: A, secrets: K) -> Self {
        Self { api, secrets }
    }

    /// Reuse the stored secret, or generate one if none is stored yet.
    async fn secret_for(&self, id: &RegistrationId) -> Result<Redacted, SubscriptionError> {
        match self.secrets.get_secret(id).await? {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => {
                tracing::debug!(registration_id = %id, "generating webhook secret");
                Ok(generate_secret())
            }
        }
    }
}

impl<A, K> SubscriptionReconciler for RemoteReconciler<A, K>
where
    A: SubscriptionApi,
    K: WebhookSecretStore,
{
    async fn setup(&self, ctx: &SetupContext<'_>) -> Result<SubscriptionMetadata, SubscriptionError> {
        let name = remote_name(ctx.registration_id);

        let known_remote_id = match ctx.metadata {
            Some(metadata) => Some(metadata.remote_id.clone()),
            None => {
                let orphan = self.api.find_subscription_by_name(&name).await?;
                if let Some(ref found) = orphan {
                    tracing::warn!(
                        registration_id = %ctx.registration_id,
                        remote_id = %found.id,
                        "adopting remote subscription left by an interrupted setup"
                    );
                }
                orphan.map(|s| s.id)
            }
        };

        let secret = self.secret_for(ctx.registration_id).await?;
        let spec = RemoteSubscriptionSpec {
            name: &name,
            url: ctx.url,
            secret: &secret,
            config: ctx.config,
        };

        let remote = match known_remote_id {
            Some(remote_id) => match self.api.update_subscription(&remote_id, &spec).await {
                Ok(remote) => remote,
                Err(VendorError::NotFound(_)) => {
                    tracing::warn!(
                        registration_id = %ctx.registration_id,
                        remote_id = %remote_id,
                        "remote subscription vanished, recreating"
                    );
                    self.api.create_subscription(&spec).await?
                }
                Err(e) => return Err(e.into()),
            },
            None => self.api.create_subscription(&spec).await?,
        };

        self.secrets.set_secret(ctx.registration_id, &secret).await?;

        tracing::info!(
            registration_id = %ctx.registration_id,
            remote_id = %remote.id,
            events = ctx.config.events.len(),
            "remote subscription reconciled"
        );
        Ok(remote.into_metadata())
    }

    async fn cleanup(&self, ctx: &CleanupContext<'_>) -> Result<(), SubscriptionError> {
        let Some(metadata) = ctx.metadata else {
            return Ok(());
        };

        match self.api.delete_subscription(metadata).await {
            Ok(()) => {}
            Err(VendorError::NotFound(_)) => {
                tracing::debug!(
                    registration_id = %ctx.registration_id,
                    remote_id = %metadata.remote_id,
                    "remote subscription already gone"
                );
            }
            Err(e) => return Err(e.into()),
        }

        self.secrets.delete_secret(ctx.registration_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::vendor::subscription::RemoteSubscription;

    // -----------------------------------------------------------------------
    // Mock vendor API
    // -----------------------------------------------------------------------

    #[derive(Debug, Clone)]
    struct StoredSubscription {
        name: String,
        secret: String,
        config: WebhookSubscriptionRequest,
    }

    #[derive(Default)]
    struct MockApi {
        subs: Mutex<HashMap<String, StoredSubscription>>,
        next_id: Mutex<u32>,
        calls: Mutex<Vec<&'static str>>,
        fail_create: Mutex<Option<VendorError>>,
        fail_delete: Mutex<Option<VendorError>>,
    }

    impl MockApi {
        fn insert(&self, id: &str, name: &str) {
            self.subs.lock().unwrap().insert(
                id.to_string(),
                StoredSubscription {
                    name: name.to_string(),
                    secret: "stale".to_string(),
                    config: WebhookSubscriptionRequest::default(),
                },
            );
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn remote(&self, spec: &RemoteSubscriptionSpec<'_>, id: String) -> RemoteSubscription {
            self.subs.lock().unwrap().insert(
                id.clone(),
                StoredSubscription {
                    name: spec.name.to_string(),
                    secret: spec.secret.expose().to_string(),
                    config: spec.config.clone(),
                },
            );
            RemoteSubscription {
                id,
                name: spec.name.to_string(),
                scope_id: Some("Spaces-1".to_string()),
            }
        }
    }

    impl SubscriptionApi for MockApi {
        async fn find_subscription_by_name(
            &self,
            name: &str,
        ) -> Result<Option<RemoteSubscription>, VendorError> {
            self.calls.lock().unwrap().push("find");
            Ok(self
                .subs
                .lock()
                .unwrap()
                .iter()
                .find(|(_, s)| s.name == name)
                .map(|(id, s)| RemoteSubscription {
                    id: id.clone(),
                    name: s.name.clone(),
                    scope_id: Some("Spaces-1".to_string()),
                }))
        }

        async fn create_subscription(
            &self,
            spec: &RemoteSubscriptionSpec<'_>,
        ) -> Result<RemoteSubscription, VendorError> {
            self.calls.lock().unwrap().push("create");
            if let Some(err) = self.fail_create.lock().unwrap().take() {
                return Err(err);
            }
            let id = {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                format!("Subscriptions-{next}")
            };
            Ok(self.remote(spec, id))
        }

        async fn update_subscription(
            &self,
            remote_id: &str,
            spec: &RemoteSubscriptionSpec<'_>,
        ) -> Result<RemoteSubscription, VendorError> {
            self.calls.lock().unwrap().push("update");
            if !self.subs.lock().unwrap().contains_key(remote_id) {
                return Err(VendorError::NotFound(remote_id.to_string()));
            }
            Ok(self.remote(spec, remote_id.to_string()))
        }

        async fn delete_subscription(
            &self,
            metadata: &SubscriptionMetadata,
        ) -> Result<(), VendorError> {
            self.calls.lock().unwrap().push("delete");
            if let Some(err) = self.fail_delete.lock().unwrap().take() {
                return Err(err);
            }
            match self.subs.lock().unwrap().remove(&metadata.remote_id) {
                Some(_) => Ok(()),
                None => Err(VendorError::NotFound(metadata.remote_id.clone())),
            }
        }
    }

    #[derive(Default)]
    struct MockSecrets {
        secrets: Mutex<HashMap<RegistrationId, String>>,
    }

    impl WebhookSecretStore for MockSecrets {
        async fn get_secret(&self, id: &RegistrationId) -> Result<Option<Redacted>, RepositoryError> {
            Ok(self.secrets.lock().unwrap().get(id).map(Redacted::new))
        }

        async fn set_secret(&self, id: &RegistrationId, secret: &Redacted) -> Result<(), RepositoryError> {
            self.secrets
                .lock()
                .unwrap()
                .insert(*id, secret.expose().to_string());
            Ok(())
        }

        async fn delete_secret(&self, id: &RegistrationId) -> Result<(), RepositoryError> {
            self.secrets.lock().unwrap().remove(id);
            Ok(())
        }
    }

    fn reconciler() -> RemoteReconciler<MockApi, MockSecrets> {
        RemoteReconciler::new(MockApi::default(), MockSecrets::default())
    }

    fn request() -> WebhookSubscriptionRequest {
        WebhookSubscriptionRequest::new(["DeploymentSucceeded", "DeploymentFailed"])
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_remote_name_is_deterministic() {
        let id = RegistrationId::new();
        assert_eq!(remote_name(&id), remote_name(&id));
        assert!(remote_name(&id).starts_with("switchyard-"));
    }

    #[test]
    fn test_generated_secrets_are_distinct() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a.expose(), b.expose());
        assert_eq!(a.expose().len(), 43);
    }

    #[tokio::test]
    async fn test_setup_creates_and_persists_secret() {
        let rec = reconciler();
        let id = RegistrationId::new();
        let config = request();

        let metadata = rec
            .setup(&SetupContext {
                registration_id: &id,
                url: "https://hooks.example.com/webhooks/1",
                config: &config,
                metadata: None,
            })
            .await
            .unwrap();

        assert_eq!(metadata.remote_id, "Subscriptions-1");
        assert_eq!(metadata.scope_id.as_deref(), Some("Spaces-1"));
        assert_eq!(rec.api.calls(), vec!["find", "create"]);

        let stored = rec.secrets.get_secret(&id).await.unwrap().unwrap();
        let remote = rec.api.subs.lock().unwrap()["Subscriptions-1"].clone();
        assert_eq!(remote.secret, stored.expose());
        assert_eq!(remote.config, config);
    }

    #[tokio::test]
    async fn test_setup_adopts_orphan_by_name() {
        let rec = reconciler();
        let id = RegistrationId::new();
        rec.api.insert("Subscriptions-42", &remote_name(&id));

        let metadata = rec
            .setup(&SetupContext {
                registration_id: &id,
                url: "https://hooks.example.com/webhooks/1",
                config: &request(),
                metadata: None,
            })
            .await
            .unwrap();

        assert_eq!(metadata.remote_id, "Subscriptions-42");
        assert_eq!(rec.api.calls(), vec!["find", "update"]);
        assert_eq!(rec.api.subs.lock().unwrap().len(), 1);
        // The orphan's secret is replaced by the one now persisted locally.
        let stored = rec.secrets.get_secret(&id).await.unwrap().unwrap();
        assert_eq!(
            rec.api.subs.lock().unwrap()["Subscriptions-42"].secret,
            stored.expose()
        );
    }

    #[tokio::test]
    async fn test_setup_update_reuses_stored_secret() {
        let rec = reconciler();
        let id = RegistrationId::new();
        let url = "https://hooks.example.com/webhooks/1";
        let first = rec
            .setup(&SetupContext {
                registration_id: &id,
                url,
                config: &request(),
                metadata: None,
            })
            .await
            .unwrap();
        let secret_before = rec.secrets.get_secret(&id).await.unwrap().unwrap();

        let widened = request().with_filter("projects", ["Projects-1"]);
        let second = rec
            .setup(&SetupContext {
                registration_id: &id,
                url,
                config: &widened,
                metadata: Some(&first),
            })
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(rec.api.calls(), vec!["find", "create", "update"]);
        let secret_after = rec.secrets.get_secret(&id).await.unwrap().unwrap();
        assert_eq!(secret_before.expose(), secret_after.expose());
        assert_eq!(rec.api.subs.lock().unwrap()[&first.remote_id].config, widened);
    }

    #[tokio::test]
    async fn test_setup_recreates_when_update_not_found() {
        let rec = reconciler();
        let id = RegistrationId::new();
        let stale = SubscriptionMetadata {
            remote_id: "Subscriptions-gone".to_string(),
            scope_id: None,
        };

        let metadata = rec
            .setup(&SetupContext {
                registration_id: &id,
                url: "https://hooks.example.com/webhooks/1",
                config: &request(),
                metadata: Some(&stale),
            })
            .await
            .unwrap();

        assert_eq!(metadata.remote_id, "Subscriptions-1");
        assert_eq!(rec.api.calls(), vec!["update", "create"]);
    }

    #[tokio::test]
    async fn test_setup_error_propagates_and_persists_nothing() {
        let rec = reconciler();
        *rec.api.fail_create.lock().unwrap() = Some(VendorError::Api {
            status: 400,
            message: "invalid filter".to_string(),
        });
        let id = RegistrationId::new();

        let err = rec
            .setup(&SetupContext {
                registration_id: &id,
                url: "https://hooks.example.com/webhooks/1",
                config: &request(),
                metadata: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SubscriptionError::Vendor(VendorError::Api { status: 400, .. })
        ));
        assert!(rec.secrets.get_secret(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_deletes_remote_and_secret() {
        let rec = reconciler();
        let id = RegistrationId::new();
        let metadata = rec
            .setup(&SetupContext {
                registration_id: &id,
                url: "https://hooks.example.com/webhooks/1",
                config: &request(),
                metadata: None,
            })
            .await
            .unwrap();

        rec.cleanup(&CleanupContext {
            registration_id: &id,
            metadata: Some(&metadata),
        })
        .await
        .unwrap();

        assert!(rec.api.subs.lock().unwrap().is_empty());
        assert!(rec.secrets.get_secret(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_not_found_is_success() {
        let rec = reconciler();
        let id = RegistrationId::new();
        let metadata = SubscriptionMetadata {
            remote_id: "Subscriptions-404".to_string(),
            scope_id: None,
        };
        rec.cleanup(&CleanupContext {
            registration_id: &id,
            metadata: Some(&metadata),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_without_metadata_is_noop() {
        let rec = reconciler();
        let id = RegistrationId::new();
        rec.cleanup(&CleanupContext {
            registration_id: &id,
            metadata: None,
        })
        .await
        .unwrap();
        assert!(rec.api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_other_errors_propagate() {
        let rec = reconciler();
        *rec.api.fail_delete.lock().unwrap() = Some(VendorError::Transport("reset".to_string()));
        let id = RegistrationId::new();
        let metadata = SubscriptionMetadata {
            remote_id: "Subscriptions-1".to_string(),
            scope_id: None,
        };
        let err = rec
            .cleanup(&CleanupContext {
                registration_id: &id,
                metadata: Some(&metadata),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::Vendor(VendorError::Transport(_))));
    }
}
