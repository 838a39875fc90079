//! Application state wiring all services together.
//!
//! Coordinators and registration managers are generic over their vendor
//! client and adapters; AppState pins them to the infra implementations and
//! keeps one type-erased handle per configured integration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;

use switchyard_core::completion::boxed::BoxCompletionHandler;
use switchyard_core::completion::coordinator::{CompletionCoordinator, CompletionSettings};
use switchyard_core::completion::scheduler::ScheduledAction;
use switchyard_core::subscription::boxed::BoxRegistrationManager;
use switchyard_core::subscription::manager::RegistrationManager;
use switchyard_core::subscription::reconciler::RemoteReconciler;
use switchyard_core::vendor::subscription::SubscriptionApi;
use switchyard_core::vendor::task::TaskIntegration;
use switchyard_infra::config::resolve_api_key_with;
use switchyard_infra::emitter::BroadcastEmitter;
use switchyard_infra::integration::{DeployClient, SandboxClient};
use switchyard_infra::scheduler::CronActionScheduler;
use switchyard_infra::sqlite::operation::SqliteOperationStore;
use switchyard_infra::sqlite::pool::DatabasePool;
use switchyard_infra::sqlite::registration::SqliteRegistrationStore;
use switchyard_infra::webhook::registry::VerifierRegistry;
use switchyard_types::config::{IntegrationConfig, IntegrationKind, SwitchyardConfig};

/// Per-integration handles.
#[derive(Clone)]
pub struct IntegrationHandle {
    pub kind: IntegrationKind,
    pub completion: BoxCompletionHandler,
    pub subscriptions: BoxRegistrationManager,
}

/// Shared application state for the HTTP host and the dispatcher.
#[derive(Clone)]
pub struct AppState {
    pub integrations: Arc<HashMap<String, IntegrationHandle>>,
    pub verifiers: VerifierRegistry,
    pub registrations: SqliteRegistrationStore,
    pub scheduler: CronActionScheduler,
    pub emitter: BroadcastEmitter,
}

impl AppState {
    /// Wire every configured integration against `pool`.
    ///
    /// Returns the state and the receiver of due scheduled actions. The
    /// scheduler is not started.
    pub fn build(
        config: &SwitchyardConfig,
        pool: DatabasePool,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<(Self, mpsc::UnboundedReceiver<ScheduledAction>)> {
        let registrations = SqliteRegistrationStore::new(pool.clone());
        let operations = SqliteOperationStore::new(pool);
        let (scheduler, actions) = CronActionScheduler::new();
        let emitter = BroadcastEmitter::new();
        let verifiers = VerifierRegistry::new();
        let tolerance = Duration::from_secs(config.signature_tolerance_secs);

        let mut integrations = HashMap::new();
        for integration in &config.integrations {
            let api_key = resolve_api_key_with(integration, &env)?;
            let wiring = Wiring {
                config,
                integration,
                registrations: &registrations,
                operations: &operations,
                scheduler: &scheduler,
                emitter: &emitter,
                verifiers: &verifiers,
                tolerance,
            };
            let handle = match integration.kind {
                IntegrationKind::Deploy => {
                    wiring.wire(DeployClient::from_config(integration, api_key)?)
                }
                IntegrationKind::Sandbox => {
                    wiring.wire(SandboxClient::from_config(integration, api_key)?)
                }
            };
            tracing::info!(
                integration = %integration.name,
                kind = %integration.kind,
                "integration wired"
            );
            integrations.insert(integration.name.clone(), handle);
        }

        let state = Self {
            integrations: Arc::new(integrations),
            verifiers,
            registrations,
            scheduler,
            emitter,
        };
        Ok((state, actions))
    }

    pub fn integration(&self, name: &str) -> Option<&IntegrationHandle> {
        self.integrations.get(name)
    }

    /// Re-arm polling for operations still open from a previous run.
    ///
    /// Must run after the scheduler is started.
    pub async fn resume_open_operations(&self) -> anyhow::Result<usize> {
        let mut resumed = 0;
        for (name, handle) in self.integrations.iter() {
            resumed += handle
                .completion
                .resume_open()
                .await
                .with_context(|| format!("resuming open operations for '{name}'"))?;
        }
        Ok(resumed)
    }
}

struct Wiring<'a> {
    config: &'a SwitchyardConfig,
    integration: &'a IntegrationConfig,
    registrations: &'a SqliteRegistrationStore,
    operations: &'a SqliteOperationStore,
    scheduler: &'a CronActionScheduler,
    emitter: &'a BroadcastEmitter,
    verifiers: &'a VerifierRegistry,
    tolerance: Duration,
}

impl Wiring<'_> {
    fn wire<C>(&self, client: C) -> IntegrationHandle
    where
        C: TaskIntegration + SubscriptionApi + Clone + 'static,
    {
        let verifier = self.verifiers.register_config(
            &self.integration.name,
            &self.integration.signature_scheme(),
            self.tolerance,
        );

        let coordinator = CompletionCoordinator::new(
            client.clone(),
            self.operations.clone(),
            self.scheduler.clone(),
            self.emitter.clone(),
            verifier,
            CompletionSettings::from_secs(
                self.integration.poll_interval_secs,
                self.integration.timeout_secs,
            ),
        );

        let manager = RegistrationManager::new(
            &self.integration.name,
            &self.config.public_base_url,
            RemoteReconciler::new(client, self.registrations.clone()),
            self.registrations.clone(),
        );

        IntegrationHandle {
            kind: self.integration.kind,
            completion: BoxCompletionHandler::new(coordinator),
            subscriptions: BoxRegistrationManager::new(manager),
        }
    }
}
