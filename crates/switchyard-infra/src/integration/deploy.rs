//! Deployment platform integration.
//!
//! Subscriptions live inside a vendor space and filter on event categories,
//! projects and environments. Deliveries authenticate with a static secret
//! header that the subscription itself carries. Kickoff creates a deployment;
//! the deployment id correlates webhooks and its server task is polled.

use reqwest::Method;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;

use switchyard_core::vendor::subscription::{
    RemoteSubscription, RemoteSubscriptionSpec, SubscriptionApi,
};
use switchyard_core::vendor::task::{CompletionEvent, Kickoff, TaskIntegration};
use switchyard_types::config::{IntegrationConfig, SignatureConfig, DEFAULT_SECRET_HEADER};
use switchyard_types::error::VendorError;
use switchyard_types::operation::{OutputChannels, RemoteState, RemoteStatus};
use switchyard_types::subscription::SubscriptionMetadata;

use super::http::{ApiAuth, VendorHttp};

pub const DEFAULT_SPACE: &str = "Spaces-1";
pub const CORRELATION_KEY: &str = "deployment";
pub const DEPLOYMENT_SUCCEEDED: &str = "DeploymentSucceeded";
pub const DEPLOYMENT_FAILED: &str = "DeploymentFailed";

const API_KEY_HEADER: &str = "X-Octopus-ApiKey";
const DEPLOYMENT_ID_PREFIX: &str = "Deployments-";

#[derive(Clone)]
pub struct DeployClient {
    http: VendorHttp,
    name: String,
    space_id: String,
    secret_header: String,
}

impl DeployClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: SecretString,
        space_id: impl Into<String>,
        secret_header: impl Into<String>,
    ) -> Result<Self, VendorError> {
        Ok(Self {
            http: VendorHttp::new(base_url, api_key, ApiAuth::Header(API_KEY_HEADER))?,
            name: name.into(),
            space_id: space_id.into(),
            secret_header: secret_header.into(),
        })
    }

    pub fn from_config(config: &IntegrationConfig, api_key: SecretString) -> Result<Self, VendorError> {
        let secret_header = match config.signature_scheme() {
            SignatureConfig::StaticHeader { header } => header,
            _ => DEFAULT_SECRET_HEADER.to_string(),
        };
        Self::new(
            &config.name,
            &config.base_url,
            api_key,
            config.scope_id.as_deref().unwrap_or(DEFAULT_SPACE),
            secret_header,
        )
    }

    fn space_path(&self, space: &str, rest: &str) -> String {
        format!("/api/{space}{rest}")
    }

    fn subscription_body(&self, spec: &RemoteSubscriptionSpec<'_>, id: Option<&str>) -> serde_json::Value {
        let filter_values = |dimension: &str| -> Vec<&str> {
            spec.config
                .filters
                .get(dimension)
                .map(|set| set.iter().map(String::as_str).collect())
                .unwrap_or_default()
        };

        let mut body = json!({
            "Name": spec.name,
            "SpaceId": self.space_id,
            "IsDisabled": false,
            "EventNotificationSubscription": {
                "WebhookURI": spec.url,
                "WebhookHeaderKey": self.secret_header,
                "WebhookHeaderValue": spec.secret.expose(),
                "WebhookTimeout": "00:00:10",
                "Filter": {
                    "EventCategories": spec.config.events,
                    "Projects": filter_values("projects"),
                    "Environments": filter_values("environments"),
                    "EventGroups": [],
                    "Tenants": [],
                    "Users": [],
                    "DocumentTypes": [],
                    "Tags": []
                }
            }
        });
        if let Some(id) = id {
            body["Id"] = json!(id);
        }
        body
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubscriptionResource {
    id: String,
    name: String,
    #[serde(default)]
    space_id: Option<String>,
}

impl From<SubscriptionResource> for RemoteSubscription {
    fn from(r: SubscriptionResource) -> Self {
        RemoteSubscription {
            id: r.id,
            name: r.name,
            scope_id: r.space_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeploymentResource {
    id: Option<String>,
    task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TaskResource {
    state: String,
    #[serde(default)]
    error_message: Option<String>,
}

/// Map a server task state onto the normalized status.
pub fn status_for_task_state(state: &str) -> RemoteStatus {
    match state {
        "Queued" => RemoteStatus::Pending,
        "Executing" | "Cancelling" => RemoteStatus::Running,
        "Success" => RemoteStatus::Succeeded,
        "Failed" => RemoteStatus::Failed,
        "Canceled" => RemoteStatus::Cancelled,
        "TimedOut" => RemoteStatus::TimedOut,
        other => {
            tracing::warn!(state = other, "unknown deployment task state, treating as running");
            RemoteStatus::Running
        }
    }
}

// ---------------------------------------------------------------------------
// SubscriptionApi
// ---------------------------------------------------------------------------

impl SubscriptionApi for DeployClient {
    async fn find_subscription_by_name(
        &self,
        name: &str,
    ) -> Result<Option<RemoteSubscription>, VendorError> {
        let path = self.space_path(&self.space_id, "/subscriptions");
        let page: Page<SubscriptionResource> = self
            .http
            .get(&path, &[("partialName", name), ("take", "100")])
            .await?;
        Ok(page
            .items
            .into_iter()
            .find(|s| s.name == name)
            .map(RemoteSubscription::from))
    }

    async fn create_subscription(
        &self,
        spec: &RemoteSubscriptionSpec<'_>,
    ) -> Result<RemoteSubscription, VendorError> {
        let path = self.space_path(&self.space_id, "/subscriptions");
        let created: SubscriptionResource = self
            .http
            .send(Method::POST, &path, &self.subscription_body(spec, None))
            .await?;
        tracing::info!(integration = %self.name, remote_id = %created.id, "created deploy subscription");
        Ok(created.into())
    }

    async fn update_subscription(
        &self,
        remote_id: &str,
        spec: &RemoteSubscriptionSpec<'_>,
    ) -> Result<RemoteSubscription, VendorError> {
        let path = self.space_path(&self.space_id, &format!("/subscriptions/{remote_id}"));
        let updated: SubscriptionResource = self
            .http
            .send(Method::PUT, &path, &self.subscription_body(spec, Some(remote_id)))
            .await?;
        Ok(updated.into())
    }

    async fn delete_subscription(&self, metadata: &SubscriptionMetadata) -> Result<(), VendorError> {
        let space = metadata.scope_id.as_deref().unwrap_or(&self.space_id);
        let path = self.space_path(space, &format!("/subscriptions/{}", metadata.remote_id));
        self.http.execute(Method::DELETE, &path).await
    }
}

// ---------------------------------------------------------------------------
// TaskIntegration
// ---------------------------------------------------------------------------

impl TaskIntegration for DeployClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn correlation_key(&self) -> &str {
        CORRELATION_KEY
    }

    fn channels(&self) -> OutputChannels {
        OutputChannels::SuccessFailure
    }

    async fn start_task(&self, request: &serde_json::Value) -> Result<Kickoff, VendorError> {
        let path = self.space_path(&self.space_id, "/deployments");
        let deployment: DeploymentResource = self.http.send(Method::POST, &path, request).await?;

        let deployment_id = deployment
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| VendorError::MalformedResponse("deployment response has no Id".into()))?;
        let task_id = deployment
            .task_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                VendorError::MalformedResponse("deployment response has no TaskId".into())
            })?;

        Ok(Kickoff {
            initial_state: RemoteState::new(RemoteStatus::Pending, "Queued")
                .with_detail(json!({"deployment_id": deployment_id})),
            remote_task_id: task_id,
            correlation_value: deployment_id,
        })
    }

    async fn task_state(&self, remote_task_id: &str) -> Result<RemoteState, VendorError> {
        let path = self.space_path(&self.space_id, &format!("/tasks/{remote_task_id}"));
        let task: TaskResource = self.http.get(&path, &[]).await?;
        Ok(
            RemoteState::new(status_for_task_state(&task.state), task.state).with_detail(json!({
                "task_id": remote_task_id,
                "error_message": task.error_message,
            })),
        )
    }

    async fn cancel_task(&self, remote_task_id: &str) -> Result<(), VendorError> {
        let path = self.space_path(&self.space_id, &format!("/tasks/{remote_task_id}/cancel"));
        self.http.execute(Method::POST, &path).await
    }

    fn parse_event(&self, body: &[u8]) -> Result<Option<CompletionEvent>, String> {
        let payload: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| format!("invalid JSON: {e}"))?;
        let envelope = payload
            .get("Payload")
            .ok_or_else(|| "missing Payload".to_string())?;

        // Test deliveries carry a Payload without an Event.
        let Some(event) = envelope.get("Event") else {
            return Ok(None);
        };
        let category = event
            .get("Category")
            .and_then(|c| c.as_str())
            .ok_or_else(|| "missing Payload.Event.Category".to_string())?;

        let candidates = event
            .get("RelatedDocumentIds")
            .and_then(|ids| ids.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str())
                    .filter(|id| id.starts_with(DEPLOYMENT_ID_PREFIX))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(CompletionEvent {
            category: category.to_string(),
            candidates,
            payload,
        }))
    }

    fn state_for_event(&self, event: &CompletionEvent) -> Option<RemoteState> {
        let (status, vendor_state) = match event.category.as_str() {
            DEPLOYMENT_SUCCEEDED => (RemoteStatus::Succeeded, "Success"),
            DEPLOYMENT_FAILED => (RemoteStatus::Failed, "Failed"),
            _ => return None,
        };
        let message = event.payload.pointer("/Payload/Event/Message").cloned();
        Some(RemoteState::new(status, vendor_state).with_detail(json!({
            "category": event.category,
            "message": message,
        })))
    }
}
