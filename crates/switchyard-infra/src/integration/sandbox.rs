//! Sandboxed command execution integration.
//!
//! Webhooks are Svix-signed with the secret we hand the vendor when the
//! endpoint is created. Kickoff runs a command in a sandbox; the command id
//! is both the polled task id and the primary correlation value, with the
//! sandbox id as a fallback candidate.

use reqwest::Method;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;

use switchyard_core::vendor::subscription::{
    RemoteSubscription, RemoteSubscriptionSpec, SubscriptionApi,
};
use switchyard_core::vendor::task::{CompletionEvent, Kickoff, TaskIntegration};
use switchyard_types::config::IntegrationConfig;
use switchyard_types::error::VendorError;
use switchyard_types::operation::{OutputChannels, RemoteState, RemoteStatus};
use switchyard_types::subscription::SubscriptionMetadata;

use super::http::{ApiAuth, VendorHttp};

pub const CORRELATION_KEY: &str = "command";
pub const COMMAND_COMPLETED: &str = "command.completed";
pub const COMMAND_FAILED: &str = "command.failed";
pub const COMMAND_TIMED_OUT: &str = "command.timed_out";

#[derive(Clone)]
pub struct SandboxClient {
    http: VendorHttp,
    name: String,
    scope_id: Option<String>,
}

impl SandboxClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: SecretString,
        scope_id: Option<String>,
    ) -> Result<Self, VendorError> {
        Ok(Self {
            http: VendorHttp::new(base_url, api_key, ApiAuth::Bearer)?,
            name: name.into(),
            scope_id,
        })
    }

    pub fn from_config(config: &IntegrationConfig, api_key: SecretString) -> Result<Self, VendorError> {
        Self::new(&config.name, &config.base_url, api_key, config.scope_id.clone())
    }

    fn endpoint_body(&self, spec: &RemoteSubscriptionSpec<'_>) -> serde_json::Value {
        json!({
            "name": spec.name,
            "url": spec.url,
            "secret": spec.secret.expose(),
            "event_types": spec.config.events,
            "filters": spec.config.filters,
        })
    }

    fn remote(&self, endpoint: EndpointResource) -> RemoteSubscription {
        RemoteSubscription {
            id: endpoint.id,
            name: endpoint.name,
            scope_id: self.scope_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EndpointResource {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct EndpointList {
    #[serde(default)]
    data: Vec<EndpointResource>,
}

#[derive(Debug, Deserialize)]
struct CommandResource {
    id: Option<String>,
    #[serde(default)]
    sandbox_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    exit_code: Option<i64>,
}

/// Map a command status onto the normalized status.
///
/// A `completed` command with a non-zero exit code is a failure.
pub fn status_for_command(status: &str, exit_code: Option<i64>) -> RemoteStatus {
    match status {
        "pending" => RemoteStatus::Pending,
        "running" => RemoteStatus::Running,
        "completed" if exit_code.unwrap_or(0) == 0 => RemoteStatus::Succeeded,
        "completed" | "failed" => RemoteStatus::Failed,
        "timed_out" => RemoteStatus::TimedOut,
        "cancelled" => RemoteStatus::Cancelled,
        other => {
            tracing::warn!(status = other, "unknown command status, treating as running");
            RemoteStatus::Running
        }
    }
}

impl SubscriptionApi for SandboxClient {
    async fn find_subscription_by_name(
        &self,
        name: &str,
    ) -> Result<Option<RemoteSubscription>, VendorError> {
        let list: EndpointList = self.http.get("/v1/webhooks", &[("name", name)]).await?;
        Ok(list
            .data
            .into_iter()
            .find(|e| e.name == name)
            .map(|e| self.remote(e)))
    }

    async fn create_subscription(
        &self,
        spec: &RemoteSubscriptionSpec<'_>,
    ) -> Result<RemoteSubscription, VendorError> {
        let created: EndpointResource = self
            .http
            .send(Method::POST, "/v1/webhooks", &self.endpoint_body(spec))
            .await?;
        tracing::info!(integration = %self.name, remote_id = %created.id, "created sandbox webhook endpoint");
        Ok(self.remote(created))
    }

    async fn update_subscription(
        &self,
        remote_id: &str,
        spec: &RemoteSubscriptionSpec<'_>,
    ) -> Result<RemoteSubscription, VendorError> {
        let updated: EndpointResource = self
            .http
            .send(
                Method::PATCH,
                &format!("/v1/webhooks/{remote_id}"),
                &self.endpoint_body(spec),
            )
            .await?;
        Ok(self.remote(updated))
    }

    async fn delete_subscription(&self, metadata: &SubscriptionMetadata) -> Result<(), VendorError> {
        self.http
            .execute(Method::DELETE, &format!("/v1/webhooks/{}", metadata.remote_id))
            .await
    }
}

impl TaskIntegration for SandboxClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn correlation_key(&self) -> &str {
        CORRELATION_KEY
    }

    fn channels(&self) -> OutputChannels {
        OutputChannels::Single
    }

    async fn start_task(&self, request: &serde_json::Value) -> Result<Kickoff, VendorError> {
        let command: CommandResource = self.http.send(Method::POST, "/v1/commands", request).await?;
        let command_id = command
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| VendorError::MalformedResponse("command response has no id".into()))?;

        let status = command.status.unwrap_or_else(|| "pending".to_string());
        let initial_state = RemoteState::new(status_for_command(&status, command.exit_code), status)
            .with_detail(json!({"sandbox_id": command.sandbox_id}));

        Ok(Kickoff {
            remote_task_id: command_id.clone(),
            correlation_value: command_id,
            initial_state,
        })
    }

    async fn task_state(&self, remote_task_id: &str) -> Result<RemoteState, VendorError> {
        let command: CommandResource = self
            .http
            .get(&format!("/v1/commands/{remote_task_id}"), &[])
            .await?;
        let status = command
            .status
            .ok_or_else(|| VendorError::MalformedResponse("command has no status".into()))?;
        Ok(
            RemoteState::new(status_for_command(&status, command.exit_code), status).with_detail(
                json!({
                    "command_id": remote_task_id,
                    "sandbox_id": command.sandbox_id,
                    "exit_code": command.exit_code,
                }),
            ),
        )
    }

    async fn cancel_task(&self, remote_task_id: &str) -> Result<(), VendorError> {
        self.http
            .execute(Method::POST, &format!("/v1/commands/{remote_task_id}/cancel"))
            .await
    }

    fn parse_event(&self, body: &[u8]) -> Result<Option<CompletionEvent>, String> {
        let payload: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| format!("invalid JSON: {e}"))?;
        let event_type = payload
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| "missing event type".to_string())?;

        let data = payload.get("data");
        let candidates = ["command_id", "sandbox_id"]
            .iter()
            .filter_map(|field| data.and_then(|d| d.get(*field)).and_then(|v| v.as_str()))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Some(CompletionEvent {
            category: event_type.to_string(),
            candidates,
            payload,
        }))
    }

    fn state_for_event(&self, event: &CompletionEvent) -> Option<RemoteState> {
        let exit_code = event.payload.pointer("/data/exit_code").and_then(|c| c.as_i64());
        let (status, vendor_state) = match event.category.as_str() {
            COMMAND_COMPLETED => (status_for_command("completed", exit_code), "completed"),
            COMMAND_FAILED => (RemoteStatus::Failed, "failed"),
            COMMAND_TIMED_OUT => (RemoteStatus::TimedOut, "timed_out"),
            _ => return None,
        };
        Some(RemoteState::new(status, vendor_state).with_detail(json!({
            "event_type": event.category,
            "exit_code": exit_code,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use switchyard_types::secret::Redacted;
    use switchyard_types::subscription::WebhookSubscriptionRequest;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SandboxClient {
        SandboxClient::new(
            "sandbox",
            server.uri(),
            SecretString::from("sk-test"),
            Some("team-1".to_string()),
        )
        .unwrap()
    }

    fn event(event_type: &str, exit_code: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": event_type,
            "timestamp": "2026-03-01T00:00:00Z",
            "data": {"command_id": "cmd_1", "sandbox_id": "sbx_1", "exit_code": exit_code}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_find_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/webhooks"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "name": "switchyard-abc",
                "secret": "whsec_test",
                "event_types": ["command.completed"]
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"id": "ep_1", "name": "switchyard-abc"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/webhooks"))
            .and(query_param("name", "switchyard-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "ep_1", "name": "switchyard-abc"}]
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let config = WebhookSubscriptionRequest::new([COMMAND_COMPLETED]);
        let secret = Redacted::new("whsec_test");
        let spec = RemoteSubscriptionSpec {
            name: "switchyard-abc",
            url: "https://hooks.example.com/webhooks/abc",
            secret: &secret,
            config: &config,
        };
        let created = client.create_subscription(&spec).await.unwrap();
        assert_eq!(created.id, "ep_1");
        assert_eq!(created.scope_id.as_deref(), Some("team-1"));

        let found = client
            .find_subscription_by_name("switchyard-abc")
            .await
            .unwrap();
        assert_eq!(found.map(|s| s.id).as_deref(), Some("ep_1"));
    }

    #[tokio::test]
    async fn test_update_missing_endpoint_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/webhooks/ep_gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = WebhookSubscriptionRequest::new([COMMAND_COMPLETED]);
        let secret = Redacted::new("s");
        let spec = RemoteSubscriptionSpec {
            name: "switchyard-abc",
            url: "https://hooks.example.com/webhooks/abc",
            secret: &secret,
            config: &config,
        };
        let err = client(&server)
            .update_subscription("ep_gone", &spec)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_start_task_and_poll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/commands"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "cmd_1", "sandbox_id": "sbx_1", "status": "running"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/commands/cmd_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cmd_1", "sandbox_id": "sbx_1", "status": "completed", "exit_code": 2
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let kickoff = client
            .start_task(&json!({"sandbox_id": "sbx_1", "command": "make test"}))
            .await
            .unwrap();
        assert_eq!(kickoff.remote_task_id, "cmd_1");
        assert_eq!(kickoff.correlation_value, "cmd_1");
        assert_eq!(kickoff.initial_state.status, RemoteStatus::Running);

        let state = client.task_state("cmd_1").await.unwrap();
        assert_eq!(state.status, RemoteStatus::Failed);
        assert_eq!(state.vendor_state, "completed");
        assert_eq!(state.detail["exit_code"], 2);
    }

    #[tokio::test]
    async fn test_start_task_without_id_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/commands"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": "running"})))
            .mount(&server)
            .await;

        let err = client(&server).start_task(&json!({})).await.unwrap_err();
        assert!(matches!(err, VendorError::MalformedResponse(_)));
    }

    #[test]
    fn test_status_for_command() {
        assert_eq!(status_for_command("pending", None), RemoteStatus::Pending);
        assert_eq!(status_for_command("running", None), RemoteStatus::Running);
        assert_eq!(status_for_command("completed", Some(0)), RemoteStatus::Succeeded);
        assert_eq!(status_for_command("completed", None), RemoteStatus::Succeeded);
        assert_eq!(status_for_command("completed", Some(1)), RemoteStatus::Failed);
        assert_eq!(status_for_command("failed", None), RemoteStatus::Failed);
        assert_eq!(status_for_command("timed_out", None), RemoteStatus::TimedOut);
        assert_eq!(status_for_command("cancelled", None), RemoteStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_parse_event_candidates_in_order() {
        let server = MockServer::start().await;
        let parsed = client(&server)
            .parse_event(&event(COMMAND_COMPLETED, 0))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.candidates, vec!["cmd_1".to_string(), "sbx_1".to_string()]);
    }

    #[tokio::test]
    async fn test_state_for_event() {
        let server = MockServer::start().await;
        let client = client(&server);

        let ok = client.parse_event(&event(COMMAND_COMPLETED, 0)).unwrap().unwrap();
        assert_eq!(client.state_for_event(&ok).unwrap().status, RemoteStatus::Succeeded);

        let nonzero = client.parse_event(&event(COMMAND_COMPLETED, 137)).unwrap().unwrap();
        assert_eq!(client.state_for_event(&nonzero).unwrap().status, RemoteStatus::Failed);

        let timed_out = client.parse_event(&event(COMMAND_TIMED_OUT, 0)).unwrap().unwrap();
        assert_eq!(client.state_for_event(&timed_out).unwrap().status, RemoteStatus::TimedOut);

        let started = client.parse_event(&event("command.started", 0)).unwrap().unwrap();
        assert!(client.state_for_event(&started).is_none());

        assert!(client.parse_event(br#"{"data": {}}"#).is_err());
    }
}
