//! Webhook subscription requests and the physical registrations they share.
//!
//! Many logical triggers multiplex onto one [`PhysicalWebhookRegistration`]
//! per external account. Each trigger expresses its needs as a
//! [`WebhookSubscriptionRequest`]; the registration's `covered` request is
//! always a superset of everything its triggers asked for.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ScopeFilters
// ---------------------------------------------------------------------------

/// Per-dimension scope filters (e.g. `projects`, `environments`).
///
/// An empty dimension means "match everything" in that dimension. Empty sets
/// are never stored, so an absent dimension and an empty one compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, BTreeSet<String>>",
    into = "BTreeMap<String, BTreeSet<String>>"
)]
pub struct ScopeFilters(BTreeMap<String, BTreeSet<String>>);

impl ScopeFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a dimension.
    pub fn with<I, S>(mut self, dimension: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(dimension, values);
        self
    }

    /// Replace the values of a dimension. Inserting no values unscopes it.
    pub fn insert<I, S>(&mut self, dimension: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dimension = dimension.into();
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.0.remove(&dimension);
        } else {
            self.0.insert(dimension, values);
        }
    }

    /// Values for a dimension; `None` means the dimension is unscoped.
    pub fn get(&self, dimension: &str) -> Option<&BTreeSet<String>> {
        self.0.get(dimension)
    }

    /// Whether the dimension matches everything.
    pub fn is_unscoped(&self, dimension: &str) -> bool {
        !self.0.contains_key(dimension)
    }

    /// Dimensions that carry an explicit (non-empty) filter.
    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, BTreeSet<String>>> for ScopeFilters {
    fn from(map: BTreeMap<String, BTreeSet<String>>) -> Self {
        Self(map.into_iter().filter(|(_, v)| !v.is_empty()).collect())
    }
}

impl From<ScopeFilters> for BTreeMap<String, BTreeSet<String>> {
    fn from(filters: ScopeFilters) -> Self {
        filters.0
    }
}

// ---------------------------------------------------------------------------
// WebhookSubscriptionRequest
// ---------------------------------------------------------------------------

/// What one trigger instance needs from a vendor webhook.
///
/// Events are held in a `BTreeSet`, which gives the dedup and stable order
/// needed for deterministic structural comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSubscriptionRequest {
    #[serde(default)]
    pub events: BTreeSet<String>,
    #[serde(default)]
    pub filters: ScopeFilters,
}

impl WebhookSubscriptionRequest {
    pub fn new<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: events.into_iter().map(Into::into).collect(),
            filters: ScopeFilters::new(),
        }
    }

    pub fn with_filter<I, S>(mut self, dimension: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.insert(dimension, values);
        self
    }
}

// ---------------------------------------------------------------------------
// RegistrationId
// ---------------------------------------------------------------------------

/// Identifies a physical webhook registration owned by an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationId(Uuid);

impl RegistrationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RegistrationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RegistrationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ---------------------------------------------------------------------------
// PhysicalWebhookRegistration
// ---------------------------------------------------------------------------

/// Opaque vendor-side identifiers returned by setup and needed for cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMetadata {
    /// The vendor's id for the subscription / endpoint.
    pub remote_id: String,
    /// Vendor-side scoping id such as a space or account id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
}

/// One webhook endpoint registered with a vendor, shared by every trigger
/// of the same integration and account.
///
/// The signing secret is deliberately not part of this struct: it lives in
/// the secret store keyed by the registration id, so registrations can be
/// logged and compared freely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalWebhookRegistration {
    pub id: RegistrationId,
    pub integration: String,
    pub account: String,
    /// Public URL the vendor delivers to.
    pub url: String,
    /// Union of everything requested by the referencing triggers (or wider).
    pub covered: WebhookSubscriptionRequest,
    /// Set once setup has succeeded against the vendor.
    pub metadata: Option<SubscriptionMetadata>,
    /// Trigger ids currently referencing this registration.
    pub triggers: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PhysicalWebhookRegistration {
    pub fn new(
        id: RegistrationId,
        integration: impl Into<String>,
        account: impl Into<String>,
        url: impl Into<String>,
        covered: WebhookSubscriptionRequest,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            integration: integration.into(),
            account: account.into(),
            url: url.into(),
            covered,
            metadata: None,
            triggers: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The vendor's subscription id, once setup has succeeded.
    pub fn remote_subscription_id(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.remote_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_filters_empty_dimension_is_unscoped() {
        let filters = ScopeFilters::new()
            .with("projects", ["Projects-1"])
            .with("environments", Vec::<String>::new());

        assert!(!filters.is_unscoped("projects"));
        assert!(filters.is_unscoped("environments"));
        assert!(filters.is_unscoped("tenants"));
        assert_eq!(filters.dimensions().collect::<Vec<_>>(), vec!["projects"]);
    }

    #[test]
    fn test_scope_filters_absent_equals_empty() {
        let a = ScopeFilters::new().with("projects", Vec::<String>::new());
        let b = ScopeFilters::new();
        assert_eq!(a, b);
    }

    #[test]
    fn test_scope_filters_deserialize_drops_empty_sets() {
        let filters: ScopeFilters =
            serde_json::from_str(r#"{"projects": [], "environments": ["Env-1"]}"#).unwrap();
        assert!(filters.is_unscoped("projects"));
        assert_eq!(
            filters.get("environments").unwrap().iter().collect::<Vec<_>>(),
            vec!["Env-1"]
        );
    }

    #[test]
    fn test_request_events_are_deduplicated_and_ordered() {
        let req = WebhookSubscriptionRequest::new(["b", "a", "b"]);
        assert_eq!(req.events.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_request_deserializes_with_missing_fields() {
        let req: WebhookSubscriptionRequest = serde_json::from_str("{}").unwrap();
        assert!(req.events.is_empty());
        assert!(req.filters.is_empty());
    }

    #[test]
    fn test_registration_id_parse_roundtrip() {
        let id = RegistrationId::new();
        let parsed: RegistrationId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<RegistrationId>().is_err());
    }

    #[test]
    fn test_registration_remote_id_follows_metadata() {
        let mut reg = PhysicalWebhookRegistration::new(
            RegistrationId::new(),
            "deploy",
            "Spaces-1",
            "https://hooks.example.com/webhooks/x",
            WebhookSubscriptionRequest::new(["DeploymentSucceeded"]),
        );
        assert_eq!(reg.remote_subscription_id(), None);

        reg.metadata = Some(SubscriptionMetadata {
            remote_id: "Subscriptions-7".to_string(),
            scope_id: Some("Spaces-1".to_string()),
        });
        assert_eq!(reg.remote_subscription_id(), Some("Subscriptions-7"));
    }
}
