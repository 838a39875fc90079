//! Inbound webhook envelope types.

use std::collections::HashMap;

/// Inbound request headers with case-insensitive lookup.
///
/// Keys are lowercased on insert; HTTP header names are case-insensitive and
/// vendors disagree on casing (`Svix-Signature` vs `svix-signature`).
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders(HashMap<String, String>);

impl WebhookHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// The first of `names` that is present with a non-blank value.
    pub fn first_of(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|n| self.get(n))
            .find(|v| !v.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for WebhookHeaders {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let headers = WebhookHeaders::new().with("Svix-Signature", "v1,abc");
        assert_eq!(headers.get("svix-signature"), Some("v1,abc"));
        assert_eq!(headers.get("SVIX-SIGNATURE"), Some("v1,abc"));
        assert_eq!(headers.get("svix-id"), None);
    }

    #[test]
    fn test_first_of_skips_blank_values() {
        let headers: WebhookHeaders = [("svix-id", " "), ("webhook-id", "msg_1")]
            .into_iter()
            .collect();
        assert_eq!(headers.first_of(&["svix-id", "webhook-id"]), Some("msg_1"));
        assert_eq!(headers.first_of(&["x-other"]), None);
    }
}
