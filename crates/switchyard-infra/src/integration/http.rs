//! Shared REST plumbing for vendor clients.
//!
//! Wraps a `reqwest::Client` with the vendor's base URL and authentication,
//! and maps HTTP failures onto [`VendorError`]. A 404 always becomes
//! [`VendorError::NotFound`].

use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use switchyard_types::error::VendorError;

/// How the API key is presented to the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiAuth {
    /// `<header>: <key>`
    Header(&'static str),
    /// `Authorization: Bearer <key>`
    Bearer,
}

/// Authenticated JSON client for one vendor base URL.
#[derive(Clone)]
pub struct VendorHttp {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    auth: ApiAuth,
}

impl VendorHttp {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        auth: ApiAuth,
    ) -> Result<Self, VendorError> {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VendorError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match self.auth {
            ApiAuth::Header(name) => builder.header(name, self.api_key.expose_secret()),
            ApiAuth::Bearer => builder.bearer_auth(self.api_key.expose_secret()),
        }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, VendorError> {
        let response = self
            .request(Method::GET, path)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        decode(path, response).await
    }

    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, VendorError> {
        let response = self
            .request(method, path)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        decode(path, response).await
    }

    /// Send without reading a body back (DELETE, cancel endpoints).
    pub async fn execute(&self, method: Method, path: &str) -> Result<(), VendorError> {
        let response = self
            .request(method, path)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(path, response).await.map(|_| ())
    }
}

fn transport_error(e: reqwest::Error) -> VendorError {
    VendorError::Transport(e.to_string())
}

async fn check_status(
    path: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, VendorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(VendorError::NotFound(path.to_string()));
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    tracing::debug!(path, status = status.as_u16(), "vendor API returned an error");
    Err(VendorError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(
    path: &str,
    response: reqwest::Response,
) -> Result<T, VendorError> {
    let response = check_status(path, response).await?;
    let bytes = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| VendorError::MalformedResponse(format!("{path}: {e}")))
}
