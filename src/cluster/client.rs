//! Orchestration API client over HTTP.
//!
//! Talks to the core `v1` REST endpoints for secrets and pods with a bearer
//! token, and maps response statuses onto [`ClusterError`].

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::ClusterSettings;
use crate::error::ClusterError;

use super::api::{ClusterApi, ClusterResult};
use super::types::{ClusterObject, LabelSelector, ObjectKind, Pod, Secret};

/// CA bundle mounted into pods running with a service account.
const IN_CLUSTER_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Wait applied to a 429 response without a usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// HTTP client for the orchestration API.
#[derive(Debug, Clone)]
pub struct KubeClient {
    /// HTTP client.
    client: Client,
    /// API server base URL without trailing slash.
    base_url: String,
    /// Bearer token.
    token: String,
    /// Base delay between retries.
    retry_delay: Duration,
}

/// List response envelope.
#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Status object returned with error responses.
#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

/// A single API call.
struct ApiRequest<'r> {
    method: Method,
    path: String,
    selector: Option<String>,
    body: Option<serde_json::Value>,
    kind: ObjectKind,
    name: &'r str,
}

impl KubeClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, token: &str) -> ClusterResult<Self> {
        Self::build(base_url, token, DEFAULT_TIMEOUT_SECS, None)
    }

    /// Creates a client from the configured connection settings.
    ///
    /// The configured CA file is trusted if set; otherwise the in-cluster
    /// CA bundle is trusted when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the CA file cannot be read or the HTTP client
    /// cannot be created.
    pub fn from_settings(settings: &ClusterSettings, token: &str) -> ClusterResult<Self> {
        let ca_path = settings.ca_file.clone().or_else(|| {
            std::path::Path::new(IN_CLUSTER_CA_PATH)
                .exists()
                .then(|| IN_CLUSTER_CA_PATH.to_string())
        });

        let ca_pem = match ca_path {
            Some(path) => {
                debug!("Trusting API server CA from: {path}");
                Some(std::fs::read(&path).map_err(|e| {
                    ClusterError::network(format!("Failed to read CA file {path}: {e}"))
                })?)
            }
            None => None,
        };

        Self::build(
            &settings.api_url,
            token,
            settings.timeout_secs,
            ca_pem.as_deref(),
        )
    }

    fn build(
        base_url: &str,
        token: &str,
        timeout_secs: u64,
        ca_pem: Option<&[u8]>,
    ) -> ClusterResult<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(timeout_secs));

        if let Some(pem) = ca_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| ClusterError::network(format!("Invalid CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| ClusterError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Overrides the base delay between retries.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn collection_path(kind: ObjectKind, namespace: &str) -> String {
        format!("/api/v1/namespaces/{namespace}/{}", kind.resource())
    }

    fn object_path(kind: ObjectKind, namespace: &str, name: &str) -> String {
        format!("{}/{name}", Self::collection_path(kind, namespace))
    }

    /// Executes a request, retrying transient failures.
    ///
    /// A rate-limited response waits for the server's `Retry-After` before
    /// the next attempt; other failures back off linearly.
    async fn execute(&self, request: &ApiRequest<'_>) -> ClusterResult<String> {
        let mut last_error: Option<ClusterError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = match &last_error {
                    Some(ClusterError::RateLimited { retry_after_secs }) => {
                        Duration::from_secs(*retry_after_secs)
                    }
                    _ => self.retry_delay * attempt,
                };
                debug!("Retry attempt {attempt} of {MAX_RETRIES} in {delay:?}");
                tokio::time::sleep(delay).await;
            }

            match self.execute_once(request).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ClusterError::network("Max retries exceeded")))
    }

    /// Executes a single request and returns the response body.
    async fn execute_once(&self, request: &ApiRequest<'_>) -> ClusterResult<String> {
        trace!("{} {}", request.method, request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), format!("{}{}", self.base_url, request.path))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/json");

        if let Some(selector) = &request.selector {
            builder = builder.query(&[("labelSelector", selector)]);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ClusterError::network(format!("Request failed: {e}")))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

            return Err(ClusterError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClusterError::network(format!("Failed to read response: {e}")))?;

        if status.is_success() {
            return Ok(body);
        }

        let kind = request.kind.to_string();
        Err(match status {
            StatusCode::CONFLICT if request.method == Method::POST => {
                ClusterError::already_exists(kind, request.name)
            }
            StatusCode::NOT_FOUND => ClusterError::not_found(kind, request.name),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ClusterError::AuthenticationFailed {
                    message: status_message(&body),
                }
            }
            _ => ClusterError::api_error(status.as_u16(), status_message(&body)),
        })
    }
}

fn status_message(body: &str) -> String {
    serde_json::from_str::<ApiStatus>(body)
        .ok()
        .map(|s| s.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string())
}

fn decode<T: DeserializeOwned>(body: &str) -> ClusterResult<T> {
    serde_json::from_str(body).map_err(|e| ClusterError::InvalidResponse {
        message: format!("Failed to parse response: {e}"),
    })
}

fn decode_object(kind: ObjectKind, body: &str) -> ClusterResult<ClusterObject> {
    Ok(match kind {
        ObjectKind::Secret => ClusterObject::Secret(decode::<Secret>(body)?),
        ObjectKind::Pod => ClusterObject::Pod(decode::<Pod>(body)?),
    })
}

#[async_trait]
impl ClusterApi for KubeClient {
    async fn create(&self, object: ClusterObject) -> ClusterResult<ClusterObject> {
        let kind = object.kind();
        let meta = object.metadata();
        let body = match &object {
            ClusterObject::Secret(secret) => serde_json::to_value(secret),
            ClusterObject::Pod(pod) => serde_json::to_value(pod),
        }
        .map_err(|e| ClusterError::InvalidResponse {
            message: format!("Failed to encode {kind}: {e}"),
        })?;

        debug!("Creating {kind} {}/{}", meta.namespace, meta.name);
        let response = self
            .execute(&ApiRequest {
                method: Method::POST,
                path: Self::collection_path(kind, &meta.namespace),
                selector: None,
                body: Some(body),
                kind,
                name: &meta.name,
            })
            .await?;

        decode_object(kind, &response)
    }

    async fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<ClusterObject> {
        let response = self
            .execute(&ApiRequest {
                method: Method::GET,
                path: Self::object_path(kind, namespace, name),
                selector: None,
                body: None,
                kind,
                name,
            })
            .await?;

        decode_object(kind, &response)
    }

    async fn list(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> ClusterResult<Vec<ClusterObject>> {
        let query = selector.to_query();
        let response = self
            .execute(&ApiRequest {
                method: Method::GET,
                path: Self::collection_path(kind, namespace),
                selector: (!query.is_empty()).then_some(query),
                body: None,
                kind,
                name: "",
            })
            .await?;

        Ok(match kind {
            ObjectKind::Secret => decode::<ObjectList<Secret>>(&response)?
                .items
                .into_iter()
                .map(ClusterObject::Secret)
                .collect(),
            ObjectKind::Pod => decode::<ObjectList<Pod>>(&response)?
                .items
                .into_iter()
                .map(ClusterObject::Pod)
                .collect(),
        })
    }

    async fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> ClusterResult<()> {
        debug!("Deleting {kind} {namespace}/{name}");
        self.execute(&ApiRequest {
            method: Method::DELETE,
            path: Self::object_path(kind, namespace, name),
            selector: None,
            body: None,
            kind,
            name,
        })
        .await?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "kubernetes"
    }
}
