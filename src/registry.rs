//! # Registry: Service Registry Probe
//!
//! Queries the cluster service registry exposed by every monitored server
//! (`https://{hostname}:2443/configuration-service-admin/cluster/nodes`) and
//! normalizes its response into [`ServiceStatus`] entries.
//!
//! ## Response shape
//!
//! ```json
//! { "status": "success",
//!   "data": { "<service>": { "<node-id>": "{\"payload\":{\"hostname\":\"n1\"}}" } } }
//! ```
//!
//! Each inner value is itself a JSON document encoded as a string. An entry
//! whose payload carries a hostname is up on that host; anything else is
//! recorded as a single down entry keyed by the service name.
//!
//! Any transport or top-level parse failure yields an empty list, which the
//! status deriver reads as "services could not be determined".

use crate::model::{NodeState, ServiceNode, ServiceStatus};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry returned status {0:?}")]
    NotSuccess(String),
}

#[async_trait]
pub trait RegistryProbe: Send + Sync {
    async fn try_fetch(
        &self,
        hostname: &str,
        username: &str,
        password: &str,
    ) -> Result<Vec<ServiceStatus>, RegistryError>;

    /// Like [`RegistryProbe::try_fetch`] but never fails: errors become an empty list.
    async fn fetch(&self, hostname: &str, username: &str, password: &str) -> Vec<ServiceStatus> {
        match self.try_fetch(hostname, username, password).await {
            Ok(services) => services,
            Err(e) => {
                warn!(hostname, error = %e, "service registry unavailable");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub scheme: String,
    pub port: u16,
    pub path: String,
    pub namespace: String,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        RegistrySettings {
            scheme: "https".to_string(),
            port: 2443,
            path: "/configuration-service-admin/cluster/nodes".to_string(),
            namespace: "/serviceRegistry".to_string(),
            timeout: Duration::from_secs(5),
            accept_invalid_certs: false,
        }
    }
}

pub struct HttpRegistryProbe {
    client: reqwest::Client,
    settings: RegistrySettings,
}

impl HttpRegistryProbe {
    pub fn new(settings: RegistrySettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()?;
        Ok(HttpRegistryProbe { client, settings })
    }

    pub fn endpoint(&self, hostname: &str) -> String {
        format!(
            "{}://{}:{}{}",
            self.settings.scheme, hostname, self.settings.port, self.settings.path
        )
    }
}

pub fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

#[async_trait]
impl RegistryProbe for HttpRegistryProbe {
    async fn try_fetch(
        &self,
        hostname: &str,
        username: &str,
        password: &str,
    ) -> Result<Vec<ServiceStatus>, RegistryError> {
        let cache_buster = chrono::Utc::now().timestamp_millis().to_string();
        let body: Value = self
            .client
            .get(self.endpoint(hostname))
            .query(&[
                ("namespace", self.settings.namespace.as_str()),
                ("_", cache_buster.as_str()),
            ])
            .header(
                reqwest::header::AUTHORIZATION,
                basic_auth_header(username, password),
            )
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match body.get("status").and_then(Value::as_str) {
            Some("success") => Ok(parse_registry_response(&body)),
            other => Err(RegistryError::NotSuccess(
                other.unwrap_or_default().to_string(),
            )),
        }
    }
}

/// One registered instance of a service, as decoded from its inner record.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryNode {
    Up { hostname: String },
    Down,
}

impl RegistryNode {
    /// Decode an inner record. Never fails: anything without
    /// `payload.hostname` is `Down`.
    pub fn decode(raw: &Value) -> RegistryNode {
        let parsed = match raw {
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(v) => v,
                Err(e) => {
                    debug!(error = %e, "skipping malformed registry record");
                    return RegistryNode::Down;
                }
            },
            other => other.clone(),
        };
        match parsed
            .pointer("/payload/hostname")
            .and_then(Value::as_str)
            .filter(|h| !h.is_empty())
        {
            Some(hostname) => RegistryNode::Up {
                hostname: hostname.to_string(),
            },
            None => RegistryNode::Down,
        }
    }
}

/// Normalize the `data` object of a successful registry response. Node names
/// are unique per service; the first occurrence wins.
pub fn parse_registry_response(body: &Value) -> Vec<ServiceStatus> {
    let Some(data) = body.get("data").and_then(Value::as_object) else {
        return Vec::new();
    };

    data.iter()
        .map(|(service_name, instances)| {
            let mut nodes: Vec<ServiceNode> = Vec::new();
            let records = instances.as_object().into_iter().flat_map(|m| m.values());
            for record in records {
                let node = match RegistryNode::decode(record) {
                    RegistryNode::Up { hostname } => ServiceNode {
                        node_name: hostname,
                        status: NodeState::Up,
                    },
                    RegistryNode::Down => ServiceNode {
                        node_name: service_name.clone(),
                        status: NodeState::Down,
                    },
                };
                if !nodes.iter().any(|n| n.node_name == node.node_name) {
                    nodes.push(node);
                }
            }
            ServiceStatus {
                service_name: service_name.clone(),
                nodes,
            }
        })
        .collect()
}
