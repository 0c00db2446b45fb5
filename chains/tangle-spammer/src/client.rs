//! Node HTTP API client.
//!
//! Workers only see [`TangleApi`]. [`HttpNode`] speaks the node's JSON
//! command API over `reqwest`.

use async_trait::async_trait;
use core_logic::{ConfigError, NetworkError, NodeEndpoint};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const API_VERSION_HEADER: &str = "X-IOTA-API-Version";
const POOL_MAX_IDLE_PER_HOST: usize = 30;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeInfo {
    pub app_name: String,
    pub app_version: String,
    pub latest_milestone_index: u64,
    pub latest_solid_subtangle_milestone_index: u64,
    pub neighbors: u32,
    pub tips: u32,
}

impl NodeInfo {
    pub fn is_synced(&self) -> bool {
        self.latest_milestone_index > 0
            && self.latest_milestone_index == self.latest_solid_subtangle_milestone_index
    }
}

/// Two tips to attach a bundle to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tips {
    pub trunk_transaction: String,
    pub branch_transaction: String,
}

#[derive(Deserialize)]
struct AttachResponse {
    trytes: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[async_trait]
pub trait TangleApi: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn node_info(&self) -> Result<NodeInfo, NetworkError>;

    async fn transactions_to_approve(&self, depth: u32) -> Result<Tips, NetworkError>;

    /// Runs proof-of-work; returns the attached payloads in the same order.
    async fn attach_to_tangle(
        &self,
        tips: &Tips,
        mwm: u8,
        payloads: &[String],
    ) -> Result<Vec<String>, NetworkError>;

    async fn broadcast_transactions(&self, payloads: &[String]) -> Result<(), NetworkError>;
}

pub struct HttpNode {
    client: reqwest::Client,
    url: url::Url,
    endpoint: String,
    timeout: Duration,
}

impl HttpNode {
    pub fn new(node: &NodeEndpoint) -> Result<Self, ConfigError> {
        let url = url::Url::parse(&node.url).map_err(|_| ConfigError::InvalidNodeUrl {
            url: node.url.clone(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(node.timeout())
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "nodes".to_string(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url,
            endpoint: node.url.clone(),
            timeout: node.timeout(),
        })
    }

    async fn command<T: DeserializeOwned>(
        &self,
        command: &str,
        mut body: Value,
    ) -> Result<T, NetworkError> {
        body["command"] = Value::String(command.to_string());

        let response = self
            .client
            .post(self.url.clone())
            .header(API_VERSION_HEADER, "1")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;
        debug!(endpoint = %self.endpoint, command, status = status.as_u16(), "node response");

        parse_response(&self.endpoint, command, status.as_u16(), &text)
    }

    fn transport_error(&self, e: reqwest::Error) -> NetworkError {
        if e.is_timeout() {
            NetworkError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
                endpoint: self.endpoint.clone(),
            }
        } else {
            NetworkError::ConnectionRefused {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            }
        }
    }
}

fn parse_response<T: DeserializeOwned>(
    endpoint: &str,
    command: &str,
    status: u16,
    body: &str,
) -> Result<T, NetworkError> {
    if !(200..300).contains(&status) {
        return Err(match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { error }) => NetworkError::NodeRejected {
                endpoint: endpoint.to_string(),
                command: command.to_string(),
                reason: error,
            },
            Err(_) => NetworkError::HttpError {
                status_code: status,
                endpoint: endpoint.to_string(),
            },
        });
    }

    serde_json::from_str(body).map_err(|e| NetworkError::InvalidResponse {
        endpoint: endpoint.to_string(),
        reason: format!("{}: {}", command, e),
    })
}

#[async_trait]
impl TangleApi for HttpNode {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn node_info(&self) -> Result<NodeInfo, NetworkError> {
        self.command("getNodeInfo", json!({})).await
    }

    async fn transactions_to_approve(&self, depth: u32) -> Result<Tips, NetworkError> {
        self.command("getTransactionsToApprove", json!({ "depth": depth }))
            .await
    }

    async fn attach_to_tangle(
        &self,
        tips: &Tips,
        mwm: u8,
        payloads: &[String],
    ) -> Result<Vec<String>, NetworkError> {
        let response: AttachResponse = self
            .command(
                "attachToTangle",
                json!({
                    "trunkTransaction": tips.trunk_transaction,
                    "branchTransaction": tips.branch_transaction,
                    "minWeightMagnitude": mwm,
                    "trytes": payloads,
                }),
            )
            .await?;

        if response.trytes.len() != payloads.len() {
            return Err(NetworkError::InvalidResponse {
                endpoint: self.endpoint.clone(),
                reason: format!(
                    "attachToTangle returned {} transactions for {}",
                    response.trytes.len(),
                    payloads.len()
                ),
            });
        }
        Ok(response.trytes)
    }

    async fn broadcast_transactions(&self, payloads: &[String]) -> Result<(), NetworkError> {
        let _: Value = self
            .command("broadcastTransactions", json!({ "trytes": payloads }))
            .await?;
        Ok(())
    }
}
