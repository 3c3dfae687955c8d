//! JSON-RPC 2.0 wire shapes and the transport seam
//!
//! The chain never talks HTTP directly; it goes through `RpcTransport`, a
//! narrow async trait the default reqwest implementation and the test
//! mocks both satisfy. Transport failures come back already classified as
//! retryable or terminal.

use crate::endpoint::Commitment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sol_types::DomainError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// JSON-RPC request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(method: &str, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        }
    }
}

/// JSON-RPC response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub result: Option<Value>,
    pub error: Option<RpcErrorObject>,
    pub id: u64,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    /// Server-side errors (the reserved -32000..-32099 band) are worth
    /// retrying elsewhere; protocol errors like invalid params are not.
    pub fn is_retryable(&self) -> bool {
        (-32099..=-32000).contains(&self.code)
    }
}

/// The one seam between the chain and the network
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Send a request to `url` and return the unwrapped `result` value.
    async fn call(
        &self,
        url: &str,
        request: &RpcRequest,
        timeout: Duration,
    ) -> Result<Value, DomainError>;
}

/// Default transport over reqwest
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .user_agent("sol-integration/0.1")
            .build()
            .map_err(|e| DomainError::network_fatal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(
        &self,
        url: &str,
        request: &RpcRequest,
        timeout: Duration,
    ) -> Result<Value, DomainError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            // 5xx and 429 are transient; other HTTP errors are terminal
            let retryable = status.is_server_error() || status.as_u16() == 429;
            let err = DomainError::Network {
                message: format!("HTTP {} from {}", status, url),
                retryable,
            };
            return Err(err);
        }

        let rpc_response: RpcResponse = response.json().await.map_err(|e| {
            DomainError::network_fatal(format!("failed to parse RPC response: {}", e))
        })?;

        if let Some(error) = rpc_response.error {
            debug!(
                "RPC error {} from {} for {}: {}",
                error.code, url, request.method, error.message
            );
            return Err(DomainError::Network {
                message: format!("RPC error {}: {}", error.code, error.message),
                retryable: error.is_retryable(),
            });
        }

        rpc_response
            .result
            .ok_or_else(|| DomainError::network_fatal("RPC response carried neither result nor error"))
    }
}

fn classify_reqwest_error(error: reqwest::Error, timeout: Duration) -> DomainError {
    if error.is_timeout() {
        DomainError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else if error.is_connect() || error.is_request() {
        // Connection resets and refused connections are transient
        DomainError::network_retryable(format!("transport error: {}", error))
    } else {
        DomainError::network_fatal(format!("transport error: {}", error))
    }
}

/// Connection handle the chain passes to operations.
///
/// Cheap to clone; carries the endpoint it is bound to, the effective
/// per-call timeout and the read commitment.
#[derive(Clone)]
pub struct RpcConnection {
    endpoint_name: Arc<str>,
    url: Arc<str>,
    transport: Arc<dyn RpcTransport>,
    timeout: Duration,
    commitment: Commitment,
}

impl RpcConnection {
    pub fn new(
        endpoint_name: &str,
        url: &str,
        transport: Arc<dyn RpcTransport>,
        timeout: Duration,
        commitment: Commitment,
    ) -> Self {
        Self {
            endpoint_name: Arc::from(endpoint_name),
            url: Arc::from(url),
            transport,
            timeout,
            commitment,
        }
    }

    /// Issue a single JSON-RPC call on this endpoint
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, DomainError> {
        let request = RpcRequest::new(method, params);
        self.transport.call(&self.url, &request, self.timeout).await
    }

    pub fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn commitment(&self) -> Commitment {
        self.commitment
    }

    /// The `{"commitment": ...}` config object most read methods accept
    pub fn commitment_config(&self) -> Value {
        serde_json::json!({ "commitment": self.commitment.as_str() })
    }
}

impl std::fmt::Debug for RpcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConnection")
            .field("endpoint", &self.endpoint_name)
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .field("commitment", &self.commitment)
            .finish()
    }
}
