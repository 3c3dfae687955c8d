//! Error taxonomy for wallet-state reads
//!
//! Every externally visible operation returns `Result<T, DomainError>`.
//! Errors carry string payloads so per-item failures can be cloned into
//! accumulating results without dragging source chains along.

use thiserror::Error;

/// Domain errors surfaced by the integration layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Address failed the base58/length check
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Input failed a local validation check
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport or RPC failure; `retryable` gates retry/fallback handling
    #[error("Network error: {message}")]
    Network { message: String, retryable: bool },

    /// Call exceeded its deadline; always retryable
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Circuit breaker rejected the call; handled inside the fallback chain
    #[error("Circuit breaker is open for endpoint: {endpoint}")]
    CircuitOpen { endpoint: String },

    /// No available endpoint advertises the required capability
    #[error("No eligible endpoint with capabilities: {required}")]
    NoEligibleEndpoint { required: String },

    /// Every candidate endpoint failed or was unavailable
    #[error("All endpoints exhausted")]
    AllEndpointsExhausted { last_error: Option<Box<DomainError>> },

    /// Metadata lookup failed for a single mint; never aborts a batch
    #[error("Metadata fetch failed for {mint}: {message}")]
    MetadataFetch { mint: String, message: String },

    /// NFT metadata came back unparseable; never aborts a batch
    #[error("Failed to parse NFT metadata for {mint}: {message}")]
    NftParse { mint: String, message: String },

    /// Arithmetic would take a balance below zero
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    /// Asset lookup missed everywhere it could be resolved
    #[error("Asset not found: {mint}")]
    AssetNotFound { mint: String },

    /// Internal cache failure; logged at the cache boundary, a miss is not an error
    #[error("Cache error: {0}")]
    Cache(String),
}

impl DomainError {
    /// Whether retry/fallback policy may recover this error
    pub fn is_retryable(&self) -> bool {
        match self {
            DomainError::Network { retryable, .. } => *retryable,
            DomainError::Timeout { .. } => true,
            // Exhaustion inherits from the failure that ended the walk, so
            // an outer retry can drive the chain again after backoff
            DomainError::AllEndpointsExhausted { last_error } => last_error
                .as_ref()
                .map(|e| e.is_retryable())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Shorthand for a retryable transport failure
    pub fn network_retryable(message: impl Into<String>) -> Self {
        DomainError::Network {
            message: message.into(),
            retryable: true,
        }
    }

    /// Shorthand for a terminal transport failure
    pub fn network_fatal(message: impl Into<String>) -> Self {
        DomainError::Network {
            message: message.into(),
            retryable: false,
        }
    }
}
