//! Endpoint configuration and default tables
//!
//! An endpoint is a single RPC URL plus the knobs that govern how the
//! fallback chain treats it: priority, capability tags, rate limit and
//! breaker settings. Configs are immutable once constructed; the default
//! tables are pure lookups with no process-wide state.

use serde::{Deserialize, Serialize};
use sol_types::DomainError;
use std::collections::HashSet;
use std::time::Duration;

/// Capability tag gating which methods may use an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Core JSON-RPC vocabulary every endpoint speaks
    Standard,
    /// Digital Asset Standard methods (getAsset*, searchAssets)
    Das,
    /// Historical ledger queries
    Archive,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Standard => write!(f, "standard"),
            Capability::Das => write!(f, "das"),
            Capability::Archive => write!(f, "archive"),
        }
    }
}

/// DAS method prefixes; these only route to endpoints tagged `das`
const DAS_METHOD_PREFIXES: [&str; 3] = ["getAsset", "getAssetsBy", "searchAssets"];

/// Whether a method belongs to the DAS family
pub fn is_das_method(method: &str) -> bool {
    DAS_METHOD_PREFIXES
        .iter()
        .any(|prefix| method.starts_with(prefix))
}

/// Token-bucket settings for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained requests per second (refill rate)
    pub requests_per_second: f64,
    /// Bucket capacity; must be at least the refill rate
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst: 20,
        }
    }
}

/// Circuit breaker settings for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Successful half-open probes required to close again
    pub success_threshold: u32,
    /// How long an open circuit waits before allowing a probe
    #[serde(with = "duration_millis")]
    pub recovery: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery: Duration::from_secs(30),
        }
    }
}

/// Full configuration of a single RPC endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    /// Unique name used in logs, metrics and state lookups
    pub name: String,
    /// Lower is preferred
    pub priority: u32,
    pub capabilities: HashSet<Capability>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Per-request deadline for this endpoint
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
}

impl EndpointConfig {
    /// Standard-capability endpoint with default limits
    pub fn new(name: impl Into<String>, url: impl Into<String>, priority: u32) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            priority,
            capabilities: HashSet::from([Capability::Standard]),
            rate_limit: RateLimitConfig::default(),
            breaker: BreakerConfig::default(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_capabilities(
        mut self,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        self.capabilities = capabilities.into_iter().collect();
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Check the per-endpoint invariants
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.is_empty() {
            return Err(DomainError::Validation(
                "endpoint name must not be empty".to_string(),
            ));
        }
        if self.url.is_empty() {
            return Err(DomainError::Validation(format!(
                "endpoint {} has an empty url",
                self.name
            )));
        }
        if self.rate_limit.requests_per_second <= 0.0 {
            return Err(DomainError::Validation(format!(
                "endpoint {}: requests_per_second must be positive",
                self.name
            )));
        }
        if (self.rate_limit.burst as f64) < self.rate_limit.requests_per_second {
            return Err(DomainError::Validation(format!(
                "endpoint {}: burst {} is below the refill rate {}",
                self.name, self.rate_limit.burst, self.rate_limit.requests_per_second
            )));
        }
        if self.breaker.failure_threshold == 0 || self.breaker.success_threshold == 0 {
            return Err(DomainError::Validation(format!(
                "endpoint {}: breaker thresholds must be positive",
                self.name
            )));
        }
        Ok(())
    }
}

/// Read consistency level passed on every RPC call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

/// Which default endpoint table to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Testnet,
    Local,
}

/// Default endpoint table per environment.
///
/// The production entry is the public mainnet-beta URL and is only a
/// placeholder; callers are expected to override it with a dedicated
/// provider.
pub fn default_endpoints(environment: Environment) -> Vec<EndpointConfig> {
    match environment {
        Environment::Production => vec![EndpointConfig::new(
            "mainnet-beta",
            "https://api.mainnet-beta.solana.com",
            0,
        )],
        Environment::Testnet => vec![EndpointConfig::new(
            "devnet",
            "https://api.devnet.solana.com",
            0,
        )],
        Environment::Local => vec![EndpointConfig::new(
            "localhost",
            "http://localhost:8899",
            0,
        )
        .with_capabilities([Capability::Standard, Capability::Das, Capability::Archive])],
    }
}

/// Serialize `Duration` fields as integer milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_das_method_detection() {
        assert!(is_das_method("getAsset"));
        assert!(is_das_method("getAssetBatch"));
        assert!(is_das_method("getAssetsByOwner"));
        assert!(is_das_method("searchAssets"));
        assert!(!is_das_method("getBalance"));
        assert!(!is_das_method("getSlot"));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let config = EndpointConfig::new("primary", "https://rpc.example.com", 0);
        assert!(config.validate().is_ok());
        assert!(config.has_capability(Capability::Standard));
        assert!(!config.has_capability(Capability::Das));
    }

    #[test]
    fn test_validate_rejects_burst_below_rate() {
        let config = EndpointConfig::new("primary", "https://rpc.example.com", 0)
            .with_rate_limit(RateLimitConfig {
                requests_per_second: 50.0,
                burst: 10,
            });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let config = EndpointConfig::new("", "https://rpc.example.com", 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_tables() {
        let production = default_endpoints(Environment::Production);
        assert_eq!(production.len(), 1);
        assert!(production[0].url.contains("mainnet-beta"));

        let testnet = default_endpoints(Environment::Testnet);
        assert!(testnet[0].url.contains("devnet"));

        let local = default_endpoints(Environment::Local);
        assert!(local[0].url.contains("localhost"));
        assert!(local[0].has_capability(Capability::Das));
    }

    #[test]
    fn test_commitment_default() {
        assert_eq!(Commitment::default(), Commitment::Confirmed);
        assert_eq!(Commitment::Finalized.as_str(), "finalized");
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = EndpointConfig::new("primary", "https://rpc.example.com", 1)
            .with_capabilities([Capability::Standard, Capability::Das]);
        let json = serde_json::to_string(&config).unwrap();
        let back: EndpointConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
