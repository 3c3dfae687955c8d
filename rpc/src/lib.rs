//! Resilient RPC access layer
//!
//! A fallback chain over N ordered JSON-RPC endpoints with:
//! - Circuit breaker per endpoint
//! - Token-bucket rate limiting per endpoint
//! - Background health probing with latency smoothing
//! - Method-aware routing (DAS methods only reach `das`-capable endpoints)
//!
//! The chain owns the endpoint states; callers hand it an async operation
//! and get the result from whichever endpoint served it.

pub mod chain;
pub mod circuit_breaker;
pub mod endpoint;
pub mod health;
pub mod rate_limiter;
pub mod transport;

pub use chain::{
    ChainConfig, EndpointState, EndpointStateSnapshot, ExecuteOptions, FallbackChain,
    MetricsSnapshot,
};
pub use circuit_breaker::{CircuitBreaker, CircuitPhase, CircuitSnapshot};
pub use endpoint::{
    default_endpoints, is_das_method, BreakerConfig, Capability, Commitment, EndpointConfig,
    Environment, RateLimitConfig,
};
pub use health::{EndpointHealth, HealthMonitorConfig, HealthStatus};
pub use rate_limiter::{Admission, TokenBucket};
pub use transport::{HttpTransport, RpcConnection, RpcRequest, RpcResponse, RpcTransport};
