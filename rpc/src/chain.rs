//! Fallback chain over ordered RPC endpoints
//!
//! Selects a healthy endpoint per call, runs the operation under that
//! endpoint's breaker and rate limiter, and walks to the next candidate on
//! retryable failure. Method-aware routing keeps DAS-only methods on
//! endpoints that advertise the capability.

use crate::circuit_breaker::{CircuitBreaker, CircuitPhase, CircuitSnapshot};
use crate::endpoint::{is_das_method, Capability, Commitment, EndpointConfig};
use crate::health::{EndpointHealth, HealthMonitor, HealthMonitorConfig, HealthStatus};
use crate::rate_limiter::{Admission, TokenBucket};
use crate::transport::{HttpTransport, RpcConnection, RpcTransport};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sol_types::DomainError;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runtime state of one endpoint: config plus breaker, limiter, health
/// record and counters. One-to-one with its config for the chain lifetime.
pub struct EndpointState {
    pub config: EndpointConfig,
    pub breaker: CircuitBreaker,
    pub limiter: TokenBucket,
    pub health: RwLock<EndpointHealth>,
    pub counters: EndpointCounters,
    transport: Arc<dyn RpcTransport>,
    commitment: Commitment,
}

impl EndpointState {
    fn new(
        config: EndpointConfig,
        transport: Arc<dyn RpcTransport>,
        commitment: Commitment,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.name.clone(), config.breaker);
        let limiter = TokenBucket::new(config.rate_limit);
        Self {
            config,
            breaker,
            limiter,
            health: RwLock::new(EndpointHealth::default()),
            counters: EndpointCounters::default(),
            transport,
            commitment,
        }
    }

    /// Connection handle bound to this endpoint
    pub fn connection(&self, timeout_override: Option<Duration>) -> RpcConnection {
        RpcConnection::new(
            &self.config.name,
            &self.config.url,
            self.transport.clone(),
            timeout_override.unwrap_or(self.config.timeout),
            self.commitment,
        )
    }

    fn health_status(&self) -> HealthStatus {
        self.health.read().status
    }

    fn latency_ema_ms(&self) -> Option<f64> {
        self.health.read().latency_ema_ms
    }
}

/// Per-endpoint monotonic counters
#[derive(Debug, Default)]
pub struct EndpointCounters {
    pub requests: AtomicU64,
    pub successes: AtomicU64,
    pub failures: AtomicU64,
}

/// Chain-wide monotonic counters
#[derive(Debug, Default)]
struct ChainCounters {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    fallbacks_triggered: AtomicU64,
}

/// Serializable view of the chain counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub fallbacks_triggered: u64,
    pub endpoints: Vec<EndpointMetricsSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointMetricsSnapshot {
    pub name: String,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Serializable view of one endpoint's runtime state
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStateSnapshot {
    pub name: String,
    pub url: String,
    pub priority: u32,
    pub capabilities: Vec<Capability>,
    pub breaker_phase: String,
    pub consecutive_failures: u32,
    pub health: EndpointHealth,
}

/// Per-call options for `execute`
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// RPC method about to be issued; DAS methods force the `das` capability
    pub method: Option<String>,
    /// Extra capability requirements beyond what the method implies
    pub required_capabilities: Vec<Capability>,
    /// Per-call deadline; the effective timeout also honors the endpoint
    /// and chain defaults
    pub timeout: Option<Duration>,
    /// Longest rate-limiter wait worth sleeping through before moving on
    /// to the next endpoint; `None` uses the chain default
    pub rate_limit_budget: Option<Duration>,
}

impl ExecuteOptions {
    pub fn for_method(method: &str) -> Self {
        Self {
            method: Some(method.to_string()),
            ..Default::default()
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.required_capabilities.push(capability);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Chain-level settings
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub commitment: Commitment,
    /// Ceiling applied when neither the call nor the endpoint narrows it
    pub default_timeout: Duration,
    /// Default for `ExecuteOptions::rate_limit_budget`
    pub rate_limit_budget: Duration,
    pub health: HealthMonitorConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            commitment: Commitment::default(),
            default_timeout: Duration::from_secs(30),
            rate_limit_budget: Duration::from_secs(2),
            health: HealthMonitorConfig::default(),
        }
    }
}

/// Fallback chain over N ordered endpoints
pub struct FallbackChain {
    endpoints: Arc<RwLock<Vec<Arc<EndpointState>>>>,
    config: ChainConfig,
    transport: Arc<dyn RpcTransport>,
    counters: ChainCounters,
    monitor: HealthMonitor,
}

impl FallbackChain {
    /// Build a chain over the given endpoint table and transport
    pub fn new(
        endpoint_configs: Vec<EndpointConfig>,
        config: ChainConfig,
        transport: Arc<dyn RpcTransport>,
    ) -> Result<Self, DomainError> {
        let states = build_states(endpoint_configs, &transport, config.commitment)?;
        let endpoints = Arc::new(RwLock::new(states));
        let monitor = HealthMonitor::new(endpoints.clone(), config.health.clone());

        Ok(Self {
            endpoints,
            config,
            transport,
            counters: ChainCounters::default(),
            monitor,
        })
    }

    /// Build a chain with the default reqwest transport
    pub fn with_http_transport(
        endpoint_configs: Vec<EndpointConfig>,
        config: ChainConfig,
    ) -> Result<Self, DomainError> {
        let transport: Arc<dyn RpcTransport> = Arc::new(HttpTransport::new()?);
        Self::new(endpoint_configs, config, transport)
    }

    /// Run `operation` against the best available endpoint, walking down
    /// the chain on retryable failure.
    pub async fn execute<T, F, Fut>(
        &self,
        options: ExecuteOptions,
        operation: F,
    ) -> Result<T, DomainError>
    where
        F: Fn(RpcConnection) -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let required = self.required_capabilities(&options);
        let candidates = self.ordered_candidates(&required);

        if candidates.is_empty() {
            return Err(self.fail(no_eligible(&required)));
        }

        let budget = options
            .rate_limit_budget
            .unwrap_or(self.config.rate_limit_budget);
        let mut invoked = 0u64;
        let mut last_error: Option<DomainError> = None;

        for endpoint in &candidates {
            if endpoint.breaker.try_acquire().is_err() {
                debug!("Skipping {} (circuit open)", endpoint.config.name);
                continue;
            }

            if !self.admit_rate_limited(endpoint, budget).await {
                endpoint.breaker.release();
                debug!("Skipping {} (rate limited)", endpoint.config.name);
                continue;
            }

            if invoked > 0 {
                self.counters.fallbacks_triggered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Falling back to {} (attempt {})",
                    endpoint.config.name,
                    invoked + 1
                );
            }
            invoked += 1;
            endpoint.counters.requests.fetch_add(1, Ordering::Relaxed);

            let timeout = self.effective_timeout(&options, endpoint);
            let connection = endpoint.connection(Some(timeout));

            let result = match tokio::time::timeout(timeout, operation(connection)).await {
                Ok(result) => result,
                Err(_) => Err(DomainError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(value) => {
                    endpoint.breaker.record_success();
                    endpoint.counters.successes.fetch_add(1, Ordering::Relaxed);
                    self.counters.successful_requests.fetch_add(1, Ordering::Relaxed);
                    self.counters.total_requests.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    warn!("Endpoint {} failed (retryable): {}", endpoint.config.name, e);
                    endpoint.breaker.record_failure();
                    endpoint.counters.failures.fetch_add(1, Ordering::Relaxed);
                    last_error = Some(e);
                }
                Err(e) => {
                    // The endpoint answered; the request itself is at fault
                    endpoint.breaker.record_success();
                    endpoint.counters.failures.fetch_add(1, Ordering::Relaxed);
                    return Err(self.fail(e));
                }
            }
        }

        if invoked == 0 {
            // Everything was skipped at admission; nothing reached the wire
            Err(self.fail(no_eligible(&required)))
        } else {
            Err(self.fail(DomainError::AllEndpointsExhausted {
                last_error: last_error.map(Box::new),
            }))
        }
    }

    /// Hand out a connection to the best available endpoint without
    /// running anything through it.
    pub fn get_connection(
        &self,
        required_capabilities: &[Capability],
    ) -> Result<RpcConnection, DomainError> {
        let required: HashSet<Capability> = required_capabilities.iter().copied().collect();
        let candidates = self.ordered_candidates(&required);

        candidates
            .iter()
            .find(|e| {
                e.breaker.phase() != CircuitPhase::Open
                    && e.health_status() != HealthStatus::Unhealthy
            })
            .map(|e| e.connection(None))
            .ok_or_else(|| no_eligible(&required))
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        let endpoints = self
            .endpoints
            .read()
            .iter()
            .map(|e| EndpointMetricsSnapshot {
                name: e.config.name.clone(),
                requests: e.counters.requests.load(Ordering::Relaxed),
                successes: e.counters.successes.load(Ordering::Relaxed),
                failures: e.counters.failures.load(Ordering::Relaxed),
            })
            .collect();

        MetricsSnapshot {
            total_requests: self.counters.total_requests.load(Ordering::Relaxed),
            successful_requests: self.counters.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.counters.failed_requests.load(Ordering::Relaxed),
            fallbacks_triggered: self.counters.fallbacks_triggered.load(Ordering::Relaxed),
            endpoints,
        }
    }

    pub fn get_endpoint_states(&self) -> Vec<EndpointStateSnapshot> {
        self.endpoints
            .read()
            .iter()
            .map(|e| {
                let breaker: CircuitSnapshot = e.breaker.snapshot();
                EndpointStateSnapshot {
                    name: e.config.name.clone(),
                    url: e.config.url.clone(),
                    priority: e.config.priority,
                    capabilities: e.config.capabilities.iter().copied().collect(),
                    breaker_phase: breaker.phase.to_string(),
                    consecutive_failures: breaker.consecutive_failures,
                    health: e.health.read().clone(),
                }
            })
            .collect()
    }

    pub fn start_health_monitoring(&self) {
        self.monitor.start();
    }

    pub fn stop_health_monitoring(&self) {
        self.monitor.stop();
    }

    /// Hot-swap the endpoint table. The new list is validated first, then
    /// swapped in under the chain's exclusive lock; breaker and limiter
    /// state starts fresh.
    pub fn update_endpoints(&self, endpoint_configs: Vec<EndpointConfig>) -> Result<(), DomainError> {
        let states = build_states(endpoint_configs, &self.transport, self.config.commitment)?;
        let count = states.len();
        *self.endpoints.write() = states;
        info!("Endpoint table replaced ({} endpoints)", count);
        Ok(())
    }

    /// Stop background work and drop the endpoint table. Calls after this
    /// fail with `NoEligibleEndpoint`.
    pub fn destroy(&self) {
        self.monitor.stop();
        self.endpoints.write().clear();
        info!("Fallback chain destroyed");
    }

    fn required_capabilities(&self, options: &ExecuteOptions) -> HashSet<Capability> {
        let mut required: HashSet<Capability> =
            options.required_capabilities.iter().copied().collect();
        if let Some(method) = &options.method {
            if is_das_method(method) {
                required.insert(Capability::Das);
            }
        }
        required
    }

    /// Candidates with the required capabilities, best first: breaker
    /// phase, then an advisory unhealthy demotion, then priority, then
    /// smoothed latency.
    fn ordered_candidates(&self, required: &HashSet<Capability>) -> Vec<Arc<EndpointState>> {
        let mut keyed: Vec<(u8, u8, u32, f64, Arc<EndpointState>)> = self
            .endpoints
            .read()
            .iter()
            .filter(|e| required.iter().all(|c| e.config.has_capability(*c)))
            .map(|e| {
                let breaker_rank = match e.breaker.phase() {
                    CircuitPhase::Closed => 0u8,
                    CircuitPhase::HalfOpen => 1,
                    CircuitPhase::Open => 2,
                };
                let unhealthy = (e.health_status() == HealthStatus::Unhealthy) as u8;
                let ema = e.latency_ema_ms().unwrap_or(f64::MAX);
                (breaker_rank, unhealthy, e.config.priority, ema, e.clone())
            })
            .collect();

        keyed.sort_by(|a, b| {
            (a.0, a.1, a.2)
                .cmp(&(b.0, b.1, b.2))
                .then(a.3.partial_cmp(&b.3).unwrap_or(std::cmp::Ordering::Equal))
        });

        keyed.into_iter().map(|(_, _, _, _, e)| e).collect()
    }

    /// Token-bucket admission with a single cooperative wait. Returns
    /// false when the endpoint should be skipped.
    async fn admit_rate_limited(&self, endpoint: &EndpointState, budget: Duration) -> bool {
        match endpoint.limiter.acquire(1) {
            Admission::Admitted => true,
            Admission::Denied { retry_after } => {
                if retry_after > budget {
                    return false;
                }
                // Small pad so the refill definitely lands before we retry
                tokio::time::sleep(retry_after + Duration::from_millis(5)).await;
                endpoint.limiter.acquire(1).is_admitted()
            }
        }
    }

    fn effective_timeout(&self, options: &ExecuteOptions, endpoint: &EndpointState) -> Duration {
        let mut timeout = self.config.default_timeout.min(endpoint.config.timeout);
        if let Some(requested) = options.timeout {
            timeout = timeout.min(requested);
        }
        timeout
    }

    fn fail(&self, error: DomainError) -> DomainError {
        self.counters.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);
        error
    }
}

fn no_eligible(required: &HashSet<Capability>) -> DomainError {
    let mut names: Vec<String> = required.iter().map(|c| c.to_string()).collect();
    names.sort();
    DomainError::NoEligibleEndpoint {
        required: if names.is_empty() {
            "standard".to_string()
        } else {
            names.join(",")
        },
    }
}

fn build_states(
    endpoint_configs: Vec<EndpointConfig>,
    transport: &Arc<dyn RpcTransport>,
    commitment: Commitment,
) -> Result<Vec<Arc<EndpointState>>, DomainError> {
    if endpoint_configs.is_empty() {
        return Err(DomainError::Validation(
            "at least one endpoint must be configured".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for config in &endpoint_configs {
        config.validate()?;
        if !names.insert(config.name.clone()) {
            return Err(DomainError::Validation(format!(
                "duplicate endpoint name: {}",
                config.name
            )));
        }
    }

    Ok(endpoint_configs
        .into_iter()
        .map(|config| Arc::new(EndpointState::new(config, transport.clone(), commitment)))
        .collect())
}
