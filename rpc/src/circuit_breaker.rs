//! Circuit breaker for endpoint failure tracking
//!
//! Prevents cascading failures by short-circuiting endpoints that keep
//! failing. The circuit is in one of three phases:
//! - Closed: normal operation, calls pass through
//! - Open: too many consecutive failures, reject calls immediately
//! - HalfOpen: letting a single probe through to test recovery
//!
//! Based on the classic pattern from Michael Nygard's "Release It!"

use crate::endpoint::BreakerConfig;
use parking_lot::RwLock;
use sol_types::DomainError;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Circuit phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitPhase {
    /// Calls flow normally
    Closed,
    /// Calls are rejected immediately to protect the endpoint
    Open,
    /// Testing whether the endpoint has recovered
    HalfOpen,
}

impl std::fmt::Display for CircuitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitPhase::Closed => write!(f, "closed"),
            CircuitPhase::Open => write!(f, "open"),
            CircuitPhase::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Copy)]
pub struct CircuitSnapshot {
    pub phase: CircuitPhase,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub opened_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerState {
    phase: CircuitPhase,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    /// HalfOpen admits one probe at a time; ties go to the first caller
    probe_in_flight: bool,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            phase: CircuitPhase::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

/// Per-endpoint circuit breaker
pub struct CircuitBreaker {
    endpoint: String,
    config: BreakerConfig,
    state: RwLock<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(endpoint: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            config,
            state: RwLock::new(BreakerState::default()),
        }
    }

    /// Ask for admission. Open circuits transition to HalfOpen once the
    /// recovery period has elapsed; HalfOpen admits a single probe.
    pub fn try_acquire(&self) -> Result<(), DomainError> {
        let mut state = self.state.write();

        match state.phase {
            CircuitPhase::Closed => Ok(()),
            CircuitPhase::Open => {
                let recovered = state
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.recovery)
                    .unwrap_or(true);
                if recovered {
                    state.phase = CircuitPhase::HalfOpen;
                    state.consecutive_successes = 0;
                    state.probe_in_flight = true;
                    info!(
                        "Circuit breaker for {} transitioning to HALF_OPEN",
                        self.endpoint
                    );
                    Ok(())
                } else {
                    Err(DomainError::CircuitOpen {
                        endpoint: self.endpoint.clone(),
                    })
                }
            }
            CircuitPhase::HalfOpen => {
                if state.probe_in_flight {
                    Err(DomainError::CircuitOpen {
                        endpoint: self.endpoint.clone(),
                    })
                } else {
                    state.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut state = self.state.write();

        match state.phase {
            CircuitPhase::Closed => {
                state.consecutive_failures = 0;
                state.consecutive_successes += 1;
            }
            CircuitPhase::HalfOpen => {
                state.probe_in_flight = false;
                state.consecutive_successes += 1;

                if state.consecutive_successes >= self.config.success_threshold {
                    state.phase = CircuitPhase::Closed;
                    state.consecutive_failures = 0;
                    state.consecutive_successes = 0;
                    state.opened_at = None;
                    info!(
                        "Circuit breaker for {} transitioning to CLOSED (recovered)",
                        self.endpoint
                    );
                }
            }
            CircuitPhase::Open => {
                warn!(
                    "Recorded success while circuit is OPEN for {}",
                    self.endpoint
                );
            }
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut state = self.state.write();

        match state.phase {
            CircuitPhase::Closed => {
                state.consecutive_failures += 1;
                state.consecutive_successes = 0;

                if state.consecutive_failures >= self.config.failure_threshold {
                    state.phase = CircuitPhase::Open;
                    state.opened_at = Some(Instant::now());
                    warn!(
                        "Circuit breaker for {} transitioning to OPEN ({} failures)",
                        self.endpoint, state.consecutive_failures
                    );
                }
            }
            CircuitPhase::HalfOpen => {
                // A failed probe immediately reopens with a fresh window
                state.phase = CircuitPhase::Open;
                state.opened_at = Some(Instant::now());
                state.consecutive_successes = 0;
                state.probe_in_flight = false;
                warn!(
                    "Circuit breaker for {} transitioning to OPEN (half-open probe failed)",
                    self.endpoint
                );
            }
            CircuitPhase::Open => {
                state.consecutive_failures += 1;
            }
        }
    }

    /// Give back an admission that was never used. Only meaningful in
    /// HalfOpen, where an abandoned probe would otherwise hold the slot
    /// forever.
    pub fn release(&self) {
        let mut state = self.state.write();
        if state.phase == CircuitPhase::HalfOpen {
            state.probe_in_flight = false;
        }
    }

    /// Trip the circuit regardless of the failure count
    pub fn force_open(&self, reason: &str) {
        let mut state = self.state.write();
        state.phase = CircuitPhase::Open;
        state.opened_at = Some(Instant::now());
        state.probe_in_flight = false;
        warn!(
            "Circuit breaker for {} forced OPEN: {}",
            self.endpoint, reason
        );
    }

    /// Current view of the breaker state
    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state.read();
        CircuitSnapshot {
            phase: state.phase,
            consecutive_failures: state.consecutive_failures,
            consecutive_successes: state.consecutive_successes,
            opened_at: state.opened_at,
        }
    }

    pub fn phase(&self) -> CircuitPhase {
        self.state.read().phase
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Reset to the initial closed state
    pub fn reset(&self) {
        let mut state = self.state.write();
        *state = BreakerState::default();
        debug!("Circuit breaker for {} has been reset to CLOSED", self.endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(failures: u32, successes: u32, recovery: Duration) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: failures,
            success_threshold: successes,
            recovery,
        }
    }

    #[test]
    fn test_breaker_starts_closed() {
        let cb = CircuitBreaker::new("primary", BreakerConfig::default());
        assert_eq!(cb.phase(), CircuitPhase::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = CircuitBreaker::new("primary", config(3, 2, Duration::from_secs(30)));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.phase(), CircuitPhase::Closed);

        cb.record_failure();
        assert_eq!(cb.phase(), CircuitPhase::Open);
        assert_eq!(cb.snapshot().consecutive_failures, 3);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("primary", config(3, 2, Duration::from_secs(30)));

        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.snapshot().consecutive_failures, 0);

        cb.record_failure();
        assert_eq!(cb.phase(), CircuitPhase::Closed);
    }

    #[test]
    fn test_rejects_while_open() {
        let cb = CircuitBreaker::new("primary", config(1, 1, Duration::from_secs(30)));

        cb.record_failure();
        assert_eq!(cb.phase(), CircuitPhase::Open);
        assert!(matches!(
            cb.try_acquire(),
            Err(DomainError::CircuitOpen { .. })
        ));
    }

    #[test]
    fn test_half_open_after_recovery() {
        let cb = CircuitBreaker::new("primary", config(1, 1, Duration::from_millis(20)));

        cb.record_failure();
        assert_eq!(cb.phase(), CircuitPhase::Open);

        std::thread::sleep(Duration::from_millis(30));

        assert!(cb.try_acquire().is_ok());
        assert_eq!(cb.phase(), CircuitPhase::HalfOpen);
    }

    #[test]
    fn test_half_open_admits_single_probe() {
        let cb = CircuitBreaker::new("primary", config(1, 2, Duration::from_millis(10)));

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));

        // First contender wins the probe slot, the second is rejected
        assert!(cb.try_acquire().is_ok());
        assert!(cb.try_acquire().is_err());

        // Finishing the probe frees the slot
        cb.record_success();
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn test_half_open_recovery_closes() {
        let cb = CircuitBreaker::new("primary", config(1, 2, Duration::from_millis(10)));

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));

        assert!(cb.try_acquire().is_ok());
        cb.record_success();
        assert_eq!(cb.phase(), CircuitPhase::HalfOpen);

        assert!(cb.try_acquire().is_ok());
        cb.record_success();
        assert_eq!(cb.phase(), CircuitPhase::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 0);
        assert_eq!(cb.snapshot().consecutive_successes, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new("primary", config(1, 1, Duration::from_millis(10)));

        cb.record_failure();
        let first_opened = cb.snapshot().opened_at.unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert!(cb.try_acquire().is_ok());
        cb.record_failure();
        assert_eq!(cb.phase(), CircuitPhase::Open);

        // Reopened with a fresh window
        assert!(cb.snapshot().opened_at.unwrap() > first_opened);
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn test_force_open() {
        let cb = CircuitBreaker::new("primary", BreakerConfig::default());
        cb.force_open("operator request");
        assert_eq!(cb.phase(), CircuitPhase::Open);
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn test_reset() {
        let cb = CircuitBreaker::new("primary", config(1, 1, Duration::from_secs(30)));
        cb.record_failure();
        assert_eq!(cb.phase(), CircuitPhase::Open);

        cb.reset();
        assert_eq!(cb.phase(), CircuitPhase::Closed);
        assert!(cb.try_acquire().is_ok());
    }
}
