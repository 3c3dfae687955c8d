//! Background endpoint health probing
//!
//! The monitor periodically issues a cheap `getSlot` against every
//! endpoint and tags it healthy, degraded or unhealthy. The result is
//! advisory: it feeds endpoint ranking and `get_connection`, it never
//! opens breakers.

use crate::chain::EndpointState;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Exponential moving average weight for probe latency
const LATENCY_EMA_ALPHA: f64 = 0.2;

/// Probe failures before an endpoint is tagged unhealthy
const UNHEALTHY_AFTER_FAILURES: u32 = 3;

/// How many endpoints are probed concurrently
const PROBE_CONCURRENCY: usize = 5;

/// Advisory health status of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    /// Not probed yet
    Unknown,
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus::Unknown
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Health record kept per endpoint, updated only by probes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_probed_at: Option<DateTime<Utc>>,
    pub consecutive_probe_failures: u32,
    /// Smoothed probe latency in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ema_ms: Option<f64>,
}

impl EndpointHealth {
    pub fn record_probe_success(&mut self, latency: Duration) {
        let sample = latency.as_secs_f64() * 1000.0;
        self.latency_ema_ms = Some(match self.latency_ema_ms {
            Some(ema) => LATENCY_EMA_ALPHA * sample + (1.0 - LATENCY_EMA_ALPHA) * ema,
            None => sample,
        });
        self.status = HealthStatus::Healthy;
        self.consecutive_probe_failures = 0;
        self.last_probed_at = Some(Utc::now());
    }

    pub fn record_probe_failure(&mut self) {
        self.consecutive_probe_failures += 1;
        self.status = if self.consecutive_probe_failures >= UNHEALTHY_AFTER_FAILURES {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        };
        self.last_probed_at = Some(Utc::now());
    }
}

/// Health monitor settings
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Time between probe rounds
    pub probe_interval: Duration,
    /// Deadline for a single probe
    pub probe_timeout: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

enum MonitorMessage {
    Shutdown,
}

struct MonitorTask {
    shutdown_tx: mpsc::Sender<MonitorMessage>,
    handle: tokio::task::JoinHandle<()>,
}

/// Periodic prober over the chain's endpoint list
pub struct HealthMonitor {
    endpoints: Arc<RwLock<Vec<Arc<EndpointState>>>>,
    config: HealthMonitorConfig,
    task: Mutex<Option<MonitorTask>>,
}

impl HealthMonitor {
    pub fn new(
        endpoints: Arc<RwLock<Vec<Arc<EndpointState>>>>,
        config: HealthMonitorConfig,
    ) -> Self {
        Self {
            endpoints,
            config,
            task: Mutex::new(None),
        }
    }

    /// Spawn the probe loop; a second start is a no-op
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            debug!("Health monitor already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<MonitorMessage>(1);
        let endpoints = self.endpoints.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.probe_interval);
            // First tick fires immediately so fresh chains get health data fast
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        probe_round(&endpoints, config.probe_timeout).await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Health monitor shutting down");
                        break;
                    }
                }
            }
        });

        info!(
            "Health monitoring started (interval {:?})",
            self.config.probe_interval
        );
        *task = Some(MonitorTask { shutdown_tx, handle });
    }

    /// Stop the probe loop; health records keep their last values
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            if task.shutdown_tx.try_send(MonitorMessage::Shutdown).is_err() {
                // Channel gone means the task already exited; make sure
                task.handle.abort();
            }
            info!("Health monitoring stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Probe every endpoint once with bounded concurrency
async fn probe_round(endpoints: &Arc<RwLock<Vec<Arc<EndpointState>>>>, probe_timeout: Duration) {
    let snapshot: Vec<Arc<EndpointState>> = endpoints.read().iter().cloned().collect();

    stream::iter(snapshot)
        .for_each_concurrent(PROBE_CONCURRENCY, |endpoint| async move {
            probe_endpoint(&endpoint, probe_timeout).await;
        })
        .await;
}

async fn probe_endpoint(endpoint: &Arc<EndpointState>, probe_timeout: Duration) {
    let connection = endpoint.connection(Some(probe_timeout));
    let started = Instant::now();

    match connection.call("getSlot", vec![]).await {
        Ok(_) => {
            let latency = started.elapsed();
            endpoint.health.write().record_probe_success(latency);
            debug!(
                "Probe succeeded for {} in {:?}",
                endpoint.config.name, latency
            );
        }
        Err(e) => {
            let mut health = endpoint.health.write();
            health.record_probe_failure();
            warn!(
                "Probe failed for {} ({} consecutive): {}",
                endpoint.config.name, health.consecutive_probe_failures, e
            );
        }
    }
}
