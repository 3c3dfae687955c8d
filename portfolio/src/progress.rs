//! Discovery progress events
//!
//! Listeners subscribe explicitly and are invoked synchronously at the
//! emission point; there is no background forwarding timer.

use parking_lot::RwLock;
use serde::Serialize;

/// Phase of a wallet discovery run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryPhase {
    CacheCheck,
    FetchNative,
    FetchAccounts,
    Classify,
    Persist,
    Complete,
    Failed,
}

/// One progress notification
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub wallet: String,
    pub phase: DiscoveryPhase,
    /// Rough completion percentage in [0, 100]
    pub percent: u8,
}

type Listener = Box<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Synchronous subscriber list
#[derive(Default)]
pub struct ProgressListeners {
    listeners: RwLock<Vec<Listener>>,
}

impl ProgressListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&ProgressEvent) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    pub fn emit(&self, wallet: &str, phase: DiscoveryPhase, percent: u8) {
        let event = ProgressEvent {
            wallet: wallet.to_string(),
            phase,
            percent: percent.min(100),
        };
        for listener in self.listeners.read().iter() {
            listener(&event);
        }
    }
}
