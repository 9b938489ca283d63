use crate::client::AgentTransport;
use log::{ debug, info };
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{ interval, MissedTickBehavior };

pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Polls the gateway on a fixed interval and publishes reachability.
/// Probing stops when the handle is stopped or dropped.
pub struct HealthProber {
    task: JoinHandle<()>,
    status: watch::Receiver<bool>,
}

impl HealthProber {
    /// Probes once immediately, then every `period`.
    pub fn spawn(transport: Arc<dyn AgentTransport>, period: Duration) -> Self {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let connected = transport.check_health().await;
                debug!("Health probe: connected={}", connected);
                let changed = tx.send_if_modified(|current| {
                    if *current != connected {
                        *current = connected;
                        true
                    } else {
                        false
                    }
                });
                if changed {
                    info!("Gateway is now {}", if connected { "connected" } else { "disconnected" });
                }
                if tx.is_closed() {
                    break;
                }
            }
        });
        Self { task, status: rx }
    }

    pub fn status(&self) -> watch::Receiver<bool> {
        self.status.clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.status.borrow()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for HealthProber {
    fn drop(&mut self) {
        self.task.abort();
    }
}
