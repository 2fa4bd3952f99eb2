//! Plan-list projection for list/sidebar consumers

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::PlanBackend;
use crate::client::EventBus;
use crate::domain::Plan;
use crate::protocol::ClientEvent;

/// What list views render
#[derive(Debug, Clone, Default)]
pub struct PlanListSnapshot {
    pub plans: Vec<Plan>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Holds the `{plans, loading, error}` projection
///
/// Reads go through the backend's cache/tracker, so concurrent refreshes
/// collapse into one request. The refresh bus event (emitted after a
/// final message persists) re-drives it automatically.
pub struct PlanListStore {
    backend: Arc<dyn PlanBackend>,
    watch_tx: watch::Sender<PlanListSnapshot>,
}

impl PlanListStore {
    pub fn new(backend: Arc<dyn PlanBackend>) -> Arc<Self> {
        let (watch_tx, _) = watch::channel(PlanListSnapshot::default());
        Arc::new(Self { backend, watch_tx })
    }

    pub fn watch(&self) -> watch::Receiver<PlanListSnapshot> {
        self.watch_tx.subscribe()
    }

    /// Re-fetch the plan list and publish the outcome
    pub async fn refresh(&self) {
        self.watch_tx.send_modify(|s| s.loading = true);

        match self.backend.list_plans().await {
            Ok(plans) => {
                debug!(count = plans.len(), "plan list refreshed");
                self.watch_tx.send_modify(|s| {
                    s.plans = plans;
                    s.loading = false;
                    s.error = None;
                });
            }
            Err(e) => {
                warn!(error = %e, "plan list refresh failed");
                self.watch_tx.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(e.to_string());
                });
            }
        }
    }

    /// React to [`ClientEvent::PlanListRefresh`] for the store's lifetime
    pub fn spawn_refresh_listener(self: &Arc<Self>, bus: &EventBus) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ClientEvent::PlanListRefresh) => store.refresh().await,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "plan list store fell behind the event bus");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
