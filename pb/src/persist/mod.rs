//! Best-effort message persistence with deferred list refresh
//!
//! Finalized messages are written to the backend's history endpoint in
//! the background; the caller never waits. A failed write is logged and
//! the flow continues - losing a history entry must never block the user.
//! After a final message settles (either way), exactly one plan-list
//! refresh signal fires after a short delay so backend-side indexing can
//! catch up before list views re-read.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::{PlanBackend, PlanContext};
use crate::client::EventBus;
use crate::domain::AgentMessage;
use crate::protocol::ClientEvent;

/// Fire-and-forget writer for the durable message history
#[derive(Clone)]
pub struct MessageWriter {
    backend: Arc<dyn PlanBackend>,
    bus: Arc<EventBus>,
    refresh_delay: Duration,
}

impl MessageWriter {
    pub fn new(backend: Arc<dyn PlanBackend>, bus: Arc<EventBus>, refresh_delay: Duration) -> Self {
        Self {
            backend,
            bus,
            refresh_delay,
        }
    }

    /// Persist one finalized message without blocking the caller
    ///
    /// When `is_final` is set, the full streaming-buffer snapshot rides
    /// along and a single deferred [`ClientEvent::PlanListRefresh`] fires
    /// once the write outcome is known - success or failure alike.
    pub fn process_message(
        &self,
        message: AgentMessage,
        ctx: PlanContext,
        is_final: bool,
        streaming_buffer: Option<String>,
    ) {
        let backend = Arc::clone(&self.backend);
        let bus = Arc::clone(&self.bus);
        let delay = self.refresh_delay;

        tokio::spawn(async move {
            match backend
                .persist_message(&message, &ctx, is_final, streaming_buffer.as_deref())
                .await
            {
                Ok(()) => debug!(plan_id = %ctx.plan_id, is_final, "message persisted"),
                Err(e) => {
                    warn!(plan_id = %ctx.plan_id, is_final, error = %e, "message persistence failed, continuing");
                }
            }

            if is_final {
                tokio::time::sleep(delay).await;
                bus.emit(ClientEvent::PlanListRefresh);
            }
        });
    }
}
