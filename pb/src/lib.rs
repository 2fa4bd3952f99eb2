//! PlanBridge - client for a multi-agent task-planning backend
//!
//! A user submits a goal, the remote orchestrator proposes a plan, the
//! user approves/rejects/clarifies, and the orchestrator executes the
//! plan while streaming progress. PlanBridge turns that out-of-order,
//! partially-buffered event stream into a consistent, resumable plan
//! lifecycle with exactly-once-effective side effects.
//!
//! # Modules
//!
//! - [`client`] - transport ownership, reconnection, typed event fan-out
//! - [`session`] - the plan lifecycle state machine
//! - [`backend`] - HTTP surface of the orchestrator (trait + reqwest impl)
//! - [`persist`] - best-effort message persistence with deferred refresh
//! - [`store`] - the plan-list projection
//! - [`protocol`] - wire envelope and event vocabulary
//! - [`config`] - configuration types and loading

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod domain;
pub mod persist;
pub mod protocol;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use backend::{ApiError, HttpBackend, PlanBackend, PlanSnapshot};
pub use client::{
    ConnectionManager, ConnectionMetrics, ConnectionState, EventBus, Transport, TransportError, TransportLink,
    WsTransport,
};
pub use config::{BackendConfig, Config, ReconnectConfig};
pub use domain::{AgentKind, AgentMessage, ApprovalRequest, ClarificationRequest, Plan, PlanStatus, PlanStep};
pub use persist::MessageWriter;
pub use protocol::ClientEvent;
pub use session::{PlanSession, SessionHandle, SessionPhase, SessionSnapshot, ToastKind, UiEffects};
pub use store::{PlanListSnapshot, PlanListStore};
