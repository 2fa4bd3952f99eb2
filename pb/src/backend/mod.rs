//! The orchestrator's HTTP surface
//!
//! [`PlanBackend`] is the seam the session and persistence layers are
//! written against; [`HttpBackend`] is the production implementation.

mod error;
mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AgentMessage, Plan};

pub use error::ApiError;
pub use http::HttpBackend;

/// Full state of a plan as returned by the fetch endpoint
///
/// Re-fetched on every (re)subscribe: the stream makes no cross-reconnect
/// ordering promise, so the snapshot is the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub plan: Plan,

    #[serde(default)]
    pub messages: Vec<AgentMessage>,

    /// Orchestrator-side plan record, when one exists
    #[serde(default)]
    pub mplan: Option<serde_json::Value>,

    /// Partial streaming text at snapshot time
    #[serde(default)]
    pub streaming_message: Option<String>,
}

impl PlanSnapshot {
    /// Orchestrator-side plan id, when present
    pub fn m_plan_id(&self) -> Option<String> {
        self.mplan
            .as_ref()
            .and_then(|m| m.get("id"))
            .and_then(|id| id.as_str())
            .map(str::to_string)
    }
}

/// Decision on a proposed plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDecision {
    pub m_plan_id: Option<String>,
    pub plan_id: String,
    pub approved: bool,
    pub feedback: Option<String>,
}

/// Answer to a pending clarification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationAnswer {
    pub request_id: String,
    pub answer: String,
    pub plan_id: String,
    pub m_plan_id: Option<String>,
}

/// Plan coordinates attached to persisted messages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanContext {
    pub plan_id: String,
    pub session_id: Option<String>,
    pub m_plan_id: Option<String>,
}

/// Everything the client asks of the backend over HTTP
#[async_trait]
pub trait PlanBackend: Send + Sync {
    /// Submit a goal; the orchestrator answers with the new plan record
    async fn create_plan(&self, goal: &str) -> Result<Plan, ApiError>;

    /// Ensure the agent team for a session is ready
    async fn init_team(&self, session_id: &str) -> Result<(), ApiError>;

    /// Approve or reject a proposed plan
    async fn decide_plan(&self, decision: &PlanDecision) -> Result<(), ApiError>;

    /// Answer a pending clarification
    async fn submit_clarification(&self, answer: &ClarificationAnswer) -> Result<(), ApiError>;

    /// Write one finalized message to the durable history
    async fn persist_message(
        &self,
        message: &AgentMessage,
        ctx: &PlanContext,
        is_final: bool,
        streaming_buffer: Option<&str>,
    ) -> Result<(), ApiError>;

    /// Fetch a plan's full snapshot (cache-aware)
    async fn fetch_plan(&self, plan_id: &str) -> Result<PlanSnapshot, ApiError>;

    /// List all plans (cache-aware)
    async fn list_plans(&self) -> Result<Vec<Plan>, ApiError>;
}
