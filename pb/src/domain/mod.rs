//! Domain types for the plan lifecycle
//!
//! These are the records the session owns: the plan itself, the pending
//! approval request, the append-only conversation log, and the pending
//! clarification. All of them cross the wire as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall status of a plan as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Creating,
    InProgress,
    AwaitingApproval,
    Completed,
    Error,
    Cancelled,
}

impl PlanStatus {
    /// Terminal statuses never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Error | PlanStatus::Cancelled)
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlanStatus::Creating => "creating",
            PlanStatus::InProgress => "in progress",
            PlanStatus::AwaitingApproval => "awaiting approval",
            PlanStatus::Completed => "completed",
            PlanStatus::Error => "error",
            PlanStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// One task-planning session, tracked from goal submission to completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Backend identifier
    pub id: String,

    /// The goal text the user submitted
    pub goal: String,

    /// Overall status; mutated only by session transitions
    pub status: PlanStatus,

    /// Conversation session this plan belongs to
    pub session_id: String,

    /// Agent team executing the plan
    #[serde(default)]
    pub team_id: Option<String>,
}

/// One step of a proposed plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Free-text action
    pub action: String,

    /// Agent responsible for the step, if assigned
    #[serde(default)]
    pub agent: Option<String>,

    /// Heading rows group the substeps that follow them
    #[serde(default)]
    pub is_heading: bool,
}

/// A proposed plan awaiting human sign-off
///
/// Immutable once received; a newly arriving request fully replaces the
/// previous one. At most one is live per plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Ordered steps of the proposal
    pub steps: Vec<PlanStep>,

    /// Supporting facts gathered by the orchestrator
    #[serde(default)]
    pub facts: Option<String>,

    /// Descriptions of the participating agents
    #[serde(default)]
    pub participants: Vec<String>,

    /// Orchestrator-side plan record id, echoed back on decisions
    #[serde(default)]
    pub m_plan_id: Option<String>,
}

/// Who authored a conversation-log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Human,
    Agent,
    SystemError,
}

/// One durable, ordered entry in the conversation/progress log
///
/// Append-only: once appended, never mutated or removed. Display order
/// is append order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Client-generated identifier, stable across persistence retries
    #[serde(default)]
    pub id: String,

    /// Identifier of the authoring agent
    pub agent_id: String,

    pub kind: AgentKind,

    pub timestamp: DateTime<Utc>,

    pub content: String,

    /// Original payload, retained verbatim for persistence and replay
    #[serde(default)]
    pub raw: serde_json::Value,

    /// Reserved for step-scoped messages
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

impl AgentMessage {
    pub fn new(agent_id: impl Into<String>, kind: AgentKind, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            agent_id: agent_id.into(),
            kind,
            timestamp: Utc::now(),
            content: content.into(),
            raw: serde_json::Value::Null,
            steps: Vec::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }
}

/// A pending question from the orchestrator
///
/// At most one per plan; cleared exactly when the user's answer is
/// accepted, or superseded by a newer request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub request_id: String,
    pub question: String,
}
