//! Canonical session state and its read-only projection

use serde::{Deserialize, Serialize};

use crate::domain::{AgentMessage, ApprovalRequest, ClarificationRequest, Plan, PlanStatus};

/// Where the session is in the plan lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No plan open
    #[default]
    Idle,
    /// Goal submitted; waiting for the orchestrator's proposal
    Creating,
    /// A proposal is awaiting the user's decision
    AwaitingApproval,
    /// The orchestrator is executing the approved plan
    InProgress,
    /// Execution paused on a question only the user can answer
    AwaitingClarification,
    /// Terminal: plan finished
    Completed,
    /// Terminal for this session: unrecoverable error
    Error,
    /// Terminal: user rejected the proposal
    Cancelled,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Error | SessionPhase::Cancelled)
    }

    /// Phase a freshly loaded plan resumes in
    pub fn from_status(status: PlanStatus) -> Self {
        match status {
            PlanStatus::Creating => SessionPhase::Creating,
            PlanStatus::AwaitingApproval => SessionPhase::AwaitingApproval,
            PlanStatus::InProgress => SessionPhase::InProgress,
            PlanStatus::Completed => SessionPhase::Completed,
            PlanStatus::Error => SessionPhase::Error,
            PlanStatus::Cancelled => SessionPhase::Cancelled,
        }
    }
}

/// UI-facing booleans derived from the lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFlags {
    /// Goal submitted, proposal not yet received
    pub waiting_for_plan: bool,

    /// Streaming tokens are accumulating
    pub buffering: bool,

    /// Approve/reject controls are active
    pub approval_enabled: bool,

    /// Chat input is active
    pub input_enabled: bool,

    /// Execution-in-flight indicator
    pub processing: bool,
}

/// Read-only projection of the canonical session state
///
/// Published on a watch channel after every transition; consumers never
/// mutate it.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub plan: Option<Plan>,
    pub approval: Option<ApprovalRequest>,
    pub clarification: Option<ClarificationRequest>,
    pub messages: Vec<AgentMessage>,
    pub streaming: String,
    pub flags: SessionFlags,
}
