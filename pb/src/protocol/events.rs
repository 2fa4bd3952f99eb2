//! Typed events published on the client event bus
//!
//! [`decode_frame`] turns raw transport text into [`ClientEvent`]s,
//! tolerating the payload variance the backend actually produces.

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{AgentKind, AgentMessage, ApprovalRequest, ClarificationRequest, PlanStatus};

use super::envelope::{
    AGENT_MESSAGE, AGENT_MESSAGE_STREAMING, AGENT_TOOL_MESSAGE, ERROR_MESSAGE, Envelope, FINAL_RESULT_MESSAGE,
    PLAN_APPROVAL_REQUEST, USER_CLARIFICATION_REQUEST,
};
use super::error_text::extract_error_text;

/// Everything a subscriber can observe on the bus
///
/// Transport frames map to the first seven variants; the rest are
/// synthesized locally.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The orchestrator proposed a plan and wants sign-off
    ApprovalRequest {
        plan_id: Option<String>,
        request: ApprovalRequest,
    },

    /// A partial "thinking" token for the currently executing step
    StreamingChunk { plan_id: Option<String>, text: String },

    /// The orchestrator needs an answer before it can proceed
    Clarification {
        plan_id: Option<String>,
        request: ClarificationRequest,
    },

    /// Tool activity notification; currently carried but not acted on
    ToolMessage { plan_id: Option<String>, data: Value },

    /// Terminal result of plan execution
    FinalResult {
        plan_id: Option<String>,
        status: PlanStatus,
        content: String,
        raw: Value,
    },

    /// An error reported by the backend mid-execution
    BackendError {
        plan_id: Option<String>,
        detail: String,
        raw: Value,
    },

    /// A finalized progress message from an agent
    AgentMessage {
        plan_id: Option<String>,
        message: AgentMessage,
    },

    /// Synthetic: transport connectivity changed
    ConnectionStatus { connected: bool },

    /// Synthetic: reconnection gave up after the attempt cap
    ReconnectExhausted { attempts: u32 },

    /// Synthetic: the plan list should be re-fetched
    PlanListRefresh,
}

impl ClientEvent {
    /// Tag name, mainly for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::ApprovalRequest { .. } => "ApprovalRequest",
            ClientEvent::StreamingChunk { .. } => "StreamingChunk",
            ClientEvent::Clarification { .. } => "Clarification",
            ClientEvent::ToolMessage { .. } => "ToolMessage",
            ClientEvent::FinalResult { .. } => "FinalResult",
            ClientEvent::BackendError { .. } => "BackendError",
            ClientEvent::AgentMessage { .. } => "AgentMessage",
            ClientEvent::ConnectionStatus { .. } => "ConnectionStatus",
            ClientEvent::ReconnectExhausted { .. } => "ReconnectExhausted",
            ClientEvent::PlanListRefresh => "PlanListRefresh",
        }
    }

    /// Plan this event belongs to, when it carries one
    pub fn plan_id(&self) -> Option<&str> {
        match self {
            ClientEvent::ApprovalRequest { plan_id, .. }
            | ClientEvent::StreamingChunk { plan_id, .. }
            | ClientEvent::Clarification { plan_id, .. }
            | ClientEvent::ToolMessage { plan_id, .. }
            | ClientEvent::FinalResult { plan_id, .. }
            | ClientEvent::BackendError { plan_id, .. }
            | ClientEvent::AgentMessage { plan_id, .. } => plan_id.as_deref(),
            _ => None,
        }
    }
}

/// Decode one transport frame into a typed event
///
/// Returns `None` for frames that should be dropped: unparsable JSON,
/// unknown `type` tags, and payloads that do not match their tag's
/// expected shape. Each drop is logged; none of them is an error.
pub fn decode_frame(text: &str) -> Option<ClientEvent> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => {
            warn!(error = %e, "decode_frame: unparsable frame, dropping");
            return None;
        }
    };

    let plan_id = envelope.plan_id.clone();
    match envelope.kind.as_str() {
        PLAN_APPROVAL_REQUEST => match serde_json::from_value::<ApprovalRequest>(envelope.data.clone()) {
            Ok(request) => Some(ClientEvent::ApprovalRequest { plan_id, request }),
            Err(e) => {
                warn!(error = %e, payload = %envelope.data, "decode_frame: unparsable approval payload, dropping");
                None
            }
        },

        AGENT_MESSAGE_STREAMING => {
            let text = envelope
                .data
                .get("content")
                .and_then(Value::as_str)
                .or_else(|| envelope.data.as_str());
            match text {
                Some(text) => Some(ClientEvent::StreamingChunk {
                    plan_id,
                    text: text.to_string(),
                }),
                None => {
                    debug!("decode_frame: streaming frame without text, dropping");
                    None
                }
            }
        }

        USER_CLARIFICATION_REQUEST => match serde_json::from_value::<ClarificationRequest>(envelope.data.clone()) {
            Ok(request) => Some(ClientEvent::Clarification { plan_id, request }),
            Err(e) => {
                warn!(error = %e, "decode_frame: unparsable clarification payload, dropping");
                None
            }
        },

        AGENT_TOOL_MESSAGE => Some(ClientEvent::ToolMessage {
            plan_id,
            data: envelope.data,
        }),

        FINAL_RESULT_MESSAGE => {
            let status = envelope
                .data
                .get("status")
                .and_then(|s| serde_json::from_value::<PlanStatus>(s.clone()).ok())
                .unwrap_or(PlanStatus::Completed);
            let content = envelope
                .data
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some(ClientEvent::FinalResult {
                plan_id,
                status,
                content,
                raw: envelope.data,
            })
        }

        ERROR_MESSAGE => {
            // The extraction chain starts one level above the payload
            let frame_value = serde_json::json!({ "data": envelope.data.clone() });
            let detail = extract_error_text(&frame_value);
            Some(ClientEvent::BackendError {
                plan_id,
                detail,
                raw: envelope.data,
            })
        }

        AGENT_MESSAGE => {
            let agent_id = envelope
                .data
                .get("agent_id")
                .or_else(|| envelope.data.get("source"))
                .and_then(Value::as_str)
                .unwrap_or("agent")
                .to_string();
            let content = envelope
                .data
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let mut message = AgentMessage::new(agent_id, AgentKind::Agent, content);
            if let Some(timestamp) = envelope.timestamp {
                message = message.with_timestamp(timestamp);
            }
            Some(ClientEvent::AgentMessage {
                plan_id,
                message: message.with_raw(envelope.data),
            })
        }

        other => {
            debug!(kind = %other, "decode_frame: unknown event type, ignoring");
            None
        }
    }
}
