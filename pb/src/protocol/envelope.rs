//! The JSON message envelope shared by inbound and outbound frames

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound event type tags
pub const PLAN_APPROVAL_REQUEST: &str = "PLAN_APPROVAL_REQUEST";
pub const AGENT_MESSAGE_STREAMING: &str = "AGENT_MESSAGE_STREAMING";
pub const USER_CLARIFICATION_REQUEST: &str = "USER_CLARIFICATION_REQUEST";
pub const AGENT_TOOL_MESSAGE: &str = "AGENT_TOOL_MESSAGE";
pub const FINAL_RESULT_MESSAGE: &str = "FINAL_RESULT_MESSAGE";
pub const ERROR_MESSAGE: &str = "ERROR_MESSAGE";
pub const AGENT_MESSAGE: &str = "AGENT_MESSAGE";

/// Outbound subscription tags
pub const SUBSCRIBE_PLAN: &str = "SUBSCRIBE_PLAN";
pub const UNSUBSCRIBE_PLAN: &str = "UNSUBSCRIBE_PLAN";

/// One frame on the realtime connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Discriminating tag
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Type-specific payload
    #[serde(default)]
    pub data: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Subscribe to a plan's event stream
    ///
    /// The backend tolerates duplicate subscribes, so this is safe to
    /// re-issue after every reconnect.
    pub fn subscribe(plan_id: &str) -> Self {
        Self {
            kind: SUBSCRIBE_PLAN.to_string(),
            plan_id: Some(plan_id.to_string()),
            session_id: None,
            data: serde_json::Value::Null,
            timestamp: Some(Utc::now()),
        }
    }

    /// Stop receiving a plan's events
    pub fn unsubscribe(plan_id: &str) -> Self {
        Self {
            kind: UNSUBSCRIBE_PLAN.to_string(),
            plan_id: Some(plan_id.to_string()),
            session_id: None,
            data: serde_json::Value::Null,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_frame_shape() {
        let frame = Envelope::subscribe("plan-42");
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["type"], "SUBSCRIBE_PLAN");
        assert_eq!(json["plan_id"], "plan-42");
        assert!(json.get("session_id").is_none());
    }

    #[test]
    fn test_envelope_parses_with_missing_fields() {
        let env: Envelope = serde_json::from_str(r#"{"type":"AGENT_MESSAGE"}"#).unwrap();
        assert_eq!(env.kind, "AGENT_MESSAGE");
        assert!(env.plan_id.is_none());
        assert!(env.data.is_null());
        assert!(env.timestamp.is_none());
    }

    #[test]
    fn test_envelope_keeps_payload_verbatim() {
        let env: Envelope =
            serde_json::from_str(r#"{"type":"X","data":{"nested":{"deep":1}}}"#).unwrap();
        assert_eq!(env.data["nested"]["deep"], 1);
    }
}
