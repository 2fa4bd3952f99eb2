//! Best-effort extraction of human-readable text from backend errors
//!
//! Backend error events arrive with inconsistent nesting depending on
//! which layer of the orchestrator produced them. Extraction walks the
//! known shapes from most- to least-nested and falls back to a generic
//! message rather than showing the user raw JSON.

use serde_json::Value;

/// Shown when no recognizable error text is present
pub const GENERIC_ERROR_TEXT: &str = "An unexpected error occurred while processing the plan";

/// Pull the most specific error text out of an error-event payload
///
/// Tries, in order: `data.data.content`, `data.content`, `content`, the
/// payload itself as a string, then the generic fallback.
pub fn extract_error_text(payload: &Value) -> String {
    payload
        .pointer("/data/data/content")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/data/content").and_then(Value::as_str))
        .or_else(|| payload.get("content").and_then(Value::as_str))
        .or_else(|| payload.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| GENERIC_ERROR_TEXT.to_string())
}

/// Render error text with a warning glyph and indented continuation lines
pub fn format_error_block(text: &str) -> String {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or(GENERIC_ERROR_TEXT);
    let mut out = format!("\u{26a0} {}", first);
    for line in lines {
        out.push('\n');
        out.push_str("  ");
        out.push_str(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_doubly_nested_content() {
        let payload = json!({"data": {"data": {"content": "Model deployment not found"}}});
        assert_eq!(extract_error_text(&payload), "Model deployment not found");
    }

    #[test]
    fn test_singly_nested_content() {
        let payload = json!({"data": {"content": "Team is not available"}});
        assert_eq!(extract_error_text(&payload), "Team is not available");
    }

    #[test]
    fn test_top_level_content() {
        let payload = json!({"content": "Quota exceeded"});
        assert_eq!(extract_error_text(&payload), "Quota exceeded");
    }

    #[test]
    fn test_raw_string_payload() {
        let payload = json!("connection reset by peer");
        assert_eq!(extract_error_text(&payload), "connection reset by peer");
    }

    #[test]
    fn test_unrecognized_shape_falls_back() {
        let payload = json!({"code": 500});
        assert_eq!(extract_error_text(&payload), GENERIC_ERROR_TEXT);
    }

    #[test]
    fn test_nesting_precedence() {
        // The deepest known shape wins when several are present
        let payload = json!({
            "content": "outer",
            "data": {"content": "middle", "data": {"content": "inner"}}
        });
        assert_eq!(extract_error_text(&payload), "inner");
    }

    #[test]
    fn test_format_single_line() {
        assert_eq!(format_error_block("boom"), "\u{26a0} boom");
    }

    #[test]
    fn test_format_multiline_indents_continuation() {
        let formatted = format_error_block("first\nsecond\nthird");
        assert_eq!(formatted, "\u{26a0} first\n  second\n  third");
    }
}
