use serde::{Deserialize, Serialize};

/// A message flowing from the agent side to the connected client.
///
/// A tool call produces at most two of these: the status text, then (for
/// screenshot-producing tools) a `screenshot` message carrying the encoded
/// artifact. The transport must emit them in that order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Screenshot,
    Image,
}

impl OutboundMessage {
    pub fn text(content: &str) -> Self {
        Self {
            kind: MessageKind::Text,
            content: content.to_string(),
            mime_type: None,
            tool_name: None,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// `content` is the base64-encoded image payload.
    pub fn screenshot(tool_name: &str, base64_data: String) -> Self {
        Self {
            kind: MessageKind::Screenshot,
            content: base64_data,
            mime_type: Some("image/jpeg".to_string()),
            tool_name: Some(tool_name.to_string()),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screenshot_message_shape() {
        let msg = OutboundMessage::screenshot("browse_url", "QUJD".to_string());
        assert_eq!(msg.kind, MessageKind::Screenshot);
        assert_eq!(msg.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(msg.tool_name.as_deref(), Some("browse_url"));

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "screenshot");
        assert_eq!(json["content"], "QUJD");
    }

    #[test]
    fn test_text_message_omits_media_fields() {
        let json = serde_json::to_value(OutboundMessage::text("ok")).unwrap();
        assert!(json.get("mime_type").is_none());
        assert!(json.get("tool_name").is_none());
    }
}
