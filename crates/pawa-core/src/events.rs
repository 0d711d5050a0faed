//! Messages exchanged between the chat panel session and its view.
//!
//! The JSON shape matches the webview channel: an object tagged by `type`
//! with camelCase fields.

use serde::{Deserialize, Serialize};

use crate::actions::CodeAction;

/// View to session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    SendMessage {
        message: String,
    },
    ClearHistory,
    #[serde(rename_all = "camelCase")]
    ApplyCode {
        code: String,
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_path: Option<String>,
    },
    /// Editor command routed through the panel session.
    RunAction {
        action: CodeAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<String>,
    },
}

/// Session to view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    UserMessage {
        message: String,
    },
    AssistantChunk {
        chunk: String,
    },
    #[serde(rename_all = "camelCase")]
    Loading {
        is_loading: bool,
    },
    Error {
        error: String,
    },
    ClearChat,
}

/// Value of a `data-action` attribute on a rendered code block button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAction {
    Copy,
    Apply,
}

impl BlockAction {
    pub fn parse(attr: &str) -> Option<Self> {
        match attr {
            "copy" => Some(BlockAction::Copy),
            "apply" => Some(BlockAction::Apply),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_wire_shape() {
        let msg: InboundMessage =
            serde_json::from_value(json!({"type": "sendMessage", "message": "hi"})).unwrap();
        assert_eq!(msg, InboundMessage::SendMessage { message: "hi".into() });

        let msg: InboundMessage = serde_json::from_value(json!({
            "type": "applyCode", "code": "x", "language": "rust", "filePath": "/tmp/a.rs"
        }))
        .unwrap();
        assert_eq!(
            msg,
            InboundMessage::ApplyCode {
                code: "x".into(),
                language: "rust".into(),
                file_path: Some("/tmp/a.rs".into()),
            }
        );

        let msg: InboundMessage = serde_json::from_value(json!({"type": "clearHistory"})).unwrap();
        assert_eq!(msg, InboundMessage::ClearHistory);

        let msg: InboundMessage =
            serde_json::from_value(json!({"type": "runAction", "action": "refactor"})).unwrap();
        assert_eq!(
            msg,
            InboundMessage::RunAction {
                action: CodeAction::Refactor,
                input: None,
            }
        );
    }

    #[test]
    fn test_outbound_wire_shape() {
        assert_eq!(
            serde_json::to_value(OutboundMessage::Loading { is_loading: true }).unwrap(),
            json!({"type": "loading", "isLoading": true})
        );
        assert_eq!(
            serde_json::to_value(OutboundMessage::AssistantChunk { chunk: "a".into() }).unwrap(),
            json!({"type": "assistantChunk", "chunk": "a"})
        );
        assert_eq!(
            serde_json::to_value(OutboundMessage::ClearChat).unwrap(),
            json!({"type": "clearChat"})
        );
    }

    #[test]
    fn test_block_action_attr() {
        assert_eq!(BlockAction::parse("copy"), Some(BlockAction::Copy));
        assert_eq!(BlockAction::parse("apply"), Some(BlockAction::Apply));
        assert_eq!(BlockAction::parse("delete"), None);
    }
}
