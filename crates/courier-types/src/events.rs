use serde::{Deserialize, Serialize};

use crate::api::MessageResponse;
use crate::models::MessageKind;

/// Events sent from the server to a client over the gateway socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Connection is authenticated and registered
    #[serde(rename_all = "camelCase")]
    Ready { user_id: i64, name: String },

    /// A message was persisted in one of the client's chats
    NewMessage { message: MessageResponse },

    /// Another member is typing in a chat
    #[serde(rename_all = "camelCase")]
    Typing {
        chat_id: i64,
        user_id: i64,
        name: String,
    },

    /// A client command was rejected
    Error { code: String, message: String },
}

/// Commands sent from a client to the server over the gateway socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Persist a message and fan it out to the chat's current members
    #[serde(rename_all = "camelCase")]
    SendMessage {
        chat_id: i64,
        #[serde(rename = "type")]
        kind: MessageKind,
        content: String,
    },

    /// Notify other members of the chat that the sender is typing
    #[serde(rename_all = "camelCase")]
    StartTyping { chat_id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_command_wire_shape() {
        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"send_message","data":{"chatId":7,"type":"text","content":"hi"}}"#,
        )
        .unwrap();

        match cmd {
            GatewayCommand::SendMessage {
                chat_id,
                kind,
                content,
            } => {
                assert_eq!(chat_id, 7);
                assert_eq!(kind, MessageKind::Text);
                assert_eq!(content, "hi");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_typing_event_wire_shape() {
        let event = GatewayEvent::Typing {
            chat_id: 7,
            user_id: 3,
            name: "Alice".into(),
        };

        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "typing");
        assert_eq!(v["data"]["chatId"], 7);
        assert_eq!(v["data"]["userId"], 3);
    }

    #[test]
    fn test_error_event_wire_shape() {
        let event = GatewayEvent::Error {
            code: "not-a-member".into(),
            message: "you are not a member of chat 7".into(),
        };

        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["data"]["code"], "not-a-member");
    }
}
