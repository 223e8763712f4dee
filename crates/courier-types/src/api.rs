use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MessageKind;

// -- JWT Claims --

/// JWT claims shared across courier-api (REST middleware) and courier-gateway
/// (WebSocket authentication). Canonical definition lives here in
/// courier-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub phone: String,
    pub is_admin: bool,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub phone: String,
    pub name: String,
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntranetCheckResponse {
    pub is_intranet: bool,
}

// -- Chats --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: i64,
    pub name: String,
    pub avatar: Option<String>,
    pub last_message: Option<String>,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MarkReadRequest {
    pub last_read_message_id: i64,
}

// -- Messages --

/// A chat message as it travels over the wire: both the REST history read
/// and the gateway `new_message` push use this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub sender: String,
    pub sender_phone: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

// -- Contacts --

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub id: i64,
    pub name: String,
    pub phone: String,
}

// -- Groups --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupResponse {
    pub success: bool,
    pub group_id: i64,
}

// -- Uploads --

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

// -- Admin --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserResponse {
    pub id: i64,
    pub phone: String,
    pub name: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminGroupResponse {
    pub id: i64,
    pub name: String,
    pub icon: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub member_count: i64,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub success: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_response_wire_shape() {
        let msg = MessageResponse {
            id: 1,
            chat_id: 7,
            sender_id: 3,
            sender: "Alice".into(),
            sender_phone: "1001".into(),
            kind: MessageKind::Text,
            content: "hi".into(),
            timestamp: DateTime::<Utc>::default(),
        };

        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["chatId"], 7);
        assert_eq!(v["senderId"], 3);
        assert_eq!(v["type"], "text");
        assert_eq!(v["senderPhone"], "1001");
    }

    #[test]
    fn test_mark_read_request_rejects_unknown_fields() {
        let ok: MarkReadRequest =
            serde_json::from_str(r#"{"lastReadMessageId": 42}"#).unwrap();
        assert_eq!(ok.last_read_message_id, 42);

        assert!(serde_json::from_str::<MarkReadRequest>(
            r#"{"lastReadMessageId": 42, "extra": 1}"#
        )
        .is_err());
    }
}
