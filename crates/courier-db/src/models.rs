//! Database row types — these map directly to SQLite rows.
//! Distinct from the courier-types API models to keep the DB layer
//! independent; conversion to wire shapes happens at the edges.

use chrono::{DateTime, Utc};
use courier_types::api::MessageResponse;
use courier_types::models::{MessageKind, parse_sqlite_datetime};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub phone: String,
    pub name: String,
    pub password: String,
    pub is_admin: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: i64,
    pub name: String,
    pub icon: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: String,
    pub member_count: i64,
}

#[derive(Debug, Clone)]
pub struct ChatSummaryRow {
    pub id: i64,
    pub name: String,
    pub icon: Option<String>,
    pub last_message: Option<String>,
    pub unread_count: i64,
}

/// A message joined with its sender's name and phone.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub sender_phone: String,
    pub kind: String,
    pub content: String,
    pub created_at: String,
}

impl MessageRow {
    /// Convert to the wire shape shared by the REST history read and the
    /// gateway push. Unknown kind tags degrade to text rather than erroring:
    /// the row is already committed at this point.
    pub fn into_response(self) -> MessageResponse {
        let kind = MessageKind::parse(&self.kind).unwrap_or(MessageKind::Text);
        let timestamp = parse_sqlite_datetime(&self.created_at)
            .unwrap_or_else(|| DateTime::<Utc>::default());

        MessageResponse {
            id: self.id,
            chat_id: self.chat_id,
            sender_id: self.sender_id,
            sender: self.sender_name,
            sender_phone: self.sender_phone,
            kind,
            content: self.content,
            timestamp,
        }
    }
}
