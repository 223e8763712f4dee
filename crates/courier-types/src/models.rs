use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message payload type tag. Stored in SQLite as plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

/// Parse a timestamp column as emitted by SQLite.
///
/// SQLite's datetime('now') stores "YYYY-MM-DD HH:MM:SS" without a timezone;
/// anything already in RFC 3339 is accepted as-is.
pub fn parse_sqlite_datetime(s: &str) -> Option<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_round_trip() {
        assert_eq!(MessageKind::parse("text"), Some(MessageKind::Text));
        assert_eq!(MessageKind::parse("image"), Some(MessageKind::Image));
        assert_eq!(MessageKind::parse("video"), None);
        assert_eq!(MessageKind::Image.as_str(), "image");
    }

    #[test]
    fn test_parse_sqlite_datetime() {
        let dt = parse_sqlite_datetime("2026-03-01 12:30:05").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-03-01T12:30:05+00:00");

        // RFC 3339 input passes through
        assert!(parse_sqlite_datetime("2026-03-01T12:30:05Z").is_some());
        assert!(parse_sqlite_datetime("not a date").is_none());
    }
}
