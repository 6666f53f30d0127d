//! Decode inbound queue messages into [`Message`]s.

use herald_core::time::truncate_to_seconds;
use herald_core::{now_utc, Message, MessageBody};

use crate::consumer::QueueMessage;
use crate::error::QueueError;

/// Decode a queue message body.
///
/// The sent time is the provider's send timestamp (UTC, whole seconds); the
/// received time is now.
pub fn parse_message(msg: &QueueMessage) -> Result<Message, QueueError> {
    let body: MessageBody = serde_json::from_str(&msg.body)
        .map_err(|e| QueueError::Parse(format!("message {}: {}", msg.id, e)))?;

    Ok(Message {
        body,
        sent_time: truncate_to_seconds(msg.sent_at.naive_utc()),
        received_time: now_utc(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike, Utc};

    fn make_msg(id: &str, body: &str) -> QueueMessage {
        QueueMessage {
            id: id.to_string(),
            body: body.to_string(),
            receipt_handle: "handle-test".to_string(),
            sent_at: Utc.with_ymd_and_hms(2024, 6, 14, 12, 0, 0).unwrap()
                + chrono::Duration::milliseconds(420),
        }
    }

    #[test]
    fn test_parse_schedule() {
        let msg = make_msg(
            "msg-1",
            r#"{"action":"schedule","ocid":"ocds-1","phase":"tender","newLaunchTime":"2024-06-14T13:00:00","metaData":"{}"}"#,
        );
        let parsed = parse_message(&msg).unwrap();

        assert!(matches!(parsed.body, MessageBody::Schedule { .. }));
        assert_eq!(parsed.body.key().ocid, "ocds-1");
        assert_eq!(parsed.sent_time.to_string(), "2024-06-14 12:00:00");
        assert_eq!(parsed.sent_time.nanosecond(), 0);
    }

    #[test]
    fn test_parse_cancel() {
        let msg = make_msg("msg-2", r#"{"action":"cancel","ocid":"o","phase":"p"}"#);
        let parsed = parse_message(&msg).unwrap();
        assert_eq!(parsed.body.launch_time(), None);
    }

    #[test]
    fn test_parse_invalid_json() {
        let msg = make_msg("msg-bad-json", "not json at all");
        let err = parse_message(&msg).unwrap_err();

        assert!(matches!(err, QueueError::Parse(_)));
        assert!(err.to_string().contains("msg-bad-json"));
    }

    #[test]
    fn test_parse_bad_launch_time() {
        let msg = make_msg(
            "msg-bad-time",
            r#"{"action":"schedule","ocid":"o","phase":"p","newLaunchTime":"tomorrow","metaData":""}"#,
        );
        assert!(matches!(parse_message(&msg), Err(QueueError::Parse(_))));
    }
}
