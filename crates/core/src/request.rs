//! Inbound requests: the wire body, the received message, and the
//! persisted request it becomes.

use chrono::NaiveDateTime;
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::task::{Key, Task};

/// Storage-assigned request identifier.
pub type RequestId = i64;

// ── Wire body ─────────────────────────────────────────────────

/// JSON body of an inbound request, discriminated by `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum MessageBody {
    Schedule {
        ocid: String,
        phase: String,
        #[serde(rename = "newLaunchTime", deserialize_with = "iso_local_date_time")]
        launch_time: NaiveDateTime,
        #[serde(rename = "metaData")]
        meta_data: String,
    },
    Replace {
        ocid: String,
        phase: String,
        #[serde(rename = "newLaunchTime", deserialize_with = "iso_local_date_time")]
        launch_time: NaiveDateTime,
        #[serde(rename = "metaData")]
        meta_data: String,
    },
    Cancel { ocid: String, phase: String },
}

/// ISO local date-time, seconds and fraction optional.
fn iso_local_date_time<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M"))
        .map_err(|e| de::Error::custom(format!("invalid launch time {raw:?}: {e}")))
}

impl MessageBody {
    pub fn key(&self) -> Key {
        match self {
            Self::Schedule { ocid, phase, .. }
            | Self::Replace { ocid, phase, .. }
            | Self::Cancel { ocid, phase } => Key::new(ocid.clone(), phase.clone()),
        }
    }

    pub fn launch_time(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Schedule { launch_time, .. } | Self::Replace { launch_time, .. } => {
                Some(*launch_time)
            }
            Self::Cancel { .. } => None,
        }
    }

    pub fn meta_data(&self) -> Option<&str> {
        match self {
            Self::Schedule { meta_data, .. } | Self::Replace { meta_data, .. } => {
                Some(meta_data)
            }
            Self::Cancel { .. } => None,
        }
    }

    /// Upper-case action name as stored in the `requests.action` column.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Schedule { .. } => "SCHEDULE",
            Self::Replace { .. } => "REPLACE",
            Self::Cancel { .. } => "CANCEL",
        }
    }
}

/// A decoded inbound message that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub body: MessageBody,
    pub sent_time: NaiveDateTime,
    pub received_time: NaiveDateTime,
}

// ── Persisted requests ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub id: RequestId,
    pub key: Key,
    pub launch_time: NaiveDateTime,
    pub meta_data: String,
    pub sent_time: NaiveDateTime,
    pub received_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceRequest {
    pub id: RequestId,
    pub key: Key,
    pub new_launch_time: NaiveDateTime,
    pub meta_data: String,
    pub sent_time: NaiveDateTime,
    pub received_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    pub id: RequestId,
    pub key: Key,
    pub sent_time: NaiveDateTime,
    pub received_time: NaiveDateTime,
}

/// A persisted request. Immutable once stored; consumed through the
/// `used` flag in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Schedule(ScheduleRequest),
    Replace(ReplaceRequest),
    Cancel(CancelRequest),
}

impl Request {
    /// Attach a storage id to a received message.
    pub fn from_message(id: RequestId, message: &Message) -> Self {
        let Message {
            body,
            sent_time,
            received_time,
        } = message;
        let key = body.key();
        match body {
            MessageBody::Schedule {
                launch_time,
                meta_data,
                ..
            } => Self::Schedule(ScheduleRequest {
                id,
                key,
                launch_time: *launch_time,
                meta_data: meta_data.clone(),
                sent_time: *sent_time,
                received_time: *received_time,
            }),
            MessageBody::Replace {
                launch_time,
                meta_data,
                ..
            } => Self::Replace(ReplaceRequest {
                id,
                key,
                new_launch_time: *launch_time,
                meta_data: meta_data.clone(),
                sent_time: *sent_time,
                received_time: *received_time,
            }),
            MessageBody::Cancel { .. } => Self::Cancel(CancelRequest {
                id,
                key,
                sent_time: *sent_time,
                received_time: *received_time,
            }),
        }
    }

    pub fn id(&self) -> RequestId {
        match self {
            Self::Schedule(r) => r.id,
            Self::Replace(r) => r.id,
            Self::Cancel(r) => r.id,
        }
    }

    pub fn key(&self) -> &Key {
        match self {
            Self::Schedule(r) => &r.key,
            Self::Replace(r) => &r.key,
            Self::Cancel(r) => &r.key,
        }
    }

    pub fn sent_time(&self) -> NaiveDateTime {
        match self {
            Self::Schedule(r) => r.sent_time,
            Self::Replace(r) => r.sent_time,
            Self::Cancel(r) => r.sent_time,
        }
    }

    pub fn received_time(&self) -> NaiveDateTime {
        match self {
            Self::Schedule(r) => r.received_time,
            Self::Replace(r) => r.received_time,
            Self::Cancel(r) => r.received_time,
        }
    }

    /// Requested launch time; `None` for cancellations.
    pub fn launch_time(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Schedule(r) => Some(r.launch_time),
            Self::Replace(r) => Some(r.new_launch_time),
            Self::Cancel(_) => None,
        }
    }

    pub fn meta_data(&self) -> Option<&str> {
        match self {
            Self::Schedule(r) => Some(&r.meta_data),
            Self::Replace(r) => Some(&r.meta_data),
            Self::Cancel(_) => None,
        }
    }

    /// A launch request is expired when it was sent at or after its launch
    /// time. Cancellations never expire.
    pub fn is_expired(&self) -> bool {
        self.launch_time()
            .is_some_and(|launch| self.sent_time() >= launch)
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Schedule(_) => "SCHEDULE",
            Self::Replace(_) => "REPLACE",
            Self::Cancel(_) => "CANCEL",
        }
    }
}

impl ScheduleRequest {
    pub fn to_task(&self) -> Task {
        Task {
            request_id: self.id,
            key: self.key.clone(),
            launch_time: self.launch_time,
            meta_data: self.meta_data.clone(),
        }
    }
}

impl ReplaceRequest {
    pub fn to_task(&self) -> Task {
        Task {
            request_id: self.id,
            key: self.key.clone(),
            launch_time: self.new_launch_time,
            meta_data: self.meta_data.clone(),
        }
    }
}

/// Instruction to flip a request's `used` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkRequest {
    pub request_id: RequestId,
    pub key: Key,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn message(body: MessageBody, sent: NaiveDateTime) -> Message {
        Message {
            body,
            sent_time: sent,
            received_time: sent,
        }
    }

    #[test]
    fn decodes_schedule_body() {
        let json = r#"{
            "action": "schedule",
            "ocid": "ocds-1",
            "phase": "award",
            "newLaunchTime": "2024-05-01T10:00:00",
            "metaData": "{\"lot\":1}"
        }"#;
        let body: MessageBody = serde_json::from_str(json).unwrap();
        assert_eq!(
            body,
            MessageBody::Schedule {
                ocid: "ocds-1".into(),
                phase: "award".into(),
                launch_time: at(10, 0),
                meta_data: "{\"lot\":1}".into(),
            }
        );
    }

    #[test]
    fn replace_and_cancel_tags_map_to_their_own_variants() {
        let replace: MessageBody = serde_json::from_str(
            r#"{"action":"replace","ocid":"o","phase":"p","newLaunchTime":"2024-05-01T11:00:00","metaData":"m"}"#,
        )
        .unwrap();
        assert!(matches!(replace, MessageBody::Replace { .. }));

        let cancel: MessageBody =
            serde_json::from_str(r#"{"action":"cancel","ocid":"o","phase":"p"}"#).unwrap();
        assert!(matches!(cancel, MessageBody::Cancel { .. }));
    }

    #[test]
    fn launch_time_accepts_minute_and_fractional_precision() {
        let launch = |raw: &str| {
            let json = format!(
                r#"{{"action":"schedule","ocid":"o","phase":"p","newLaunchTime":"{raw}","metaData":""}}"#
            );
            serde_json::from_str::<MessageBody>(&json).map(|b| b.launch_time())
        };
        assert_eq!(launch("2024-05-01T10:00").unwrap(), Some(at(10, 0)));
        assert_eq!(
            launch("2024-05-01T10:00:00.250").unwrap(),
            Some(at(10, 0) + chrono::Duration::milliseconds(250))
        );
        assert!(launch("2024-05-01T10").is_err());
        assert!(launch("2024-05-01 10:00:00").is_err());
    }

    #[test]
    fn rejects_unknown_action_and_missing_fields() {
        assert!(serde_json::from_str::<MessageBody>(r#"{"action":"pause","ocid":"o","phase":"p"}"#).is_err());
        assert!(serde_json::from_str::<MessageBody>(r#"{"action":"schedule","ocid":"o","phase":"p"}"#).is_err());
    }

    #[test]
    fn from_message_carries_payload() {
        let msg = message(
            MessageBody::Replace {
                ocid: "o".into(),
                phase: "p".into(),
                launch_time: at(12, 0),
                meta_data: "m".into(),
            },
            at(9, 0),
        );
        let request = Request::from_message(7, &msg);
        assert_eq!(request.id(), 7);
        assert_eq!(request.key(), &Key::new("o", "p"));
        assert_eq!(request.launch_time(), Some(at(12, 0)));
        assert_eq!(request.action(), "REPLACE");
        match request {
            Request::Replace(r) => assert_eq!(r.to_task().launch_time, at(12, 0)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn expiry_uses_sent_time() {
        let body = MessageBody::Schedule {
            ocid: "o".into(),
            phase: "p".into(),
            launch_time: at(10, 0),
            meta_data: String::new(),
        };
        let early = Request::from_message(1, &message(body.clone(), at(9, 59)));
        let exact = Request::from_message(2, &message(body.clone(), at(10, 0)));
        let late = Request::from_message(3, &message(body, at(10, 1)));
        assert!(!early.is_expired());
        assert!(exact.is_expired());
        assert!(late.is_expired());
    }

    #[test]
    fn cancel_never_expires() {
        let body = MessageBody::Cancel {
            ocid: "o".into(),
            phase: "p".into(),
        };
        let request = Request::from_message(1, &message(body, at(23, 0)));
        assert!(!request.is_expired());
        assert_eq!(request.launch_time(), None);
    }
}
