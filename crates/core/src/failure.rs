//! Classified pipeline failures. Each one becomes an outbound ERROR
//! envelope; the ones tied to a persisted request also consume it.

use crate::request::{MarkRequest, Message, Request, RequestId};
use crate::task::{Key, Task};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Inbound body could not be decoded. Carries the raw payload.
    InvalidPayload { payload: String },
    /// The decoded message could not be persisted as a request.
    RequestSave { message: Message },
    /// The request was sent at or after its launch time.
    RequestExpired { request: Request },
    /// Another task is already active for the key.
    ScheduleConflict { task: Task },
    /// No active task to replace.
    ReplaceNotFound { task: Task },
    /// No active task to cancel.
    CancelNotFound { request_id: RequestId, key: Key },
}

impl Failure {
    /// The request that must be marked used so startup replay never retries
    /// it. `None` when no request was ever persisted.
    pub fn terminal_request(&self) -> Option<MarkRequest> {
        match self {
            Self::InvalidPayload { .. } | Self::RequestSave { .. } => None,
            Self::RequestExpired { request } => Some(MarkRequest {
                request_id: request.id(),
                key: request.key().clone(),
            }),
            Self::ScheduleConflict { task } | Self::ReplaceNotFound { task } => Some(MarkRequest {
                request_id: task.request_id,
                key: task.key.clone(),
            }),
            Self::CancelNotFound { request_id, key } => Some(MarkRequest {
                request_id: *request_id,
                key: key.clone(),
            }),
        }
    }

    /// Outbound error code, also used as a log field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPayload { .. } => "INVALID_PAYLOAD_OF_REQUEST",
            Self::RequestSave { .. } => "SAVE_REQUEST",
            Self::RequestExpired { .. } => "EXPIRE_REQUEST",
            Self::ScheduleConflict { .. } => "SCHEDULE_TASK_ERROR",
            Self::ReplaceNotFound { .. } => "REPLACE_TASK_ERROR",
            Self::CancelNotFound { .. } => "CANCEL_TASK_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{CancelRequest, MessageBody};
    use chrono::NaiveDate;

    fn task() -> Task {
        Task {
            request_id: 41,
            key: Key::new("o", "p"),
            launch_time: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            meta_data: String::new(),
        }
    }

    #[test]
    fn parse_and_save_failures_are_not_terminal() {
        let t = task().launch_time;
        assert_eq!(
            Failure::InvalidPayload {
                payload: "{".into()
            }
            .terminal_request(),
            None
        );
        let message = Message {
            body: MessageBody::Cancel {
                ocid: "o".into(),
                phase: "p".into(),
            },
            sent_time: t,
            received_time: t,
        };
        assert_eq!(Failure::RequestSave { message }.terminal_request(), None);
    }

    #[test]
    fn request_outcomes_are_terminal() {
        let expected = Some(MarkRequest {
            request_id: 41,
            key: Key::new("o", "p"),
        });
        assert_eq!(
            Failure::ScheduleConflict { task: task() }.terminal_request(),
            expected
        );
        assert_eq!(
            Failure::ReplaceNotFound { task: task() }.terminal_request(),
            expected
        );
        assert_eq!(
            Failure::CancelNotFound {
                request_id: 41,
                key: Key::new("o", "p")
            }
            .terminal_request(),
            expected
        );
        let t = task().launch_time;
        let request = Request::Cancel(CancelRequest {
            id: 41,
            key: Key::new("o", "p"),
            sent_time: t,
            received_time: t,
        });
        assert_eq!(
            Failure::RequestExpired { request }.terminal_request(),
            expected
        );
    }
}
