//! Outbound envelopes published on the response queue.
//!
//! Shapes:
//! - `{"status":"NOTIFICATION","data":{...}}`
//! - `{"status":"ERROR","errorCode":"...","data":...}`

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::failure::Failure;
use crate::request::{Request, RequestId};
use crate::task::Task;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    Notification { data: NotificationData },
    Error(ErrorResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "errorCode", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorResponse {
    /// Raw inbound payload that failed to decode.
    InvalidPayloadOfRequest(String),
    SaveRequest(RequestData),
    ExpireRequest(RequestData),
    ScheduleTaskError(ScheduleTaskData),
    ReplaceTaskError(ReplaceTaskData),
    CancelTaskError(CancelTaskData),
}

// ── Payloads ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub ocid: String,
    pub phase: String,
    pub launch_time: NaiveDateTime,
    pub meta_data: String,
}

/// Echo of an inbound request. `request_id` is absent when the request
/// was never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    pub ocid: String,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_time: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<String>,
    pub sent_time: NaiveDateTime,
    pub received_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTaskData {
    pub request_id: RequestId,
    pub ocid: String,
    pub phase: String,
    pub launch_time: NaiveDateTime,
    pub meta_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceTaskData {
    pub request_id: RequestId,
    pub ocid: String,
    pub phase: String,
    pub new_launch_time: NaiveDateTime,
    pub meta_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTaskData {
    pub request_id: RequestId,
    pub ocid: String,
    pub phase: String,
}

// ── Construction ──────────────────────────────────────────────

impl From<&Task> for Response {
    fn from(task: &Task) -> Self {
        Self::Notification {
            data: NotificationData {
                ocid: task.key.ocid.clone(),
                phase: task.key.phase.clone(),
                launch_time: task.launch_time,
                meta_data: task.meta_data.clone(),
            },
        }
    }
}

impl From<&Request> for RequestData {
    fn from(request: &Request) -> Self {
        Self {
            request_id: Some(request.id()),
            ocid: request.key().ocid.clone(),
            phase: request.key().phase.clone(),
            launch_time: request.launch_time(),
            meta_data: request.meta_data().map(str::to_owned),
            sent_time: request.sent_time(),
            received_time: request.received_time(),
        }
    }
}

impl From<&Failure> for Response {
    fn from(failure: &Failure) -> Self {
        let error = match failure {
            Failure::InvalidPayload { payload } => {
                ErrorResponse::InvalidPayloadOfRequest(payload.clone())
            }
            Failure::RequestSave { message } => {
                let key = message.body.key();
                ErrorResponse::SaveRequest(RequestData {
                    request_id: None,
                    ocid: key.ocid,
                    phase: key.phase,
                    launch_time: message.body.launch_time(),
                    meta_data: message.body.meta_data().map(str::to_owned),
                    sent_time: message.sent_time,
                    received_time: message.received_time,
                })
            }
            Failure::RequestExpired { request } => {
                ErrorResponse::ExpireRequest(RequestData::from(request))
            }
            Failure::ScheduleConflict { task } => ErrorResponse::ScheduleTaskError(ScheduleTaskData {
                request_id: task.request_id,
                ocid: task.key.ocid.clone(),
                phase: task.key.phase.clone(),
                launch_time: task.launch_time,
                meta_data: task.meta_data.clone(),
            }),
            Failure::ReplaceNotFound { task } => ErrorResponse::ReplaceTaskError(ReplaceTaskData {
                request_id: task.request_id,
                ocid: task.key.ocid.clone(),
                phase: task.key.phase.clone(),
                new_launch_time: task.launch_time,
                meta_data: task.meta_data.clone(),
            }),
            Failure::CancelNotFound { request_id, key } => {
                ErrorResponse::CancelTaskError(CancelTaskData {
                    request_id: *request_id,
                    ocid: key.ocid.clone(),
                    phase: key.phase.clone(),
                })
            }
        };
        Self::Error(error)
    }
}
