//! AWS SQS consumer and publisher.

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::BehaviorVersion;
use aws_sdk_sqs::types::{MessageSystemAttributeName, QueueAttributeName};
use aws_sdk_sqs::Client;
use chrono::{TimeZone, Utc};
use tracing::{debug, info};

use herald_core::config::{AwsConfig, QueueConfig};

use crate::consumer::{QueueConsumer, QueueMessage, QueueStatus};
use crate::error::QueueError;
use crate::publisher::QueuePublisher;

/// SQS caps a single receive at 10 messages.
const SQS_MAX_BATCH: u32 = 10;

/// Build an SQS client from explicit config.
///
/// Does not use `aws_config::defaults()`: a generic `AWS_ENDPOINT_URL` in the
/// environment would otherwise route SQS calls to another service.
fn build_client(aws: &AwsConfig) -> Client {
    let region = aws_sdk_sqs::config::Region::new(aws.region.clone());
    let mut sqs_config = aws_sdk_sqs::Config::builder()
        .region(region)
        .behavior_version(BehaviorVersion::latest());

    if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
        let creds = Credentials::new(
            key_id,
            secret,
            aws.session_token.clone(),
            None,
            "herald-static",
        );
        sqs_config = sqs_config.credentials_provider(creds);
    }

    if let Some(endpoint) = aws.endpoint_url.as_deref().filter(|e| !e.is_empty()) {
        let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}")
        };
        sqs_config = sqs_config.endpoint_url(url);
    }

    Client::from_conf(sqs_config.build())
}

async fn approximate_depth(client: &Client, queue_url: &str) -> Result<Option<u64>, QueueError> {
    let resp = client
        .get_queue_attributes()
        .queue_url(queue_url)
        .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
        .send()
        .await
        .map_err(|e| QueueError::Connection(format!("SQS attributes failed: {e:?}")))?;

    Ok(resp
        .attributes()
        .and_then(|attrs| attrs.get(&QueueAttributeName::ApproximateNumberOfMessages))
        .and_then(|v| v.parse::<u64>().ok()))
}

// ── Consumer ──────────────────────────────────────────────────

/// Consumer of the inbound request queue.
pub struct SqsConsumer {
    client: Client,
    queue_url: String,
    wait_time_secs: i32,
    visibility_timeout_secs: i32,
}

impl SqsConsumer {
    pub fn new(aws: &AwsConfig, queue: &QueueConfig) -> Self {
        info!(
            queue_url = %queue.inbound_queue_url,
            region = %aws.region,
            "SQS consumer initialized"
        );
        Self {
            client: build_client(aws),
            queue_url: queue.inbound_queue_url.clone(),
            wait_time_secs: queue.wait_time_secs.min(20) as i32,
            visibility_timeout_secs: queue.visibility_timeout_secs as i32,
        }
    }
}

#[async_trait]
impl QueueConsumer for SqsConsumer {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        let capped = max_messages.clamp(1, SQS_MAX_BATCH) as i32;

        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(capped)
            .wait_time_seconds(self.wait_time_secs)
            .visibility_timeout(self.visibility_timeout_secs)
            .message_system_attribute_names(MessageSystemAttributeName::SentTimestamp)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS receive failed: {e:?}")))?;

        let sqs_messages = resp.messages.unwrap_or_default();
        debug!(count = sqs_messages.len(), "Received SQS messages");

        let mut messages = Vec::with_capacity(sqs_messages.len());
        for msg in sqs_messages {
            let receipt_handle = msg
                .receipt_handle()
                .ok_or_else(|| QueueError::Parse("missing receipt handle".into()))?
                .to_string();

            // SentTimestamp is epoch millis set by SQS on send.
            let sent_at = msg
                .attributes()
                .and_then(|attrs| attrs.get(&MessageSystemAttributeName::SentTimestamp))
                .and_then(|ts| ts.parse::<i64>().ok())
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .unwrap_or_else(Utc::now);

            messages.push(QueueMessage {
                id: msg.message_id().unwrap_or("unknown").to_string(),
                body: msg.body().unwrap_or("").to_string(),
                receipt_handle,
                sent_at,
            });
        }

        Ok(messages)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Ack(format!("SQS delete failed: {e:?}")))?;
        Ok(())
    }

    async fn status(&self) -> Result<QueueStatus, QueueError> {
        let depth = approximate_depth(&self.client, &self.queue_url).await?;
        Ok(QueueStatus {
            reachable: true,
            depth,
        })
    }
}

// ── Publisher ─────────────────────────────────────────────────

/// Publisher to the outbound response queue.
pub struct SqsPublisher {
    client: Client,
    queue_url: String,
}

impl SqsPublisher {
    pub fn new(aws: &AwsConfig, queue: &QueueConfig) -> Self {
        info!(queue_url = %queue.outbound_queue_url, "SQS publisher initialized");
        Self {
            client: build_client(aws),
            queue_url: queue.outbound_queue_url.clone(),
        }
    }
}

#[async_trait]
impl QueuePublisher for SqsPublisher {
    async fn publish(&self, body: &str) -> Result<(), QueueError> {
        let resp = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::Publish(format!("SQS send failed: {e:?}")))?;
        debug!(message_id = resp.message_id().unwrap_or("unknown"), "Published to SQS");
        Ok(())
    }
}
