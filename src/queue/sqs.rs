//! SQS peek reader.
//!
//! Messages are received with `VisibilityTimeout=0` so they stay visible
//! to every other consumer. Batches are requested repeatedly until the
//! caller's count is reached or the queue comes up short; a zero
//! visibility timeout means the same message can appear twice inside the
//! pagination, so results are deduplicated by message id.

use std::collections::BTreeMap;

use ahash::AHashSet;
use anyhow::Result;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use chrono::{DateTime, Utc};

use super::{QueueMessage, QueueReader};
use crate::error::DataqlError;
use crate::runtime;

/// SQS caps a single ReceiveMessage at ten messages.
const MAX_BATCH: i32 = 10;

pub struct SqsPeekReader {
    client: aws_sdk_sqs::Client,
    queue_url: String,
    queue_name: String,
    seen: AHashSet<String>,
}

impl SqsPeekReader {
    /// Connect from a `sqs://` URL: either `sqs://<queue-name>` (resolved
    /// through GetQueueUrl) or `sqs://https://...` with a full queue URL.
    pub fn connect(url: &str) -> Result<Self> {
        let target = url.trim_start_matches("sqs://").trim_matches('/').to_string();
        if target.is_empty() {
            return Err(
                DataqlError::Resolution(format!("malformed SQS URL: {url}")).into(),
            );
        }

        runtime::block_on(async {
            let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            let client = aws_sdk_sqs::Client::new(&config);

            let queue_url = if target.starts_with("http://") || target.starts_with("https://") {
                target.clone()
            } else {
                client
                    .get_queue_url()
                    .queue_name(&target)
                    .send()
                    .await
                    .map_err(|e| {
                        DataqlError::Connect(format!("SQS queue {target} unreachable: {e}"))
                    })?
                    .queue_url()
                    .unwrap_or_default()
                    .to_string()
            };

            let queue_name = queue_url
                .rsplit('/')
                .next()
                .unwrap_or(&target)
                .to_string();

            Ok(Self {
                client,
                queue_url,
                queue_name,
                seen: AHashSet::new(),
            })
        })
    }

    fn convert(&self, message: &aws_sdk_sqs::types::Message) -> QueueMessage {
        let mut metadata = BTreeMap::new();
        let mut timestamp: Option<DateTime<Utc>> = None;
        let mut receive_count = 0i64;

        if let Some(attributes) = message.attributes() {
            for (name, value) in attributes {
                match name {
                    MessageSystemAttributeName::SentTimestamp => {
                        timestamp = value
                            .parse::<i64>()
                            .ok()
                            .and_then(DateTime::from_timestamp_millis);
                    }
                    MessageSystemAttributeName::ApproximateReceiveCount => {
                        receive_count = value.parse().unwrap_or(0);
                    }
                    other => {
                        metadata.insert(other.as_str().to_string(), value.clone());
                    }
                }
            }
        }
        if let Some(message_attributes) = message.message_attributes() {
            for (name, value) in message_attributes {
                if let Some(text) = value.string_value() {
                    metadata.insert(name.clone(), text.to_string());
                }
            }
        }

        QueueMessage {
            id: message.message_id().unwrap_or_default().to_string(),
            body: message.body().unwrap_or_default().to_string(),
            timestamp,
            metadata,
            source: self.queue_name.clone(),
            receive_count,
        }
    }
}

impl QueueReader for SqsPeekReader {
    fn peek(&mut self, max: usize) -> Result<Vec<QueueMessage>> {
        let mut out: Vec<QueueMessage> = Vec::new();

        while out.len() < max {
            let want = ((max - out.len()) as i32).min(MAX_BATCH);
            let response = runtime::block_on(
                self.client
                    .receive_message()
                    .queue_url(&self.queue_url)
                    .max_number_of_messages(want)
                    .visibility_timeout(0)
                    .wait_time_seconds(1)
                    .message_system_attribute_names(MessageSystemAttributeName::All)
                    .message_attribute_names("All")
                    .send(),
            )
            .map_err(|e| {
                DataqlError::Connect(format!("SQS receive on {} failed: {e}", self.queue_url))
            })?;

            let messages = response.messages();
            let received = messages.len();
            for message in messages {
                let converted = self.convert(message);
                if !converted.id.is_empty() && !self.seen.insert(converted.id.clone()) {
                    continue;
                }
                out.push(converted);
                if out.len() >= max {
                    break;
                }
            }

            // The queue came up short: no point paginating further.
            if received < want as usize {
                break;
            }
        }

        Ok(out)
    }
}
