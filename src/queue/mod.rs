//! Non-consuming message-queue readers.
//!
//! A peek never takes a message away from other consumers: SQS is read
//! with a zero visibility timeout, Kafka with a dedicated peek consumer
//! group that never commits offsets. Both convert native messages into
//! the shared [`QueueMessage`] shape the queue loader flattens into rows.

mod kafka;
mod sqs;

pub use kafka::KafkaPeekReader;
pub use sqs::SqsPeekReader;

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::detect::QueueKind;
use crate::error::DataqlError;

/// A message as seen by a peek, queue-agnostic.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: String,
    pub body: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: BTreeMap<String, String>,
    /// Queue or topic the message came from.
    pub source: String,
    pub receive_count: i64,
}

/// Bounded, non-consuming reads from a queue.
pub trait QueueReader {
    /// Fetch up to `max` messages without consuming them.
    fn peek(&mut self, max: usize) -> Result<Vec<QueueMessage>>;

    fn close(&mut self) {}
}

/// Open the reader matching the URL's scheme.
pub fn open_reader(kind: QueueKind, url: &str) -> Result<Box<dyn QueueReader>> {
    match kind {
        QueueKind::Sqs => Ok(Box::new(SqsPeekReader::connect(url)?)),
        QueueKind::Kafka => Ok(Box::new(KafkaPeekReader::connect(url)?)),
        other => Err(DataqlError::Resolution(format!(
            "message queue scheme {}:// is recognized but not supported; use sqs:// or kafka://",
            other.scheme()
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_schemes_are_rejected_by_name() {
        for kind in [
            QueueKind::Rabbitmq,
            QueueKind::Amqp,
            QueueKind::Pulsar,
            QueueKind::Pubsub,
        ] {
            let err = open_reader(kind, "rabbitmq://host/q").unwrap_err();
            assert!(err.to_string().contains(kind.scheme()), "{err}");
        }
    }
}
