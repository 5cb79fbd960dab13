//! Kafka peek reader.
//!
//! A dedicated consumer group (`<group>-dataql-peek`, or a synthesized
//! unique group when none was given) reads from the earliest offset with
//! auto-commit disabled; offsets are never committed, so the peek leaves
//! every consumer group's position untouched.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::DateTime;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::{ClientConfig, Message};

use super::{QueueMessage, QueueReader};
use crate::error::DataqlError;

/// How long a peek keeps polling for messages before giving up.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct KafkaPeekReader {
    consumer: BaseConsumer,
    topic: String,
}

impl KafkaPeekReader {
    /// Connect from `kafka://broker[,broker...]/topic[?group=name]`.
    pub fn connect(url: &str) -> Result<Self> {
        let (brokers, topic, group) = parse_url(url)?;

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &brokers)
            .set("group.id", &group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000");
        apply_sasl_env(&mut config);

        let consumer: BaseConsumer = config.create().map_err(|e| {
            DataqlError::Connect(format!("kafka consumer for {brokers} failed: {e}"))
        })?;
        consumer.subscribe(&[&topic]).map_err(|e| {
            DataqlError::Connect(format!("kafka subscribe to {topic} failed: {e}"))
        })?;

        Ok(Self { consumer, topic })
    }
}

/// `(brokers, topic, peek group id)`.
fn parse_url(url: &str) -> Result<(String, String, String)> {
    let rest = url.trim_start_matches("kafka://");
    let (location, query) = match rest.split_once('?') {
        Some((l, q)) => (l, Some(q)),
        None => (rest, None),
    };
    let (brokers, topic) = location.split_once('/').ok_or_else(|| {
        DataqlError::Resolution(format!(
            "malformed Kafka URL {url}: expected kafka://brokers/topic"
        ))
    })?;
    if brokers.is_empty() || topic.is_empty() {
        return Err(DataqlError::Resolution(format!(
            "malformed Kafka URL {url}: expected kafka://brokers/topic"
        ))
        .into());
    }

    let user_group = query.and_then(|q| {
        q.split('&').find_map(|pair| {
            pair.split_once('=')
                .filter(|(k, _)| *k == "group")
                .map(|(_, v)| v.to_string())
        })
    });
    let group = match user_group {
        Some(g) if !g.is_empty() => format!("{g}-dataql-peek"),
        _ => format!("dataql-peek-{}", std::process::id()),
    };

    Ok((brokers.to_string(), topic.to_string(), group))
}

/// Forward `KAFKA_*` SASL settings into the librdkafka config.
fn apply_sasl_env(config: &mut ClientConfig) {
    let mapping = [
        ("KAFKA_SECURITY_PROTOCOL", "security.protocol"),
        ("KAFKA_SASL_MECHANISM", "sasl.mechanism"),
        ("KAFKA_SASL_USERNAME", "sasl.username"),
        ("KAFKA_SASL_PASSWORD", "sasl.password"),
    ];
    for (env, key) in mapping {
        if let Ok(value) = std::env::var(env) {
            config.set(key, value);
        }
    }
}

impl QueueReader for KafkaPeekReader {
    fn peek(&mut self, max: usize) -> Result<Vec<QueueMessage>> {
        let mut out = Vec::new();
        let deadline = Instant::now() + WAIT_TIMEOUT;

        while out.len() < max && Instant::now() < deadline {
            let Some(polled) = self.consumer.poll(POLL_INTERVAL) else {
                continue;
            };
            let message = polled.map_err(|e| {
                DataqlError::Connect(format!("kafka read on {} failed: {e}", self.topic))
            })?;

            let body = message
                .payload()
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .unwrap_or_default();

            let mut metadata = BTreeMap::new();
            metadata.insert("partition".to_string(), message.partition().to_string());
            metadata.insert("offset".to_string(), message.offset().to_string());
            if let Some(key) = message.key() {
                metadata.insert(
                    "key".to_string(),
                    String::from_utf8_lossy(key).into_owned(),
                );
            }

            out.push(QueueMessage {
                id: format!("{}-{}", message.partition(), message.offset()),
                body,
                timestamp: message
                    .timestamp()
                    .to_millis()
                    .and_then(DateTime::from_timestamp_millis),
                metadata,
                source: self.topic.clone(),
                receive_count: 0,
            });
        }

        Ok(out)
    }

    fn close(&mut self) {
        // No commit on shutdown: the peek group must leave no trace.
        self.consumer.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_with_group() {
        let (brokers, topic, group) =
            parse_url("kafka://localhost:9092/events?group=analytics").unwrap();
        assert_eq!(brokers, "localhost:9092");
        assert_eq!(topic, "events");
        assert_eq!(group, "analytics-dataql-peek");
    }

    #[test]
    fn test_parse_url_synthesizes_group() {
        let (_, _, group) = parse_url("kafka://broker1:9092,broker2:9092/t").unwrap();
        assert!(group.starts_with("dataql-peek-"), "{group}");
    }

    #[test]
    fn test_parse_url_rejects_missing_topic() {
        assert!(parse_url("kafka://localhost:9092").is_err());
        assert!(parse_url("kafka:///topic").is_err());
    }
}
