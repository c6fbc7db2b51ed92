use cinema_core::broker::MessageHandler;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
    #[error("Handler refused message at offset {offset}: {reason}")]
    Handler { offset: i64, reason: String },
}

/// Long-lived consumer that owns its connection lifecycle. The handler only
/// sees payloads; offsets are committed after it returns `Ok`, so delivery is
/// at-least-once.
///
/// A consumer group shared by several instances gives point-to-point work
/// distribution; a distinct group per subscriber gives broadcast.
pub struct SupervisedConsumer {
    brokers: String,
    group_id: String,
    topic: String,
    backoff: Duration,
}

impl SupervisedConsumer {
    pub fn new(brokers: impl Into<String>, group_id: impl Into<String>, topic: impl Into<String>, backoff: Duration) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: group_id.into(),
            topic: topic.into(),
            backoff,
        }
    }

    /// Never returns. Any connection or handler failure tears the session
    /// down; after `backoff` a fresh consumer resumes from the last commit.
    pub async fn run(self, handler: Arc<dyn MessageHandler>) {
        info!(topic = %self.topic, group = %self.group_id, "Consumer started");
        loop {
            match self.session(handler.as_ref()).await {
                Ok(()) => warn!(topic = %self.topic, "Consumer session ended"),
                Err(e) => error!(topic = %self.topic, group = %self.group_id, "Consumer session failed: {}", e),
            }
            info!(
                topic = %self.topic,
                "Reconnecting in {}s",
                self.backoff.as_secs()
            );
            sleep(self.backoff).await;
        }
    }

    fn connect(&self) -> Result<StreamConsumer, ConsumerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()?;
        consumer.subscribe(&[self.topic.as_str()])?;
        Ok(consumer)
    }

    async fn session(&self, handler: &dyn MessageHandler) -> Result<(), ConsumerError> {
        let consumer = self.connect()?;
        debug!(topic = %self.topic, "Subscribed");

        // One message in flight.
        loop {
            let message = consumer.recv().await?;
            let offset = message.offset();

            match message.payload() {
                Some(payload) => {
                    if let Err(e) = handler.handle(payload).await {
                        return Err(ConsumerError::Handler {
                            offset,
                            reason: e.to_string(),
                        });
                    }
                }
                None => warn!(topic = %self.topic, offset, "Skipping message without payload"),
            }

            consumer.commit_message(&message, CommitMode::Sync)?;
            debug!(topic = %self.topic, offset, "Committed");
        }
    }
}
