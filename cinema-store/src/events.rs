use async_trait::async_trait;
use cinema_core::broker::{PaymentOutcomePublisher, PaymentRequestPublisher};
use cinema_core::{CoreError, CoreResult};
use cinema_shared::{PaymentOutcome, PaymentRequest};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

/// Kafka producer for both saga channels. Messages are keyed by reservation
/// id so every event of one reservation lands on the same partition.
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
    requests_topic: String,
    outcomes_topic: String,
}

impl EventProducer {
    pub fn new(brokers: &str, requests_topic: &str, outcomes_topic: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            // Durable acceptance before we report success.
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()?;

        Ok(Self {
            producer,
            requests_topic: requests_topic.to_string(),
            outcomes_topic: outcomes_topic.to_string(),
        })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }

    async fn publish_json<T: serde::Serialize>(&self, topic: &str, key: &str, message: &T) -> CoreResult<()> {
        let payload = serde_json::to_string(message).map_err(|e| CoreError::StoreError(e.to_string()))?;
        self.publish(topic, key, &payload)
            .await
            .map_err(|e| CoreError::ServiceUnavailable(format!("Broker rejected message: {}", e)))
    }
}

#[async_trait]
impl PaymentRequestPublisher for EventProducer {
    async fn publish_request(&self, request: &PaymentRequest) -> CoreResult<()> {
        let key = request.reservation_id.to_string();
        self.publish_json(&self.requests_topic, &key, request).await
    }
}

#[async_trait]
impl PaymentOutcomePublisher for EventProducer {
    async fn publish_outcome(&self, outcome: &PaymentOutcome) -> CoreResult<()> {
        let key = outcome.reservation_id.to_string();
        self.publish_json(&self.outcomes_topic, &key, outcome).await
    }
}
