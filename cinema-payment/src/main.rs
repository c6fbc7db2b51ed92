use anyhow::Context;
use cinema_payment::{PaymentWorker, SimulatedProcessor};
use cinema_store::{EventProducer, SupervisedConsumer};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinema_payment=debug,cinema_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cinema_store::app_config::Config::load().context("Failed to load config")?;
    let kafka = &config.kafka;
    tracing::info!(
        topic = %kafka.payment_requests_topic,
        group = %kafka.payment_worker_group,
        "Starting payment worker"
    );

    let producer = EventProducer::new(&kafka.brokers, &kafka.payment_requests_topic, &kafka.payment_events_topic)
        .context("Failed to create Kafka producer")?;
    let processor = SimulatedProcessor::new(config.payment.decline_over_amount);
    let worker = Arc::new(PaymentWorker::with_ledger_limits(
        Arc::new(processor),
        Arc::new(producer),
        config.payment.ledger_capacity,
        Duration::from_secs(config.payment.ledger_ttl_seconds),
    ));

    // Instances sharing the group split the request queue between them.
    let consumer = SupervisedConsumer::new(
        kafka.brokers.clone(),
        kafka.payment_worker_group.clone(),
        kafka.payment_requests_topic.clone(),
        Duration::from_secs(kafka.reconnect_backoff_seconds),
    );

    tokio::select! {
        _ = consumer.run(worker) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down payment worker"),
    }
    Ok(())
}
