use cinema_core::booking::BookingService;
use cinema_core::broker::MessageHandler;
use cinema_store::SupervisedConsumer;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// One outcome subscriber: its own consumer group, so it sees every event.
pub fn spawn_outcome_subscriber(
    brokers: &str,
    group_id: &str,
    topic: &str,
    backoff: Duration,
    handler: Arc<dyn MessageHandler>,
) -> JoinHandle<()> {
    let consumer = SupervisedConsumer::new(brokers, group_id, topic, backoff);
    info!(group = %group_id, topic = %topic, "Spawning outcome subscriber");
    tokio::spawn(consumer.run(handler))
}

/// Periodically fails `pending` reservations whose payment never settled.
pub fn spawn_abandonment_sweep(booking: Arc<BookingService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Abandonment sweep started, every {}s", every.as_secs());
        loop {
            ticker.tick().await;
            match booking.reclaim_abandoned().await {
                Ok(ids) => {
                    for id in ids {
                        info!(reservation_id = %id, "Released abandoned seat");
                    }
                }
                Err(e) => error!("Abandonment sweep failed: {}", e),
            }
        }
    })
}
