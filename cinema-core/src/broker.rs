use async_trait::async_trait;
use cinema_shared::{PaymentOutcome, PaymentRequest};

use crate::CoreResult;

/// Producer side of the point-to-point request channel.
#[async_trait]
pub trait PaymentRequestPublisher: Send + Sync {
    /// Returns only once the broker has durably accepted the message.
    /// Any failure is `CoreError::ServiceUnavailable`.
    async fn publish_request(&self, request: &PaymentRequest) -> CoreResult<()>;
}

/// Producer side of the outcome broadcast.
#[async_trait]
pub trait PaymentOutcomePublisher: Send + Sync {
    async fn publish_outcome(&self, outcome: &PaymentOutcome) -> CoreResult<()>;
}

/// Callback handed to a supervised consumer loop.
///
/// `Ok` acknowledges the message. `Err` leaves it unacknowledged: the loop
/// backs off, reconnects and the broker redelivers it.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> CoreResult<()>;
}
