use async_trait::async_trait;
use cinema_core::broker::{MessageHandler, PaymentOutcomePublisher};
use cinema_core::CoreResult;
use cinema_shared::{OutcomeStatus, PaymentOutcome, PaymentRequest};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::processor::PaymentProcessor;

/// Lifecycle of one payment request inside the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Received,
    Charging,
    Charged,
    ChargeFailed,
    OutcomePublished,
    Acked,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptState::Received => "received",
            AttemptState::Charging => "charging",
            AttemptState::Charged => "charged",
            AttemptState::ChargeFailed => "charge_failed",
            AttemptState::OutcomePublished => "outcome_published",
            AttemptState::Acked => "acked",
        };
        f.write_str(s)
    }
}

fn transition(reservation_id: Uuid, state: AttemptState) {
    debug!(reservation_id = %reservation_id, state = %state, "Payment attempt");
}

pub const DEFAULT_LEDGER_CAPACITY: usize = 10_000;
pub const DEFAULT_LEDGER_TTL: Duration = Duration::from_secs(3600);

/// Outcomes decided but not yet published. Bounded both ways: entries older
/// than `ttl` are dropped, and the oldest entry goes once `capacity` is hit.
/// A request whose redelivery went to another worker never gets `forget`.
struct SettledLedger {
    entries: HashMap<Uuid, (PaymentOutcome, Instant)>,
    /// Insertion order; may hold ids that were already forgotten.
    order: VecDeque<Uuid>,
    capacity: usize,
    ttl: Duration,
}

impl SettledLedger {
    fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    fn get(&mut self, id: Uuid) -> Option<PaymentOutcome> {
        self.prune(Instant::now());
        self.entries.get(&id).map(|(outcome, _)| outcome.clone())
    }

    fn record(&mut self, outcome: PaymentOutcome) {
        self.prune(Instant::now());
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else { break };
            if self.entries.remove(&oldest).is_some() {
                warn!(reservation_id = %oldest, "Payment ledger full, dropping unpublished outcome");
            }
        }
        if self.order.len() > self.capacity * 2 {
            let entries = &self.entries;
            self.order.retain(|id| entries.contains_key(id));
        }
        self.order.push_back(outcome.reservation_id);
        self.entries.insert(outcome.reservation_id, (outcome, Instant::now()));
    }

    fn forget(&mut self, id: Uuid) {
        self.entries.remove(&id);
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.order.front().copied() {
            match self.entries.get(&front) {
                None => {
                    self.order.pop_front();
                }
                Some((_, at)) if now.duration_since(*at) >= self.ttl => {
                    debug!(reservation_id = %front, "Expiring unpublished outcome");
                    self.entries.remove(&front);
                    self.order.pop_front();
                }
                Some(_) => break,
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Turns each payment request into exactly one terminal outcome.
///
/// The processor is called at most once per reservation per worker: a
/// redelivered request whose outcome was not yet acknowledged re-publishes
/// the recorded outcome instead of charging again.
pub struct PaymentWorker {
    processor: Arc<dyn PaymentProcessor>,
    outcomes: Arc<dyn PaymentOutcomePublisher>,
    settled: Mutex<SettledLedger>,
}

impl PaymentWorker {
    pub fn new(processor: Arc<dyn PaymentProcessor>, outcomes: Arc<dyn PaymentOutcomePublisher>) -> Self {
        Self::with_ledger_limits(processor, outcomes, DEFAULT_LEDGER_CAPACITY, DEFAULT_LEDGER_TTL)
    }

    pub fn with_ledger_limits(
        processor: Arc<dyn PaymentProcessor>,
        outcomes: Arc<dyn PaymentOutcomePublisher>,
        capacity: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            processor,
            outcomes,
            settled: Mutex::new(SettledLedger::new(capacity, ttl)),
        }
    }

    /// Outcomes held for redelivery on this instance.
    pub async fn unpublished(&self) -> usize {
        self.settled.lock().await.len()
    }

    /// `Ok` once the outcome is on the broadcast channel and the request may
    /// be acknowledged.
    pub async fn process(&self, request: &PaymentRequest) -> CoreResult<PaymentOutcome> {
        let id = request.reservation_id;
        transition(id, AttemptState::Received);

        let recorded = self.settled.lock().await.get(id);
        let outcome = match recorded {
            Some(outcome) => {
                info!(reservation_id = %id, status = %outcome.status, "Redelivered request, reusing recorded outcome");
                outcome
            }
            None => {
                transition(id, AttemptState::Charging);
                let description = format!("Cinema reservation {}", id);
                let status = match self.processor.charge(request.amount, &request.currency, &description).await {
                    Ok(charge) => {
                        transition(id, AttemptState::Charged);
                        info!(reservation_id = %id, charge_id = %charge.id, amount = request.amount, "Charge approved");
                        OutcomeStatus::Paid
                    }
                    Err(e) => {
                        // Terminal. The customer can start a new reservation.
                        transition(id, AttemptState::ChargeFailed);
                        warn!(reservation_id = %id, "Charge failed: {}", e);
                        OutcomeStatus::Failed
                    }
                };
                let outcome = PaymentOutcome::for_request(request, status);
                self.settled.lock().await.record(outcome.clone());
                outcome
            }
        };

        self.outcomes.publish_outcome(&outcome).await?;
        transition(id, AttemptState::OutcomePublished);

        // Acked from here on; the broker will not redeliver it.
        self.settled.lock().await.forget(id);
        Ok(outcome)
    }
}

#[async_trait]
impl MessageHandler for PaymentWorker {
    async fn handle(&self, payload: &[u8]) -> CoreResult<()> {
        let request: PaymentRequest = match serde_json::from_slice(payload) {
            Ok(r) => r,
            Err(e) => {
                error!("Discarding malformed payment request: {}", e);
                return Ok(());
            }
        };

        match self.process(&request).await {
            Ok(outcome) => {
                transition(request.reservation_id, AttemptState::Acked);
                info!(reservation_id = %request.reservation_id, status = %outcome.status, "Payment request settled");
                Ok(())
            }
            Err(e) => {
                error!(reservation_id = %request.reservation_id, "Outcome not published, request stays unacknowledged: {}", e);
                Err(e)
            }
        }
    }
}
