use async_trait::async_trait;
use cinema_shared::PaymentOutcome;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::broker::MessageHandler;
use crate::repository::ReservationRepository;
use crate::reservation::ReservationStatus;
use crate::{CoreError, CoreResult};

/// What applying one outcome did to the reservation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileResult {
    Applied(ReservationStatus),
    /// Row already carried the status; a duplicate delivery.
    Unchanged(ReservationStatus),
    Missing,
}

/// Moves reservations to their terminal status as payment outcomes arrive.
pub struct StatusReconciler {
    reservations: Arc<dyn ReservationRepository>,
}

impl StatusReconciler {
    pub fn new(reservations: Arc<dyn ReservationRepository>) -> Self {
        Self { reservations }
    }

    /// Overwrite by id, so replays converge on the same final status.
    pub async fn apply(&self, outcome: &PaymentOutcome) -> CoreResult<ReconcileResult> {
        let target = ReservationStatus::from(outcome.status);

        let Some(current) = self.reservations.get_reservation(outcome.reservation_id).await? else {
            warn!(reservation_id = %outcome.reservation_id, "Outcome for unknown reservation, dropping");
            return Ok(ReconcileResult::Missing);
        };

        if current.status == target {
            debug!(reservation_id = %current.id, status = %target, "Duplicate outcome");
            return Ok(ReconcileResult::Unchanged(target));
        }

        match self.reservations.update_status(current.id, target).await {
            Ok(true) => {
                info!(
                    reservation_id = %current.id,
                    from = %current.status,
                    status = %target,
                    "Reservation settled"
                );
                Ok(ReconcileResult::Applied(target))
            }
            Ok(false) => {
                warn!(reservation_id = %current.id, "Reservation vanished before update");
                Ok(ReconcileResult::Missing)
            }
            Err(CoreError::Conflict(msg)) => {
                // Swept as abandoned, then re-claimed by someone else before the charge landed.
                error!(
                    reservation_id = %current.id,
                    user_id = %outcome.user_id,
                    amount = outcome.amount,
                    "Settlement anomaly, seat re-claimed after payment; refund required: {}",
                    msg
                );
                Err(CoreError::Conflict(msg))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl MessageHandler for StatusReconciler {
    async fn handle(&self, payload: &[u8]) -> CoreResult<()> {
        let outcome: PaymentOutcome = match serde_json::from_slice(payload) {
            Ok(o) => o,
            Err(e) => {
                error!("Discarding malformed outcome event: {}", e);
                return Ok(());
            }
        };

        match self.apply(&outcome).await {
            Ok(_) => Ok(()),
            // Store unreachable: leave unacknowledged so it is redelivered after reconnect.
            Err(e @ CoreError::ServiceUnavailable(_)) => Err(e),
            Err(e) => {
                error!(reservation_id = %outcome.reservation_id, "Outcome not applied: {}", e);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::CatalogRepository;
    use crate::catalog::{Movie, Room, Screening};
    use crate::memory::InMemoryStore;
    use crate::reservation::NewReservation;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use cinema_shared::OutcomeStatus;
    use uuid::Uuid;

    async fn pending(store: &InMemoryStore) -> (Uuid, Screening) {
        let movie = Movie {
            id: Uuid::new_v4(),
            title: "M".into(),
            description: None,
            duration: 90,
        };
        let room = Room {
            id: Uuid::new_v4(),
            number: "7".into(),
            rows: 2,
            cols: 2,
        };
        let screening = Screening {
            id: Uuid::new_v4(),
            movie_id: movie.id,
            room_number: "7".into(),
            date: NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
            time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            price: 10.0,
        };
        store.insert_movie(&movie).await.unwrap();
        store.insert_room(&room).await.unwrap();
        store.insert_screening(&screening).await.unwrap();

        let id = claim(store, &screening, "u1").await;
        (id, screening)
    }

    async fn claim(store: &InMemoryStore, screening: &Screening, user: &str) -> Uuid {
        store
            .create_reservation(NewReservation {
                id: Uuid::new_v4(),
                user_id: user.into(),
                movie_id: screening.movie_id,
                room_number: screening.room_number.clone(),
                screening_id: screening.id,
                seat_row: 0,
                seat_column: 0,
                screening_datetime: screening.starts_at(),
                expires_at: None,
            })
            .await
            .unwrap()
            .id
    }

    fn outcome(id: Uuid, status: OutcomeStatus) -> Vec<u8> {
        serde_json::to_vec(&PaymentOutcome {
            reservation_id: id,
            user_id: "u1".into(),
            status,
            amount: 1000,
            timestamp: Utc::now().timestamp(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_replayed_outcome_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let (id, _) = pending(&store).await;
        let reconciler = StatusReconciler::new(store.clone());

        let payload = outcome(id, OutcomeStatus::Paid);
        reconciler.handle(&payload).await.unwrap();
        reconciler.handle(&payload).await.unwrap();

        let r = store.get_reservation(id).await.unwrap().unwrap();
        assert_eq!(r.status, ReservationStatus::Paid);
    }

    #[tokio::test]
    async fn test_missing_and_malformed_are_dropped() {
        let store = Arc::new(InMemoryStore::new());
        let reconciler = StatusReconciler::new(store.clone());

        let unknown = PaymentOutcome {
            reservation_id: Uuid::new_v4(),
            user_id: "ghost".into(),
            status: OutcomeStatus::Failed,
            amount: 0,
            timestamp: 0,
        };
        assert_eq!(reconciler.apply(&unknown).await.unwrap(), ReconcileResult::Missing);
        assert!(reconciler.handle(b"{not json").await.is_ok());
    }

    #[tokio::test]
    async fn test_late_payment_on_reclaimed_seat_is_an_anomaly() {
        let store = Arc::new(InMemoryStore::new());
        let (first, screening) = pending(&store).await;
        store.update_status(first, ReservationStatus::Failed).await.unwrap();
        claim(&store, &screening, "u2").await;

        let reconciler = StatusReconciler::new(store.clone());
        let late = serde_json::from_slice(&outcome(first, OutcomeStatus::Paid)).unwrap();
        assert!(matches!(reconciler.apply(&late).await, Err(CoreError::Conflict(_))));

        // Acknowledged all the same; the row keeps its swept status.
        assert!(reconciler.handle(&outcome(first, OutcomeStatus::Paid)).await.is_ok());
        let r = store.get_reservation(first).await.unwrap().unwrap();
        assert_eq!(r.status, ReservationStatus::Failed);
    }
}
