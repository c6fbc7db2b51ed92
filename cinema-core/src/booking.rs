use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use cinema_shared::PaymentRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::broker::PaymentRequestPublisher;
use crate::catalog::CatalogService;
use crate::identity::{authorize, Claims, BOOKING_ROLES};
use crate::repository::ReservationRepository;
use crate::reservation::{NewReservation, ReservationStatus, SeatMap};
use crate::{CoreError, CoreResult};

pub const UNKNOWN_MOVIE_TITLE: &str = "Unknown Movie";

#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub currency: String,
    /// How long a reservation may stay `pending` before the sweep reclaims it.
    pub pending_ttl: Duration,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
            pending_ttl: Duration::seconds(900),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReserveSeat {
    pub screening_id: Uuid,
    pub seat_row: i32,
    pub seat_col: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReservationReceipt {
    pub reservation_id: Uuid,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SeatRef {
    pub row: i32,
    pub col: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub user_id: String,
    pub movie_id: Uuid,
    pub movie_title: String,
    pub room_number: String,
    pub screening_id: Uuid,
    pub seat: SeatRef,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub screening_datetime: NaiveDateTime,
}

/// Stateless seat-contention front door. Exclusivity comes from the
/// reservation store's constrained insert, never from this type.
pub struct BookingService {
    catalog: Arc<CatalogService>,
    reservations: Arc<dyn ReservationRepository>,
    publisher: Arc<dyn PaymentRequestPublisher>,
    config: BookingConfig,
}

impl BookingService {
    pub fn new(
        catalog: Arc<CatalogService>,
        reservations: Arc<dyn ReservationRepository>,
        publisher: Arc<dyn PaymentRequestPublisher>,
        config: BookingConfig,
    ) -> Self {
        Self {
            catalog,
            reservations,
            publisher,
            config,
        }
    }

    pub fn catalog(&self) -> &Arc<CatalogService> {
        &self.catalog
    }

    pub async fn reserve(&self, claims: &Claims, input: ReserveSeat) -> CoreResult<ReservationReceipt> {
        // 1. Role check
        authorize(claims, BOOKING_ROLES)?;

        // 2. Resolve screening (read-repair on cache miss)
        let screening = self
            .catalog
            .screening(input.screening_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Screening {} not found", input.screening_id)))?;

        // 3. Expiry
        let now_local = chrono::Local::now().naive_local();
        if screening.is_expired(now_local) {
            self.catalog.evict_screening(&screening).await;
            return Err(CoreError::Expired("Screening has expired".to_string()));
        }

        // 4. Grid bounds
        let room = self
            .catalog
            .room(&screening.room_number)
            .await?
            .ok_or_else(|| CoreError::ValidationError(format!("Room {} does not exist", screening.room_number)))?;
        if !room.contains(input.seat_row, input.seat_col) {
            return Err(CoreError::ValidationError(format!(
                "Seat ({}, {}) is outside room {} ({}x{})",
                input.seat_row, input.seat_col, room.number, room.rows, room.cols
            )));
        }

        // 5. Advisory pre-check. The insert below is the real arbiter.
        if self
            .reservations
            .find_for_seat(screening.id, input.seat_row, input.seat_col, &ReservationStatus::ACTIVE)
            .await?
            .is_some()
        {
            return Err(CoreError::Conflict("Seat already reserved".to_string()));
        }

        // 6. Constrained insert
        let created_at = Utc::now();
        let reservation = self
            .reservations
            .create_reservation(NewReservation {
                id: Uuid::new_v4(),
                user_id: claims.subject.clone(),
                movie_id: screening.movie_id,
                room_number: screening.room_number.clone(),
                screening_id: screening.id,
                seat_row: input.seat_row,
                seat_column: input.seat_col,
                screening_datetime: screening.starts_at(),
                expires_at: Some(created_at + self.config.pending_ttl),
            })
            .await?;

        info!(
            reservation_id = %reservation.id,
            screening_id = %screening.id,
            seat_row = input.seat_row,
            seat_col = input.seat_col,
            "Seat claimed"
        );

        // 7. Payment request; a failed publish releases the seat synchronously
        let request = PaymentRequest {
            reservation_id: reservation.id,
            user_id: reservation.user_id.clone(),
            amount: screening.amount_minor_units(),
            currency: self.config.currency.clone(),
        };
        if let Err(e) = self.publisher.publish_request(&request).await {
            warn!(reservation_id = %reservation.id, "Payment request not published: {}", e);
            if let Err(update_err) = self
                .reservations
                .update_status(reservation.id, ReservationStatus::Failed)
                .await
            {
                error!(reservation_id = %reservation.id, "Could not release seat after publish failure: {}", update_err);
            }
            return Err(CoreError::ServiceUnavailable(
                "Payment service unavailable, please retry".to_string(),
            ));
        }

        Ok(ReservationReceipt {
            reservation_id: reservation.id,
            status: "initiated",
        })
    }

    pub async fn seat_map(&self, screening_id: Uuid) -> CoreResult<SeatMap> {
        let screening = self
            .catalog
            .screening(screening_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Screening {} not found", screening_id)))?;
        let room = self
            .catalog
            .room(&screening.room_number)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Room {} not found", screening.room_number)))?;

        let taken = self
            .reservations
            .list_for_screening(screening_id, &ReservationStatus::ACTIVE)
            .await?;
        Ok(SeatMap::build(&room, screening, &taken))
    }

    pub async fn history(&self, claims: &Claims) -> CoreResult<Vec<HistoryEntry>> {
        authorize(claims, BOOKING_ROLES)?;

        let reservations = self.reservations.list_for_user(&claims.subject).await?;
        let mut titles: HashMap<Uuid, String> = HashMap::new();
        let mut entries = Vec::with_capacity(reservations.len());

        for r in reservations {
            if !titles.contains_key(&r.movie_id) {
                // A catalog hiccup only costs the title.
                let title = match self.catalog.movie(r.movie_id).await {
                    Ok(Some(movie)) => movie.title,
                    _ => UNKNOWN_MOVIE_TITLE.to_string(),
                };
                titles.insert(r.movie_id, title);
            }
            let movie_title = titles
                .get(&r.movie_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_MOVIE_TITLE.to_string());

            entries.push(HistoryEntry {
                id: r.id,
                user_id: r.user_id,
                movie_id: r.movie_id,
                movie_title,
                room_number: r.room_number,
                screening_id: r.screening_id,
                seat: SeatRef {
                    row: r.seat_row,
                    col: r.seat_column,
                },
                status: r.status,
                created_at: r.created_at,
                screening_datetime: r.screening_datetime,
            });
        }
        Ok(entries)
    }

    /// Releases seats held by `pending` reservations past their expiry.
    pub async fn reclaim_abandoned(&self) -> CoreResult<Vec<Uuid>> {
        let reclaimed = self.reservations.fail_expired_pending(Utc::now()).await?;
        if !reclaimed.is_empty() {
            info!(count = reclaimed.len(), "Reclaimed abandoned reservations");
        }
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{NewMovie, NewRoom, NewScreening, Screening};
    use crate::memory::{InMemoryBroker, InMemoryCatalogCache, InMemoryStore};

    struct Fixture {
        booking: Arc<BookingService>,
        store: Arc<InMemoryStore>,
        broker: Arc<InMemoryBroker>,
        screening: Screening,
    }

    async fn fixture(config: BookingConfig) -> Fixture {
        let cache = Arc::new(InMemoryCatalogCache::new());
        let store = Arc::new(InMemoryStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let catalog = Arc::new(CatalogService::new(cache, store.clone(), 15.0));

        let admin = Claims::new("admin", ["admin"]);
        let movie = catalog
            .create_movie(
                &admin,
                NewMovie {
                    title: Some("Stalker".into()),
                    description: Some("Zone".into()),
                    duration: Some(161),
                },
            )
            .await
            .unwrap();
        catalog
            .create_room(
                &admin,
                NewRoom {
                    number: "1".into(),
                    rows: 5,
                    cols: 8,
                },
            )
            .await
            .unwrap();
        let screening = catalog
            .add_screening(
                &admin,
                movie.id,
                NewScreening {
                    room_number: "1".into(),
                    date: "2099-06-01".into(),
                    time: "20:00".into(),
                    price: Some(12.5),
                },
            )
            .await
            .unwrap();

        let booking = Arc::new(BookingService::new(catalog, store.clone(), broker.clone(), config));
        Fixture {
            booking,
            store,
            broker,
            screening,
        }
    }

    fn seat(screening: &Screening, row: i32, col: i32) -> ReserveSeat {
        ReserveSeat {
            screening_id: screening.id,
            seat_row: row,
            seat_col: col,
        }
    }

    #[tokio::test]
    async fn test_reserve_publishes_request() {
        let f = fixture(BookingConfig::default()).await;
        let viewer = Claims::new("alice", ["viewer"]);

        let receipt = f.booking.reserve(&viewer, seat(&f.screening, 0, 0)).await.unwrap();
        assert_eq!(receipt.status, "initiated");

        let request = f.broker.next_request().await.unwrap();
        assert_eq!(request.reservation_id, receipt.reservation_id);
        assert_eq!(request.user_id, "alice");
        assert_eq!(request.amount, 1250);
        assert_eq!(request.currency, "usd");

        let stored = f.store.get_reservation(receipt.reservation_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Pending);
        assert!(stored.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let f = fixture(BookingConfig::default()).await;
        let mut handles = Vec::new();
        for i in 0..16 {
            let booking = f.booking.clone();
            let input = seat(&f.screening, 2, 3);
            handles.push(tokio::spawn(async move {
                let claims = Claims::new(format!("user-{}", i % 4), ["viewer"]);
                booking.reserve(&claims, input).await
            }));
        }

        let results = futures_util::future::join_all(handles).await;
        let wins = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Ok(Err(CoreError::Conflict(_)))))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 15);
    }

    #[tokio::test]
    async fn test_failed_seat_is_contestable_again() {
        let f = fixture(BookingConfig::default()).await;
        let alice = Claims::new("alice", ["viewer"]);
        let bob = Claims::new("bob", ["viewer"]);

        let first = f.booking.reserve(&alice, seat(&f.screening, 1, 1)).await.unwrap();
        assert!(matches!(
            f.booking.reserve(&bob, seat(&f.screening, 1, 1)).await,
            Err(CoreError::Conflict(_))
        ));

        f.store
            .update_status(first.reservation_id, ReservationStatus::Failed)
            .await
            .unwrap();
        assert!(f.booking.reserve(&bob, seat(&f.screening, 1, 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_failure_releases_seat() {
        let f = fixture(BookingConfig::default()).await;
        let alice = Claims::new("alice", ["viewer"]);
        f.broker.set_available(false);

        let result = f.booking.reserve(&alice, seat(&f.screening, 1, 1)).await;
        assert!(matches!(result, Err(CoreError::ServiceUnavailable(_))));

        let history = f.booking.history(&alice).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ReservationStatus::Failed);

        f.broker.set_available(true);
        assert!(f.booking.reserve(&alice, seat(&f.screening, 1, 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejections() {
        let f = fixture(BookingConfig::default()).await;
        let viewer = Claims::new("alice", ["viewer"]);

        let outside = f.booking.reserve(&viewer, seat(&f.screening, 5, 0)).await;
        assert!(matches!(outside, Err(CoreError::ValidationError(_))));
        let negative = f.booking.reserve(&viewer, seat(&f.screening, 0, -1)).await;
        assert!(matches!(negative, Err(CoreError::ValidationError(_))));

        let missing = f
            .booking
            .reserve(
                &viewer,
                ReserveSeat {
                    screening_id: Uuid::new_v4(),
                    seat_row: 0,
                    seat_col: 0,
                },
            )
            .await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));

        let guest = Claims::new("guest", ["offline_access"]);
        let forbidden = f.booking.reserve(&guest, seat(&f.screening, 0, 0)).await;
        assert!(matches!(forbidden, Err(CoreError::Forbidden(_))));
        assert!(f.broker.next_request().await.is_none());
    }

    #[tokio::test]
    async fn test_history_and_seat_map() {
        let f = fixture(BookingConfig::default()).await;
        let alice = Claims::new("alice", ["viewer"]);
        f.booking.reserve(&alice, seat(&f.screening, 0, 0)).await.unwrap();
        f.booking.reserve(&alice, seat(&f.screening, 4, 7)).await.unwrap();

        let history = f.booking.history(&alice).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].created_at >= history[1].created_at);
        assert_eq!(history[0].movie_title, "Stalker");
        assert_eq!(history[0].seat, SeatRef { row: 4, col: 7 });

        let map = f.booking.seat_map(f.screening.id).await.unwrap();
        assert_eq!((map.rows, map.cols), (5, 8));
        assert!(map.is_taken(0, 0));
        assert!(map.is_taken(4, 7));
        assert!(!map.is_taken(2, 2));
    }

    #[tokio::test]
    async fn test_abandoned_reservation_is_reclaimed() {
        let f = fixture(BookingConfig {
            pending_ttl: Duration::seconds(-1),
            ..BookingConfig::default()
        })
        .await;
        let alice = Claims::new("alice", ["viewer"]);
        let bob = Claims::new("bob", ["viewer"]);

        let abandoned = f.booking.reserve(&alice, seat(&f.screening, 3, 3)).await.unwrap();
        let reclaimed = f.booking.reclaim_abandoned().await.unwrap();
        assert_eq!(reclaimed, vec![abandoned.reservation_id]);
        assert!(f.booking.reserve(&bob, seat(&f.screening, 3, 3)).await.is_ok());
    }
}
