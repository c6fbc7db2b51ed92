//! In-process implementations of the storage, cache and broker ports.
//! Used by the test suites and by local runs without infrastructure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinema_shared::{PaymentOutcome, PaymentRequest};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::broker::{PaymentOutcomePublisher, PaymentRequestPublisher};
use crate::catalog::{Movie, Room, Screening};
use crate::repository::{CatalogCache, CatalogRepository, ReservationRepository};
use crate::reservation::{NewReservation, Reservation, ReservationStatus};
use crate::{CoreError, CoreResult};

// ============================================================================
// Durable store
// ============================================================================

#[derive(Default)]
struct Tables {
    movies: HashMap<Uuid, Movie>,
    rooms: HashMap<String, Room>,
    screenings: HashMap<Uuid, Screening>,
    /// Insertion order.
    reservations: Vec<Reservation>,
}

impl Tables {
    fn seat_taken(&self, screening_id: Uuid, row: i32, col: i32, except: Option<Uuid>) -> bool {
        self.reservations.iter().any(|r| {
            Some(r.id) != except && r.screening_id == screening_id && r.holds_seat(row, col)
        })
    }

    fn referenced_by_reservation(&self, screening_id: Uuid) -> bool {
        self.reservations.iter().any(|r| r.screening_id == screening_id)
    }
}

/// Single-lock store that honours the same constraints as the relational
/// schema: partial seat uniqueness and screening/room references.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationRepository for InMemoryStore {
    async fn create_reservation(&self, reservation: NewReservation) -> CoreResult<Reservation> {
        let mut t = self.tables.lock().await;
        if !t.screenings.contains_key(&reservation.screening_id) {
            return Err(CoreError::ValidationError(format!(
                "Unknown screening {}",
                reservation.screening_id
            )));
        }
        if t.seat_taken(reservation.screening_id, reservation.seat_row, reservation.seat_column, None) {
            return Err(CoreError::Conflict("Seat already reserved".to_string()));
        }
        let row = reservation.into_pending(Utc::now());
        t.reservations.push(row.clone());
        Ok(row)
    }

    async fn get_reservation(&self, id: Uuid) -> CoreResult<Option<Reservation>> {
        let t = self.tables.lock().await;
        Ok(t.reservations.iter().find(|r| r.id == id).cloned())
    }

    async fn find_for_seat(
        &self,
        screening_id: Uuid,
        seat_row: i32,
        seat_column: i32,
        statuses: &[ReservationStatus],
    ) -> CoreResult<Option<Reservation>> {
        let t = self.tables.lock().await;
        Ok(t
            .reservations
            .iter()
            .find(|r| {
                r.screening_id == screening_id
                    && r.seat_row == seat_row
                    && r.seat_column == seat_column
                    && statuses.contains(&r.status)
            })
            .cloned())
    }

    async fn list_for_screening(
        &self,
        screening_id: Uuid,
        statuses: &[ReservationStatus],
    ) -> CoreResult<Vec<Reservation>> {
        let t = self.tables.lock().await;
        Ok(t
            .reservations
            .iter()
            .filter(|r| r.screening_id == screening_id && statuses.contains(&r.status))
            .cloned()
            .collect())
    }

    async fn list_for_user(&self, user_id: &str) -> CoreResult<Vec<Reservation>> {
        let t = self.tables.lock().await;
        // Reverse insertion order first so equal timestamps still come out newest first.
        let mut rows: Vec<Reservation> = t
            .reservations
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn update_status(&self, id: Uuid, status: ReservationStatus) -> CoreResult<bool> {
        let mut t = self.tables.lock().await;
        let Some(idx) = t.reservations.iter().position(|r| r.id == id) else {
            return Ok(false);
        };
        let (screening_id, row, col) = {
            let r = &t.reservations[idx];
            (r.screening_id, r.seat_row, r.seat_column)
        };
        if status.is_active() && t.seat_taken(screening_id, row, col, Some(id)) {
            return Err(CoreError::Conflict("Seat already reserved".to_string()));
        }
        t.reservations[idx].status = status;
        Ok(true)
    }

    async fn fail_expired_pending(&self, now: DateTime<Utc>) -> CoreResult<Vec<Uuid>> {
        let mut t = self.tables.lock().await;
        let mut reclaimed = Vec::new();
        for r in t.reservations.iter_mut() {
            let expired = r.expires_at.map(|at| at <= now).unwrap_or(false);
            if r.status == ReservationStatus::Pending && expired {
                r.status = ReservationStatus::Failed;
                reclaimed.push(r.id);
            }
        }
        Ok(reclaimed)
    }
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn insert_movie(&self, movie: &Movie) -> CoreResult<()> {
        let mut t = self.tables.lock().await;
        t.movies.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn get_movie(&self, id: Uuid) -> CoreResult<Option<Movie>> {
        Ok(self.tables.lock().await.movies.get(&id).cloned())
    }

    async fn update_movie(&self, movie: &Movie) -> CoreResult<bool> {
        let mut t = self.tables.lock().await;
        match t.movies.get_mut(&movie.id) {
            Some(row) => {
                *row = movie.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_movie(&self, id: Uuid) -> CoreResult<Option<Vec<Uuid>>> {
        let mut t = self.tables.lock().await;
        if !t.movies.contains_key(&id) {
            return Ok(None);
        }
        if t.reservations.iter().any(|r| r.movie_id == id) {
            return Err(CoreError::Conflict(format!("Movie {} has reservations", id)));
        }
        let doomed: Vec<Uuid> = t
            .screenings
            .values()
            .filter(|s| s.movie_id == id)
            .map(|s| s.id)
            .collect();
        for screening_id in &doomed {
            t.screenings.remove(screening_id);
        }
        t.movies.remove(&id);
        Ok(Some(doomed))
    }

    async fn insert_room(&self, room: &Room) -> CoreResult<()> {
        let mut t = self.tables.lock().await;
        if t.rooms.contains_key(&room.number) {
            return Err(CoreError::Conflict(format!("Room {} already exists", room.number)));
        }
        t.rooms.insert(room.number.clone(), room.clone());
        Ok(())
    }

    async fn get_room(&self, number: &str) -> CoreResult<Option<Room>> {
        Ok(self.tables.lock().await.rooms.get(number).cloned())
    }

    async fn delete_room(&self, number: &str) -> CoreResult<Option<Vec<Uuid>>> {
        let mut t = self.tables.lock().await;
        if !t.rooms.contains_key(number) {
            return Ok(None);
        }
        let doomed: Vec<Uuid> = t
            .screenings
            .values()
            .filter(|s| s.room_number == number)
            .map(|s| s.id)
            .collect();
        if doomed.iter().any(|id| t.referenced_by_reservation(*id)) {
            return Err(CoreError::Conflict(format!(
                "Room {} has screenings with reservations",
                number
            )));
        }
        for id in &doomed {
            t.screenings.remove(id);
        }
        t.rooms.remove(number);
        Ok(Some(doomed))
    }

    async fn insert_screening(&self, screening: &Screening) -> CoreResult<()> {
        let mut t = self.tables.lock().await;
        if !t.movies.contains_key(&screening.movie_id) || !t.rooms.contains_key(&screening.room_number) {
            return Err(CoreError::ValidationError("Screening references unknown movie or room".into()));
        }
        t.screenings.insert(screening.id, screening.clone());
        Ok(())
    }

    async fn get_screening(&self, id: Uuid) -> CoreResult<Option<Screening>> {
        Ok(self.tables.lock().await.screenings.get(&id).cloned())
    }

    async fn delete_screening(&self, id: Uuid) -> CoreResult<bool> {
        let mut t = self.tables.lock().await;
        if t.referenced_by_reservation(id) {
            return Err(CoreError::Conflict(format!("Screening {} has reservations", id)));
        }
        Ok(t.screenings.remove(&id).is_some())
    }
}

// ============================================================================
// Catalog cache
// ============================================================================

#[derive(Default)]
struct CacheEntries {
    movies: BTreeMap<Uuid, Movie>,
    rooms: BTreeMap<String, Room>,
    screenings: HashMap<Uuid, Screening>,
}

#[derive(Default)]
pub struct InMemoryCatalogCache {
    entries: Mutex<CacheEntries>,
}

impl InMemoryCatalogCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogCache for InMemoryCatalogCache {
    async fn put_movie(&self, movie: &Movie) -> CoreResult<()> {
        self.entries.lock().await.movies.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn get_movie(&self, id: Uuid) -> CoreResult<Option<Movie>> {
        Ok(self.entries.lock().await.movies.get(&id).cloned())
    }

    async fn list_movies(&self) -> CoreResult<Vec<Movie>> {
        Ok(self.entries.lock().await.movies.values().cloned().collect())
    }

    async fn delete_movie(&self, id: Uuid) -> CoreResult<()> {
        let mut e = self.entries.lock().await;
        e.movies.remove(&id);
        e.screenings.retain(|_, s| s.movie_id != id);
        Ok(())
    }

    async fn put_room(&self, room: &Room) -> CoreResult<()> {
        self.entries.lock().await.rooms.insert(room.number.clone(), room.clone());
        Ok(())
    }

    async fn get_room(&self, number: &str) -> CoreResult<Option<Room>> {
        Ok(self.entries.lock().await.rooms.get(number).cloned())
    }

    async fn list_rooms(&self) -> CoreResult<Vec<Room>> {
        Ok(self.entries.lock().await.rooms.values().cloned().collect())
    }

    async fn delete_room(&self, number: &str) -> CoreResult<()> {
        let mut e = self.entries.lock().await;
        e.rooms.remove(number);
        e.screenings.retain(|_, s| s.room_number != number);
        Ok(())
    }

    async fn put_screening(&self, screening: &Screening) -> CoreResult<()> {
        self.entries.lock().await.screenings.insert(screening.id, screening.clone());
        Ok(())
    }

    async fn get_screening(&self, id: Uuid) -> CoreResult<Option<Screening>> {
        Ok(self.entries.lock().await.screenings.get(&id).cloned())
    }

    async fn screenings_for_movie(&self, movie_id: Uuid) -> CoreResult<Vec<Screening>> {
        let e = self.entries.lock().await;
        let mut list: Vec<Screening> = e
            .screenings
            .values()
            .filter(|s| s.movie_id == movie_id)
            .cloned()
            .collect();
        list.sort_by_key(|s| (s.date, s.time));
        Ok(list)
    }

    async fn delete_screening(&self, id: Uuid) -> CoreResult<bool> {
        Ok(self.entries.lock().await.screenings.remove(&id).is_some())
    }
}

// ============================================================================
// Broker
// ============================================================================

#[derive(Default)]
struct Queues {
    requests: VecDeque<PaymentRequest>,
    /// One queue per named subscription, each receiving every outcome.
    outcomes: HashMap<String, VecDeque<PaymentOutcome>>,
}

/// Request work queue plus outcome fan-out, with a switch to simulate an outage.
pub struct InMemoryBroker {
    queues: Mutex<Queues>,
    available: AtomicBool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self {
            queues: Mutex::new(Queues::default()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> CoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::ServiceUnavailable("Broker unreachable".to_string()))
        }
    }

    /// Outcomes published after this call are delivered to `name`.
    pub async fn subscribe(&self, name: &str) {
        self.queues.lock().await.outcomes.entry(name.to_string()).or_default();
    }

    pub async fn next_request(&self) -> Option<PaymentRequest> {
        self.queues.lock().await.requests.pop_front()
    }

    pub async fn next_outcome(&self, subscription: &str) -> Option<PaymentOutcome> {
        self.queues
            .lock()
            .await
            .outcomes
            .get_mut(subscription)
            .and_then(|q| q.pop_front())
    }
}

#[async_trait]
impl PaymentRequestPublisher for InMemoryBroker {
    async fn publish_request(&self, request: &PaymentRequest) -> CoreResult<()> {
        self.ensure_available()?;
        self.queues.lock().await.requests.push_back(request.clone());
        Ok(())
    }
}

#[async_trait]
impl PaymentOutcomePublisher for InMemoryBroker {
    async fn publish_outcome(&self, outcome: &PaymentOutcome) -> CoreResult<()> {
        self.ensure_available()?;
        let mut q = self.queues.lock().await;
        for subscription in q.outcomes.values_mut() {
            subscription.push_back(outcome.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinema_shared::OutcomeStatus;

    #[tokio::test]
    async fn test_outcomes_fan_out_to_every_subscription() {
        let broker = InMemoryBroker::new();
        broker.subscribe("reconciler").await;
        broker.subscribe("tickets").await;

        let request = PaymentRequest {
            reservation_id: Uuid::new_v4(),
            user_id: "u".into(),
            amount: 100,
            currency: "usd".into(),
        };
        broker
            .publish_outcome(&PaymentOutcome::for_request(&request, OutcomeStatus::Paid))
            .await
            .unwrap();

        assert!(broker.next_outcome("reconciler").await.is_some());
        assert!(broker.next_outcome("tickets").await.is_some());
        assert!(broker.next_outcome("tickets").await.is_none());
        assert!(broker.next_outcome("unsubscribed").await.is_none());
    }

    #[tokio::test]
    async fn test_outage_rejects_publish() {
        let broker = InMemoryBroker::new();
        broker.set_available(false);
        let request = PaymentRequest {
            reservation_id: Uuid::new_v4(),
            user_id: "u".into(),
            amount: 100,
            currency: "usd".into(),
        };
        assert!(matches!(
            broker.publish_request(&request).await,
            Err(CoreError::ServiceUnavailable(_))
        ));
        assert!(broker.next_request().await.is_none());
    }
}
