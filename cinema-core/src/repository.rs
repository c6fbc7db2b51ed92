use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::catalog::{Movie, Room, Screening};
use crate::reservation::{NewReservation, Reservation, ReservationStatus};
use crate::CoreResult;

/// Durable record of seat claims. The single arbiter of seat ownership.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Inserts a `pending` row. Fails with `CoreError::Conflict` when another
    /// active reservation already holds the same (screening, row, column).
    async fn create_reservation(&self, reservation: NewReservation) -> CoreResult<Reservation>;

    async fn get_reservation(&self, id: Uuid) -> CoreResult<Option<Reservation>>;

    async fn find_for_seat(
        &self,
        screening_id: Uuid,
        seat_row: i32,
        seat_column: i32,
        statuses: &[ReservationStatus],
    ) -> CoreResult<Option<Reservation>>;

    async fn list_for_screening(
        &self,
        screening_id: Uuid,
        statuses: &[ReservationStatus],
    ) -> CoreResult<Vec<Reservation>>;

    /// Newest first.
    async fn list_for_user(&self, user_id: &str) -> CoreResult<Vec<Reservation>>;

    /// Unconditional overwrite. Returns `false` when no row matched.
    async fn update_status(&self, id: Uuid, status: ReservationStatus) -> CoreResult<bool>;

    /// Moves every `pending` row whose `expires_at` has passed to `failed`.
    async fn fail_expired_pending(&self, now: DateTime<Utc>) -> CoreResult<Vec<Uuid>>;
}

/// Authoritative catalog rows backing the cache.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn insert_movie(&self, movie: &Movie) -> CoreResult<()>;
    async fn get_movie(&self, id: Uuid) -> CoreResult<Option<Movie>>;
    /// Returns `false` when no row matched.
    async fn update_movie(&self, movie: &Movie) -> CoreResult<bool>;
    /// Removes the movie and its screenings. `None` when the movie is unknown;
    /// `CoreError::Conflict` when reservations still reference either.
    async fn delete_movie(&self, id: Uuid) -> CoreResult<Option<Vec<Uuid>>>;

    async fn insert_room(&self, room: &Room) -> CoreResult<()>;
    async fn get_room(&self, number: &str) -> CoreResult<Option<Room>>;
    /// Returns the ids of screenings removed along with the room.
    async fn delete_room(&self, number: &str) -> CoreResult<Option<Vec<Uuid>>>;

    async fn insert_screening(&self, screening: &Screening) -> CoreResult<()>;
    async fn get_screening(&self, id: Uuid) -> CoreResult<Option<Screening>>;
    async fn delete_screening(&self, id: Uuid) -> CoreResult<bool>;
}

/// Fast read path for catalog entities. Never authoritative for seats.
#[async_trait]
pub trait CatalogCache: Send + Sync {
    async fn put_movie(&self, movie: &Movie) -> CoreResult<()>;
    async fn get_movie(&self, id: Uuid) -> CoreResult<Option<Movie>>;
    async fn list_movies(&self) -> CoreResult<Vec<Movie>>;
    /// Also drops every cached screening of the movie.
    async fn delete_movie(&self, id: Uuid) -> CoreResult<()>;

    async fn put_room(&self, room: &Room) -> CoreResult<()>;
    async fn get_room(&self, number: &str) -> CoreResult<Option<Room>>;
    async fn list_rooms(&self) -> CoreResult<Vec<Room>>;
    /// Also drops every cached screening scheduled in the room.
    async fn delete_room(&self, number: &str) -> CoreResult<()>;

    async fn put_screening(&self, screening: &Screening) -> CoreResult<()>;
    async fn get_screening(&self, id: Uuid) -> CoreResult<Option<Screening>>;
    /// Sorted by (date, time).
    async fn screenings_for_movie(&self, movie_id: Uuid) -> CoreResult<Vec<Screening>>;
    async fn delete_screening(&self, id: Uuid) -> CoreResult<bool>;
}
