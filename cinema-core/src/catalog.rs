use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::identity::{authorize, Claims, CATALOG_ROLES};
use crate::repository::{CatalogCache, CatalogRepository};
use crate::{CoreError, CoreResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Minutes.
    pub duration: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: Uuid,
    pub number: String,
    pub rows: i32,
    pub cols: i32,
}

impl Room {
    pub fn contains(&self, row: i32, col: i32) -> bool {
        (0..self.rows).contains(&row) && (0..self.cols).contains(&col)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Screening {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub room_number: String,
    pub date: NaiveDate,
    #[serde(with = "hour_minute")]
    pub time: NaiveTime,
    pub price: f64,
}

impl Screening {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// Read-time predicate, compared against local wall-clock time.
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.starts_at() < now
    }

    pub fn amount_minor_units(&self) -> i64 {
        (self.price * 100.0).round() as i64
    }
}

/// `HH:MM` on the wire; `HH:MM:SS` is accepted on input.
mod hour_minute {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(super::TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw).map_err(serde::de::Error::custom)
    }
}

pub fn parse_date(raw: &str) -> CoreResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| CoreError::ValidationError(format!("Invalid date '{}', expected YYYY-MM-DD", raw)))
}

pub fn parse_time(raw: &str) -> CoreResult<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| CoreError::ValidationError(format!("Invalid time '{}', expected HH:MM", raw)))
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMovie {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: Option<i32>,
}

/// Partial movie edit; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovieUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRoom {
    pub number: String,
    pub rows: i32,
    pub cols: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewScreening {
    pub room_number: String,
    pub date: String,
    pub time: String,
    pub price: Option<f64>,
}

/// Cache-first catalog. Point reads fall back to the store on a miss and
/// repopulate the cache; writes go to the store first, then the cache.
pub struct CatalogService {
    cache: Arc<dyn CatalogCache>,
    store: Arc<dyn CatalogRepository>,
    default_price: f64,
}

impl CatalogService {
    pub fn new(cache: Arc<dyn CatalogCache>, store: Arc<dyn CatalogRepository>, default_price: f64) -> Self {
        Self {
            cache,
            store,
            default_price,
        }
    }

    // ============================================================================
    // Reads
    // ============================================================================

    pub async fn screening(&self, id: Uuid) -> CoreResult<Option<Screening>> {
        // 1. Cache (an unreachable cache counts as a miss)
        if let Some(screening) = self.cache.get_screening(id).await.ok().flatten() {
            return Ok(Some(screening));
        }

        // 2. Store fallback
        let screening = self.store.get_screening(id).await?;

        // 3. Repair
        if let Some(ref s) = screening {
            debug!(screening_id = %id, "Repairing cached screening");
            let _ = self.cache.put_screening(s).await;
        }
        Ok(screening)
    }

    pub async fn room(&self, number: &str) -> CoreResult<Option<Room>> {
        if let Some(room) = self.cache.get_room(number).await.ok().flatten() {
            return Ok(Some(room));
        }
        let room = self.store.get_room(number).await?;
        if let Some(ref r) = room {
            debug!(room = %number, "Repairing cached room");
            let _ = self.cache.put_room(r).await;
        }
        Ok(room)
    }

    pub async fn movie(&self, id: Uuid) -> CoreResult<Option<Movie>> {
        if let Some(movie) = self.cache.get_movie(id).await.ok().flatten() {
            return Ok(Some(movie));
        }
        let movie = self.store.get_movie(id).await?;
        if let Some(ref m) = movie {
            let _ = self.cache.put_movie(m).await;
        }
        Ok(movie)
    }

    pub async fn list_movies(&self) -> CoreResult<Vec<Movie>> {
        let mut movies = self.cache.list_movies().await?;
        movies.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(movies)
    }

    pub async fn list_rooms(&self) -> CoreResult<Vec<Room>> {
        let mut rooms = self.cache.list_rooms().await?;
        rooms.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(rooms)
    }

    /// Upcoming screenings of a movie. Expired entries are evicted from the
    /// cache on the way out; reservation data is never touched.
    pub async fn screenings_for_movie(&self, movie_id: Uuid, now: NaiveDateTime) -> CoreResult<Vec<Screening>> {
        if self.movie(movie_id).await?.is_none() {
            return Err(CoreError::NotFound(format!("Movie {} not found", movie_id)));
        }

        let screenings = self.cache.screenings_for_movie(movie_id).await?;
        let mut upcoming = Vec::with_capacity(screenings.len());
        for screening in screenings {
            if screening.is_expired(now) {
                self.evict_screening(&screening).await;
            } else {
                upcoming.push(screening);
            }
        }
        Ok(upcoming)
    }

    /// Drops an expired screening from the cache only. The store row stays as
    /// the audit record for any reservations made against it.
    pub async fn evict_screening(&self, screening: &Screening) {
        info!(screening_id = %screening.id, starts_at = %screening.starts_at(), "Evicting expired screening");
        if let Err(e) = self.cache.delete_screening(screening.id).await {
            warn!(screening_id = %screening.id, "Failed to evict screening: {}", e);
        }
    }

    // ============================================================================
    // Mutations (admin / editor)
    // ============================================================================

    pub async fn create_movie(&self, claims: &Claims, input: NewMovie) -> CoreResult<Movie> {
        authorize(claims, CATALOG_ROLES)?;

        let title = input
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CoreError::ValidationError("Title and duration are required".into()))?;
        let duration = input
            .duration
            .ok_or_else(|| CoreError::ValidationError("Title and duration are required".into()))?;
        if duration <= 0 {
            return Err(CoreError::ValidationError("Duration must be positive".into()));
        }

        let movie = Movie {
            id: Uuid::new_v4(),
            title,
            description: input.description,
            duration,
        };
        self.store.insert_movie(&movie).await?;
        self.cache.put_movie(&movie).await?;
        info!(movie_id = %movie.id, "Movie created");
        Ok(movie)
    }

    pub async fn update_movie(&self, claims: &Claims, movie_id: Uuid, input: MovieUpdate) -> CoreResult<Movie> {
        authorize(claims, CATALOG_ROLES)?;

        let mut movie = self
            .movie(movie_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Movie not found".into()))?;

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(CoreError::ValidationError("Title must not be empty".into()));
            }
            movie.title = title;
        }
        if let Some(description) = input.description {
            movie.description = Some(description);
        }
        if let Some(duration) = input.duration {
            if duration <= 0 {
                return Err(CoreError::ValidationError("Duration must be positive".into()));
            }
            movie.duration = duration;
        }

        if !self.store.update_movie(&movie).await? {
            return Err(CoreError::NotFound("Movie not found".into()));
        }
        self.cache.put_movie(&movie).await?;
        info!(movie_id = %movie.id, "Movie updated");
        Ok(movie)
    }

    /// Removes the movie and its screenings. Refused with `Conflict` while any
    /// reservation still references it.
    pub async fn delete_movie(&self, claims: &Claims, movie_id: Uuid) -> CoreResult<()> {
        authorize(claims, CATALOG_ROLES)?;

        let removed = self
            .store
            .delete_movie(movie_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Movie not found".into()))?;

        self.cache.delete_movie(movie_id).await?;
        for screening_id in &removed {
            let _ = self.cache.delete_screening(*screening_id).await;
        }
        info!(movie_id = %movie_id, screenings_removed = removed.len(), "Movie deleted");
        Ok(())
    }

    pub async fn create_room(&self, claims: &Claims, input: NewRoom) -> CoreResult<Room> {
        authorize(claims, CATALOG_ROLES)?;

        let number = input.number.trim().to_string();
        if number.is_empty() {
            return Err(CoreError::ValidationError("Room number is required".into()));
        }
        if input.rows <= 0 || input.cols <= 0 {
            return Err(CoreError::ValidationError("Rows and cols must be positive".into()));
        }
        if self.room(&number).await?.is_some() {
            return Err(CoreError::Conflict(format!("Room {} already exists", number)));
        }

        let room = Room {
            id: Uuid::new_v4(),
            number,
            rows: input.rows,
            cols: input.cols,
        };
        self.store.insert_room(&room).await?;
        self.cache.put_room(&room).await?;
        info!(room = %room.number, rows = room.rows, cols = room.cols, "Room created");
        Ok(room)
    }

    pub async fn delete_room(&self, claims: &Claims, number: &str) -> CoreResult<()> {
        authorize(claims, CATALOG_ROLES)?;

        let removed = self
            .store
            .delete_room(number)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Room {} not found", number)))?;

        self.cache.delete_room(number).await?;
        for screening_id in &removed {
            let _ = self.cache.delete_screening(*screening_id).await;
        }
        info!(room = %number, screenings_removed = removed.len(), "Room deleted");
        Ok(())
    }

    pub async fn add_screening(&self, claims: &Claims, movie_id: Uuid, input: NewScreening) -> CoreResult<Screening> {
        authorize(claims, CATALOG_ROLES)?;

        if self.movie(movie_id).await?.is_none() {
            return Err(CoreError::NotFound(format!("Movie {} not found", movie_id)));
        }
        let room_number = input.room_number.trim().to_string();
        if self.room(&room_number).await?.is_none() {
            return Err(CoreError::ValidationError(format!("Room {} does not exist", room_number)));
        }
        let date = parse_date(&input.date)?;
        let time = parse_time(&input.time)?;
        let price = input.price.unwrap_or(self.default_price);
        if price < 0.0 || !price.is_finite() {
            return Err(CoreError::ValidationError("Price must be a non-negative number".into()));
        }

        let screening = Screening {
            id: Uuid::new_v4(),
            movie_id,
            room_number,
            date,
            time,
            price,
        };
        self.store.insert_screening(&screening).await?;
        self.cache.put_screening(&screening).await?;
        info!(screening_id = %screening.id, movie_id = %movie_id, "Screening scheduled");
        Ok(screening)
    }

    pub async fn delete_screening(&self, claims: &Claims, movie_id: Uuid, screening_id: Uuid) -> CoreResult<()> {
        authorize(claims, CATALOG_ROLES)?;

        match self.screening(screening_id).await? {
            Some(s) if s.movie_id == movie_id => {}
            _ => {
                return Err(CoreError::NotFound(format!(
                    "Screening {} not found for movie {}",
                    screening_id, movie_id
                )))
            }
        }

        self.store.delete_screening(screening_id).await?;
        self.cache.delete_screening(screening_id).await?;
        info!(screening_id = %screening_id, "Screening deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryCatalogCache, InMemoryStore};

    fn editor() -> Claims {
        Claims::new("ed", ["editor"])
    }

    fn setup() -> (CatalogService, Arc<InMemoryCatalogCache>, Arc<InMemoryStore>) {
        let cache = Arc::new(InMemoryCatalogCache::new());
        let store = Arc::new(InMemoryStore::new());
        let service = CatalogService::new(cache.clone(), store.clone(), 15.0);
        (service, cache, store)
    }

    async fn seed(service: &CatalogService) -> (Movie, Room) {
        let movie = service
            .create_movie(
                &editor(),
                NewMovie {
                    title: Some("Metropolis".into()),
                    description: None,
                    duration: Some(153),
                },
            )
            .await
            .unwrap();
        let room = service
            .create_room(
                &editor(),
                NewRoom {
                    number: "1".into(),
                    rows: 5,
                    cols: 8,
                },
            )
            .await
            .unwrap();
        (movie, room)
    }

    fn new_screening(date: &str, time: &str) -> NewScreening {
        NewScreening {
            room_number: "1".into(),
            date: date.into(),
            time: time.into(),
            price: None,
        }
    }

    #[test]
    fn test_time_wire_format() {
        let screening = Screening {
            id: Uuid::nil(),
            movie_id: Uuid::nil(),
            room_number: "1".into(),
            date: parse_date("2099-03-01").unwrap(),
            time: parse_time("19:30:00").unwrap(),
            price: 9.99,
        };
        let json = serde_json::to_value(&screening).unwrap();
        assert_eq!(json["date"], "2099-03-01");
        assert_eq!(json["time"], "19:30");
        assert_eq!(screening.amount_minor_units(), 999);
    }

    #[tokio::test]
    async fn test_cache_miss_is_repaired_from_store() {
        let (service, cache, _store) = setup();
        let (movie, _) = seed(&service).await;
        let screening = service
            .add_screening(&editor(), movie.id, new_screening("2099-01-01", "20:00"))
            .await
            .unwrap();

        cache.delete_screening(screening.id).await.unwrap();
        assert!(cache.get_screening(screening.id).await.unwrap().is_none());

        let found = service.screening(screening.id).await.unwrap();
        assert_eq!(found, Some(screening.clone()));
        assert!(cache.get_screening(screening.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_screenings_sorted_and_expired_evicted() {
        let (service, cache, store) = setup();
        let (movie, _) = seed(&service).await;
        let late = service
            .add_screening(&editor(), movie.id, new_screening("2099-01-02", "10:00"))
            .await
            .unwrap();
        let early = service
            .add_screening(&editor(), movie.id, new_screening("2099-01-01", "22:15"))
            .await
            .unwrap();
        let past = service
            .add_screening(&editor(), movie.id, new_screening("2000-01-01", "10:00"))
            .await
            .unwrap();

        let now = chrono::Local::now().naive_local();
        let listed = service.screenings_for_movie(movie.id, now).await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);

        // Evicted from the cache, kept in the store.
        assert!(cache.get_screening(past.id).await.unwrap().is_none());
        assert!(store.get_screening(past.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_room_rules() {
        let (service, cache, store) = setup();
        let (movie, room) = seed(&service).await;

        let dup = service
            .create_room(
                &editor(),
                NewRoom {
                    number: room.number.clone(),
                    rows: 2,
                    cols: 2,
                },
            )
            .await;
        assert!(matches!(dup, Err(CoreError::Conflict(_))));

        let viewer = Claims::new("v", ["viewer"]);
        let forbidden = service.delete_room(&viewer, &room.number).await;
        assert!(matches!(forbidden, Err(CoreError::Forbidden(_))));

        let screening = service
            .add_screening(&editor(), movie.id, new_screening("2099-05-05", "18:00"))
            .await
            .unwrap();
        service.delete_room(&editor(), &room.number).await.unwrap();

        assert!(cache.get_room(&room.number).await.unwrap().is_none());
        assert!(cache.get_screening(screening.id).await.unwrap().is_none());
        assert!(store.get_screening(screening.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_movie_patches_store_and_cache() {
        let (service, cache, store) = setup();
        let (movie, _) = seed(&service).await;

        let updated = service
            .update_movie(
                &editor(),
                movie.id,
                MovieUpdate {
                    title: Some("Metropolis (restored)".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Metropolis (restored)");
        assert_eq!(updated.duration, 153);
        assert_eq!(cache.get_movie(movie.id).await.unwrap(), Some(updated.clone()));
        assert_eq!(store.get_movie(movie.id).await.unwrap(), Some(updated));

        let bad = service
            .update_movie(
                &editor(),
                movie.id,
                MovieUpdate {
                    duration: Some(0),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(bad, Err(CoreError::ValidationError(_))));

        let missing = service
            .update_movie(&editor(), Uuid::new_v4(), MovieUpdate::default())
            .await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));

        let viewer = Claims::new("v", ["viewer"]);
        let forbidden = service.update_movie(&viewer, movie.id, MovieUpdate::default()).await;
        assert!(matches!(forbidden, Err(CoreError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_delete_movie_drops_its_screenings() {
        let (service, cache, store) = setup();
        let (movie, _) = seed(&service).await;
        let screening = service
            .add_screening(&editor(), movie.id, new_screening("2099-05-05", "18:00"))
            .await
            .unwrap();

        service.delete_movie(&editor(), movie.id).await.unwrap();

        assert!(cache.get_movie(movie.id).await.unwrap().is_none());
        assert!(cache.list_movies().await.unwrap().is_empty());
        assert!(cache.get_screening(screening.id).await.unwrap().is_none());
        assert!(store.get_movie(movie.id).await.unwrap().is_none());
        assert!(store.get_screening(screening.id).await.unwrap().is_none());

        let again = service.delete_movie(&editor(), movie.id).await;
        assert!(matches!(again, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_movie_with_reservations_is_refused() {
        use crate::repository::ReservationRepository;
        use crate::reservation::NewReservation;

        let (service, cache, store) = setup();
        let (movie, room) = seed(&service).await;
        let screening = service
            .add_screening(&editor(), movie.id, new_screening("2099-05-05", "18:00"))
            .await
            .unwrap();
        store
            .create_reservation(NewReservation {
                id: Uuid::new_v4(),
                user_id: "u".into(),
                movie_id: movie.id,
                room_number: room.number.clone(),
                screening_id: screening.id,
                seat_row: 0,
                seat_column: 0,
                screening_datetime: screening.starts_at(),
                expires_at: None,
            })
            .await
            .unwrap();

        let refused = service.delete_movie(&editor(), movie.id).await;
        assert!(matches!(refused, Err(CoreError::Conflict(_))));
        assert!(cache.get_movie(movie.id).await.unwrap().is_some());
        assert!(store.get_screening(screening.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_screening_validation() {
        let (service, _, _) = setup();
        let (movie, _) = seed(&service).await;

        let unknown_movie = service
            .add_screening(&editor(), Uuid::new_v4(), new_screening("2099-01-01", "20:00"))
            .await;
        assert!(matches!(unknown_movie, Err(CoreError::NotFound(_))));

        let mut unknown_room = new_screening("2099-01-01", "20:00");
        unknown_room.room_number = "404".into();
        let result = service.add_screening(&editor(), movie.id, unknown_room).await;
        assert!(matches!(result, Err(CoreError::ValidationError(_))));

        let bad_time = service
            .add_screening(&editor(), movie.id, new_screening("2099-01-01", "8pm"))
            .await;
        assert!(matches!(bad_time, Err(CoreError::ValidationError(_))));

        let priced = service
            .add_screening(&editor(), movie.id, new_screening("2099-01-01", "20:00"))
            .await
            .unwrap();
        assert_eq!(priced.price, 15.0);
    }
}
