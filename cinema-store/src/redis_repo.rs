use async_trait::async_trait;
use cinema_core::catalog::{Movie, Room, Screening};
use cinema_core::repository::CatalogCache;
use cinema_core::{CoreError, CoreResult};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

const MOVIES_SET: &str = "movies";
const ROOMS_SET: &str = "rooms";

fn movie_key(id: Uuid) -> String {
    format!("movie:{}", id)
}

fn room_key(number: &str) -> String {
    format!("room:{}", number)
}

fn screening_key(id: Uuid) -> String {
    format!("screening:{}", id)
}

fn movie_screenings_key(movie_id: Uuid) -> String {
    format!("movie_screenings:{}", movie_id)
}

fn room_screenings_key(number: &str) -> String {
    format!("room_screenings:{}", number)
}

fn unavailable(e: redis::RedisError) -> CoreError {
    CoreError::ServiceUnavailable(format!("Catalog cache unreachable: {}", e))
}

fn encode<T: Serialize>(value: &T) -> CoreResult<String> {
    serde_json::to_string(value).map_err(|e| CoreError::StoreError(e.to_string()))
}

/// A corrupt entry reads as a miss so the store can repair it.
fn decode<T: DeserializeOwned>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key = %key, "Ignoring undecodable cache entry: {}", e);
            None
        }
    }
}

/// Catalog cache on redis: one JSON string per entity plus membership sets.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> CoreResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)
    }

    pub async fn ping(&self) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> CoreResult<Option<T>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(key).await.map_err(unavailable)?;
        Ok(decode(key, raw))
    }

    /// Loads every member of `set` through `key_of`, dropping dangling ids.
    async fn members<T: DeserializeOwned>(&self, set: &str, key_of: impl Fn(&str) -> String) -> CoreResult<Vec<T>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(set).await.map_err(unavailable)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| key_of(id)).collect();
        let raws: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(keys
            .iter()
            .zip(raws)
            .filter_map(|(key, raw)| decode(key, raw))
            .collect())
    }
}

#[async_trait]
impl CatalogCache for RedisClient {
    async fn put_movie(&self, movie: &Movie) -> CoreResult<()> {
        let body = encode(movie)?;
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .set(movie_key(movie.id), body)
            .sadd(MOVIES_SET, movie.id.to_string())
            .query_async::<()>(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn get_movie(&self, id: Uuid) -> CoreResult<Option<Movie>> {
        self.get_json(&movie_key(id)).await
    }

    async fn list_movies(&self) -> CoreResult<Vec<Movie>> {
        self.members(MOVIES_SET, |id| format!("movie:{}", id)).await
    }

    async fn delete_movie(&self, id: Uuid) -> CoreResult<()> {
        let screenings = self.screenings_for_movie(id).await?;

        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(movie_key(id))
            .srem(MOVIES_SET, id.to_string())
            .del(movie_screenings_key(id));
        for s in &screenings {
            pipe.del(screening_key(s.id))
                .srem(room_screenings_key(&s.room_number), s.id.to_string());
        }
        pipe.query_async::<()>(&mut conn).await.map_err(unavailable)?;

        debug!(movie_id = %id, screenings = screenings.len(), "Movie evicted from cache");
        Ok(())
    }

    async fn put_room(&self, room: &Room) -> CoreResult<()> {
        let body = encode(room)?;
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .set(room_key(&room.number), body)
            .sadd(ROOMS_SET, &room.number)
            .query_async::<()>(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn get_room(&self, number: &str) -> CoreResult<Option<Room>> {
        self.get_json(&room_key(number)).await
    }

    async fn list_rooms(&self) -> CoreResult<Vec<Room>> {
        self.members(ROOMS_SET, room_key).await
    }

    async fn delete_room(&self, number: &str) -> CoreResult<()> {
        let screenings: Vec<Screening> = self
            .members(&room_screenings_key(number), |id| format!("screening:{}", id))
            .await?;

        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(room_key(number))
            .srem(ROOMS_SET, number)
            .del(room_screenings_key(number));
        for s in &screenings {
            pipe.del(screening_key(s.id))
                .srem(movie_screenings_key(s.movie_id), s.id.to_string());
        }
        pipe.query_async::<()>(&mut conn).await.map_err(unavailable)?;

        debug!(room = %number, screenings = screenings.len(), "Room evicted from cache");
        Ok(())
    }

    async fn put_screening(&self, screening: &Screening) -> CoreResult<()> {
        let body = encode(screening)?;
        let id = screening.id.to_string();
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .set(screening_key(screening.id), body)
            .sadd(movie_screenings_key(screening.movie_id), &id)
            .sadd(room_screenings_key(&screening.room_number), &id)
            .query_async::<()>(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn get_screening(&self, id: Uuid) -> CoreResult<Option<Screening>> {
        self.get_json(&screening_key(id)).await
    }

    async fn screenings_for_movie(&self, movie_id: Uuid) -> CoreResult<Vec<Screening>> {
        let mut list: Vec<Screening> = self
            .members(&movie_screenings_key(movie_id), |id| format!("screening:{}", id))
            .await?;
        list.sort_by_key(|s| (s.date, s.time));
        Ok(list)
    }

    async fn delete_screening(&self, id: Uuid) -> CoreResult<bool> {
        let Some(screening) = self.get_json::<Screening>(&screening_key(id)).await? else {
            return Ok(false);
        };
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .del(screening_key(id))
            .srem(movie_screenings_key(screening.movie_id), id.to_string())
            .srem(room_screenings_key(&screening.room_number), id.to_string())
            .query_async::<()>(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let id = Uuid::nil();
        assert_eq!(room_key("A1"), "room:A1");
        assert_eq!(movie_key(id), format!("movie:{}", id));
        assert_eq!(movie_screenings_key(id), format!("movie_screenings:{}", id));
    }

    #[test]
    fn test_corrupt_entry_reads_as_miss() {
        let decoded: Option<Room> = decode("room:1", Some("{broken".to_string()));
        assert!(decoded.is_none());
        let missing: Option<Room> = decode("room:2", None);
        assert!(missing.is_none());
    }
}
