use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use cinema_core::catalog::{Movie, Room, Screening};
use cinema_core::repository::CatalogRepository;
use cinema_core::CoreResult;
use tracing::info;
use uuid::Uuid;

use crate::error_codes::{map_sqlx, StatementKind};

#[derive(sqlx::FromRow)]
struct MovieRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    duration: i32,
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: Uuid,
    number: String,
    rows: i32,
    cols: i32,
}

#[derive(sqlx::FromRow)]
struct ScreeningRow {
    id: Uuid,
    movie_id: Uuid,
    room_number: String,
    screening_date: NaiveDate,
    screening_time: NaiveTime,
    price: f64,
}

impl From<MovieRow> for Movie {
    fn from(r: MovieRow) -> Self {
        Movie {
            id: r.id,
            title: r.title,
            description: r.description,
            duration: r.duration,
        }
    }
}

impl From<RoomRow> for Room {
    fn from(r: RoomRow) -> Self {
        Room {
            id: r.id,
            number: r.number,
            rows: r.rows,
            cols: r.cols,
        }
    }
}

impl From<ScreeningRow> for Screening {
    fn from(r: ScreeningRow) -> Self {
        Screening {
            id: r.id,
            movie_id: r.movie_id,
            room_number: r.room_number,
            date: r.screening_date,
            time: r.screening_time,
            price: r.price,
        }
    }
}

/// Durable mirror of the catalog cache. Source for read-repair.
pub struct PostgresCatalogRepository {
    pub pool: sqlx::PgPool,
}

impl PostgresCatalogRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PostgresCatalogRepository {
    async fn insert_movie(&self, movie: &Movie) -> CoreResult<()> {
        sqlx::query("INSERT INTO movies (id, title, description, duration) VALUES ($1, $2, $3, $4)")
            .bind(movie.id)
            .bind(&movie.title)
            .bind(&movie.description)
            .bind(movie.duration)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Insert))?;
        Ok(())
    }

    async fn get_movie(&self, id: Uuid) -> CoreResult<Option<Movie>> {
        let row: Option<MovieRow> =
            sqlx::query_as("SELECT id, title, description, duration FROM movies WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx(e, StatementKind::Read))?;
        Ok(row.map(Into::into))
    }

    async fn update_movie(&self, movie: &Movie) -> CoreResult<bool> {
        let result = sqlx::query("UPDATE movies SET title = $2, description = $3, duration = $4 WHERE id = $1")
            .bind(movie.id)
            .bind(&movie.title)
            .bind(&movie.description)
            .bind(movie.duration)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Update))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_movie(&self, id: Uuid) -> CoreResult<Option<Vec<Uuid>>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Delete))?;

        let screening_ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM screenings WHERE movie_id = $1")
            .bind(id)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Read))?;

        // Screenings cascade; reservations do not, so a booked movie is refused.
        let deleted = sqlx::query("DELETE FROM movies WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Delete))?;

        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit().await.map_err(|e| map_sqlx(e, StatementKind::Delete))?;
        info!(movie_id = %id, screenings = screening_ids.len(), "Movie removed with its screenings");
        Ok(Some(screening_ids))
    }

    async fn insert_room(&self, room: &Room) -> CoreResult<()> {
        sqlx::query("INSERT INTO rooms (id, number, rows, cols) VALUES ($1, $2, $3, $4)")
            .bind(room.id)
            .bind(&room.number)
            .bind(room.rows)
            .bind(room.cols)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Insert))?;
        Ok(())
    }

    async fn get_room(&self, number: &str) -> CoreResult<Option<Room>> {
        let row: Option<RoomRow> = sqlx::query_as("SELECT id, number, rows, cols FROM rooms WHERE number = $1")
            .bind(number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Read))?;
        Ok(row.map(Into::into))
    }

    async fn delete_room(&self, number: &str) -> CoreResult<Option<Vec<Uuid>>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Delete))?;

        // Collected before the cascade so the cache can follow.
        let screening_ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM screenings WHERE room_number = $1")
            .bind(number)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Read))?;

        let deleted = sqlx::query("DELETE FROM rooms WHERE number = $1")
            .bind(number)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Delete))?;

        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit().await.map_err(|e| map_sqlx(e, StatementKind::Delete))?;
        info!(room = %number, screenings = screening_ids.len(), "Room removed with its screenings");
        Ok(Some(screening_ids))
    }

    async fn insert_screening(&self, screening: &Screening) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO screenings (id, movie_id, room_number, screening_date, screening_time, price)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(screening.id)
        .bind(screening.movie_id)
        .bind(&screening.room_number)
        .bind(screening.date)
        .bind(screening.time)
        .bind(screening.price)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx(e, StatementKind::Insert))?;
        Ok(())
    }

    async fn get_screening(&self, id: Uuid) -> CoreResult<Option<Screening>> {
        let row: Option<ScreeningRow> = sqlx::query_as(
            r#"
            SELECT id, movie_id, room_number, screening_date, screening_time, price
            FROM screenings WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx(e, StatementKind::Read))?;
        Ok(row.map(Into::into))
    }

    async fn delete_screening(&self, id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM screenings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Delete))?;
        Ok(result.rows_affected() > 0)
    }
}
