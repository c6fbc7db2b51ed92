use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use cinema_core::repository::ReservationRepository;
use cinema_core::reservation::{NewReservation, Reservation, ReservationStatus};
use cinema_core::CoreResult;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error_codes::{map_sqlx, StatementKind};

const RESERVATION_COLUMNS: &str = "id, user_id, movie_id, room_number, screening_id, seat_row, seat_column, \
     status, created_at, screening_datetime, expires_at";

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    user_id: String,
    movie_id: Uuid,
    room_number: String,
    screening_id: Uuid,
    seat_row: i32,
    seat_column: i32,
    status: String,
    created_at: DateTime<Utc>,
    screening_datetime: NaiveDateTime,
    expires_at: Option<DateTime<Utc>>,
}

impl ReservationRow {
    fn into_domain(self) -> CoreResult<Reservation> {
        Ok(Reservation {
            id: self.id,
            user_id: self.user_id,
            movie_id: self.movie_id,
            room_number: self.room_number,
            screening_id: self.screening_id,
            seat_row: self.seat_row,
            seat_column: self.seat_column,
            status: self.status.parse()?,
            created_at: self.created_at,
            screening_datetime: self.screening_datetime,
            expires_at: self.expires_at,
        })
    }
}

fn status_list(statuses: &[ReservationStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Reservation rows. Seat exclusivity lives in `ix_unique_seat_reservation`;
/// this type only translates its verdict.
pub struct PostgresReservationRepository {
    pub pool: sqlx::PgPool,
}

impl PostgresReservationRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReservationRepository for PostgresReservationRepository {
    async fn create_reservation(&self, reservation: NewReservation) -> CoreResult<Reservation> {
        let sql = format!(
            r#"
            INSERT INTO reservations
                (id, user_id, movie_id, room_number, screening_id, seat_row, seat_column,
                 status, screening_datetime, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        );

        let row: ReservationRow = sqlx::query_as(&sql)
            .bind(reservation.id)
            .bind(&reservation.user_id)
            .bind(reservation.movie_id)
            .bind(&reservation.room_number)
            .bind(reservation.screening_id)
            .bind(reservation.seat_row)
            .bind(reservation.seat_column)
            .bind(ReservationStatus::Pending.as_str())
            .bind(reservation.screening_datetime)
            .bind(reservation.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Insert))?;

        debug!(reservation_id = %row.id, "Reservation row inserted");
        row.into_domain()
    }

    async fn get_reservation(&self, id: Uuid) -> CoreResult<Option<Reservation>> {
        let sql = format!("SELECT {} FROM reservations WHERE id = $1", RESERVATION_COLUMNS);
        let row: Option<ReservationRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Read))?;
        row.map(ReservationRow::into_domain).transpose()
    }

    async fn find_for_seat(
        &self,
        screening_id: Uuid,
        seat_row: i32,
        seat_column: i32,
        statuses: &[ReservationStatus],
    ) -> CoreResult<Option<Reservation>> {
        let sql = format!(
            r#"
            SELECT {} FROM reservations
            WHERE screening_id = $1 AND seat_row = $2 AND seat_column = $3 AND status = ANY($4)
            LIMIT 1
            "#,
            RESERVATION_COLUMNS
        );
        let row: Option<ReservationRow> = sqlx::query_as(&sql)
            .bind(screening_id)
            .bind(seat_row)
            .bind(seat_column)
            .bind(status_list(statuses))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Read))?;
        row.map(ReservationRow::into_domain).transpose()
    }

    async fn list_for_screening(
        &self,
        screening_id: Uuid,
        statuses: &[ReservationStatus],
    ) -> CoreResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE screening_id = $1 AND status = ANY($2)",
            RESERVATION_COLUMNS
        );
        let rows: Vec<ReservationRow> = sqlx::query_as(&sql)
            .bind(screening_id)
            .bind(status_list(statuses))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Read))?;
        rows.into_iter().map(ReservationRow::into_domain).collect()
    }

    async fn list_for_user(&self, user_id: &str) -> CoreResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE user_id = $1 ORDER BY created_at DESC",
            RESERVATION_COLUMNS
        );
        let rows: Vec<ReservationRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Read))?;
        rows.into_iter().map(ReservationRow::into_domain).collect()
    }

    async fn update_status(&self, id: Uuid, status: ReservationStatus) -> CoreResult<bool> {
        // Moving a failed row back to an active status can hit the seat index.
        let result = sqlx::query("UPDATE reservations SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, StatementKind::Update))?;
        Ok(result.rows_affected() > 0)
    }

    async fn fail_expired_pending(&self, now: DateTime<Utc>) -> CoreResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE reservations
            SET status = 'failed'
            WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at <= $1
            RETURNING id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx(e, StatementKind::Update))?;

        if !ids.is_empty() {
            warn!(count = ids.len(), "Pending reservations expired without a payment outcome");
        }
        Ok(ids)
    }
}
