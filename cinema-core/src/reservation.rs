use chrono::{DateTime, NaiveDateTime, Utc};
use cinema_shared::OutcomeStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::catalog::{Room, Screening};
use crate::CoreError;

/// Reservation lifecycle. Stored lowercase; parsed case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Paid,
    Failed,
}

impl ReservationStatus {
    /// Statuses that hold a seat claim.
    pub const ACTIVE: [ReservationStatus; 2] = [ReservationStatus::Pending, ReservationStatus::Paid];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Paid => "paid",
            ReservationStatus::Failed => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ReservationStatus::Pending),
            "paid" => Ok(ReservationStatus::Paid),
            "failed" => Ok(ReservationStatus::Failed),
            other => Err(CoreError::ValidationError(format!(
                "Unknown reservation status: {}",
                other
            ))),
        }
    }
}

impl From<OutcomeStatus> for ReservationStatus {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Paid => ReservationStatus::Paid,
            OutcomeStatus::Failed => ReservationStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: String,
    pub movie_id: Uuid,
    pub room_number: String,
    pub screening_id: Uuid,
    pub seat_row: i32,
    pub seat_column: i32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub screening_datetime: NaiveDateTime,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn holds_seat(&self, seat_row: i32, seat_column: i32) -> bool {
        self.status.is_active() && self.seat_row == seat_row && self.seat_column == seat_column
    }
}

/// Insert payload. The store stamps `created_at` and forces status `pending`.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub id: Uuid,
    pub user_id: String,
    pub movie_id: Uuid,
    pub room_number: String,
    pub screening_id: Uuid,
    pub seat_row: i32,
    pub seat_column: i32,
    pub screening_datetime: NaiveDateTime,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewReservation {
    pub fn into_pending(self, created_at: DateTime<Utc>) -> Reservation {
        Reservation {
            id: self.id,
            user_id: self.user_id,
            movie_id: self.movie_id,
            room_number: self.room_number,
            screening_id: self.screening_id,
            seat_row: self.seat_row,
            seat_column: self.seat_column,
            status: ReservationStatus::Pending,
            created_at,
            screening_datetime: self.screening_datetime,
            expires_at: self.expires_at,
        }
    }
}

/// Point-in-time occupancy of a room for one screening: 1 taken, 0 free.
#[derive(Debug, Clone, Serialize)]
pub struct SeatMap {
    pub room: String,
    pub layout: Vec<Vec<u8>>,
    pub rows: i32,
    pub cols: i32,
    pub screening: Screening,
}

impl SeatMap {
    pub fn build<'a>(
        room: &Room,
        screening: Screening,
        reservations: impl IntoIterator<Item = &'a Reservation>,
    ) -> Self {
        let rows = room.rows.max(0) as usize;
        let cols = room.cols.max(0) as usize;
        let mut layout = vec![vec![0u8; cols]; rows];

        for reservation in reservations {
            if !reservation.status.is_active() {
                continue;
            }
            let (r, c) = (reservation.seat_row, reservation.seat_column);
            if room.contains(r, c) {
                layout[r as usize][c as usize] = 1;
            }
        }

        Self {
            room: room.number.clone(),
            layout,
            rows: room.rows,
            cols: room.cols,
            screening,
        }
    }

    pub fn is_taken(&self, row: usize, col: usize) -> bool {
        self.layout
            .get(row)
            .and_then(|r| r.get(col))
            .map(|cell| *cell == 1)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn reservation(row: i32, col: i32, status: ReservationStatus) -> Reservation {
        NewReservation {
            id: Uuid::new_v4(),
            user_id: "u".to_string(),
            movie_id: Uuid::new_v4(),
            room_number: "1".to_string(),
            screening_id: Uuid::new_v4(),
            seat_row: row,
            seat_column: col,
            screening_datetime: NaiveDate::from_ymd_opt(2099, 1, 1)
                .unwrap()
                .and_hms_opt(20, 0, 0)
                .unwrap(),
            expires_at: None,
        }
        .into_pending(Utc::now())
        .with_status(status)
    }

    impl Reservation {
        fn with_status(mut self, status: ReservationStatus) -> Self {
            self.status = status;
            self
        }
    }

    #[test]
    fn test_status_parsing_is_case_insensitive() {
        assert_eq!("PAID".parse::<ReservationStatus>().unwrap(), ReservationStatus::Paid);
        assert_eq!("Pending".parse::<ReservationStatus>().unwrap(), ReservationStatus::Pending);
        assert!("cancelled".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn test_seat_map_marks_only_active_claims() {
        let room = Room {
            id: Uuid::new_v4(),
            number: "1".to_string(),
            rows: 2,
            cols: 3,
        };
        let screening = Screening {
            id: Uuid::new_v4(),
            movie_id: Uuid::new_v4(),
            room_number: "1".to_string(),
            date: NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
            time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            price: 12.5,
        };
        let reservations = vec![
            reservation(0, 0, ReservationStatus::Pending),
            reservation(1, 2, ReservationStatus::Paid),
            reservation(0, 1, ReservationStatus::Failed),
            reservation(5, 5, ReservationStatus::Paid),
        ];

        let map = SeatMap::build(&room, screening, &reservations);

        assert_eq!(map.layout, vec![vec![1, 0, 0], vec![0, 0, 1]]);
        assert!(map.is_taken(1, 2));
        assert!(!map.is_taken(0, 1));
        assert!(!map.is_taken(9, 9));
    }
}
