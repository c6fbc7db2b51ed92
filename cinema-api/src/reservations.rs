use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use cinema_core::booking::ReserveSeat;
use cinema_core::identity::Claims;
use cinema_core::CoreError;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Routes that need a verified caller.
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/reservations", post(create_reservation))
        .route("/reservations/me", get(my_reservations))
}

pub fn public_routes() -> Router<AppState> {
    Router::new().route(
        "/movies/{movie_id}/screenings/{screening_id}/seats",
        get(view_seats),
    )
}

pub async fn create_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<ReserveSeat>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(input) = payload.map_err(|e| AppError::BadRequest(format!("Missing reservation fields: {}", e.body_text())))?;
    let screening_id = input.screening_id;

    let receipt = state.booking.reserve(&claims, input).await?;
    tracing::info!(
        reservation_id = %receipt.reservation_id,
        screening_id = %screening_id,
        user_id = %claims.subject,
        "Reservation initiated"
    );

    Ok(Json(json!({
        "ok": true,
        "message": "Reservation initiated",
        "reservation_id": receipt.reservation_id,
    })))
}

pub async fn my_reservations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, AppError> {
    let history = state.booking.history(&claims).await?;
    Ok(Json(json!({ "ok": true, "data": history })))
}

pub async fn view_seats(
    State(state): State<AppState>,
    Path((movie_id, screening_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    let map = state.booking.seat_map(screening_id).await?;
    if map.screening.movie_id != movie_id {
        return Err(CoreError::NotFound("Screening not found".to_string()).into());
    }
    Ok(Json(json!({ "ok": true, "data": map })))
}
