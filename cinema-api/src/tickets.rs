use axum::{
    extract::{Path, State},
    routing::get,
    Extension, Json, Router,
};
use cinema_core::identity::{has_required_role, Claims, ROLE_ADMIN};
use cinema_core::CoreError;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/tickets/{reservation_id}", get(get_ticket))
}

/// A ticket is visible to its holder and to admins.
pub async fn get_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let ticket = state
        .tickets
        .load(reservation_id)
        .await?
        .ok_or_else(|| CoreError::NotFound("Ticket not issued".to_string()))?;

    if ticket.user_id != claims.subject && !has_required_role(&claims.roles, &[ROLE_ADMIN]) {
        return Err(CoreError::Forbidden("Ticket belongs to another user".to_string()).into());
    }
    Ok(Json(json!({ "ok": true, "data": ticket })))
}
