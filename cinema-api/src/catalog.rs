use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use cinema_core::catalog::{MovieUpdate, NewMovie, NewRoom, NewScreening};
use cinema_core::identity::Claims;
use cinema_core::CoreError;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/movies", get(list_movies))
        .route("/movies/{movie_id}", get(get_movie))
        .route("/movies/{movie_id}/screenings", get(list_screenings))
        .route("/rooms", get(list_rooms))
}

/// Catalog mutations; the role check happens in the catalog service.
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/movies", post(create_movie))
        .route("/movies/{movie_id}", put(update_movie).delete(delete_movie))
        .route("/rooms", post(create_room))
        .route("/rooms/{number}", delete(delete_room))
        .route("/movies/{movie_id}/screenings", post(add_screening))
        .route("/movies/{movie_id}/screenings/{screening_id}", delete(delete_screening))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>, hint: &str) -> Result<T, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| AppError::BadRequest(format!("{}: {}", hint, e.body_text())))
}

pub async fn list_movies(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let movies = state.catalog.list_movies().await?;
    Ok(Json(json!({ "ok": true, "data": movies })))
}

pub async fn get_movie(
    State(state): State<AppState>,
    Path(movie_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let movie = state
        .catalog
        .movie(movie_id)
        .await?
        .ok_or_else(|| CoreError::NotFound("Movie not found".to_string()))?;
    Ok(Json(json!({ "ok": true, "data": movie })))
}

pub async fn create_movie(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<NewMovie>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let input = body(payload, "Missing title or duration")?;
    let movie = state.catalog.create_movie(&claims, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "message": "Movie created", "data": movie })),
    ))
}

pub async fn update_movie(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(movie_id): Path<Uuid>,
    payload: Result<Json<MovieUpdate>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let input = body(payload, "Invalid movie update")?;
    let movie = state.catalog.update_movie(&claims, movie_id, input).await?;
    Ok(Json(json!({ "ok": true, "message": "Movie updated", "data": movie })))
}

pub async fn delete_movie(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(movie_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.catalog.delete_movie(&claims, movie_id).await?;
    Ok(Json(json!({ "ok": true, "message": "Movie deleted" })))
}

pub async fn list_rooms(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let rooms = state.catalog.list_rooms().await?;
    Ok(Json(json!({ "ok": true, "data": rooms })))
}

pub async fn create_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<NewRoom>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let input = body(payload, "Missing number, rows, or cols")?;
    let room = state.catalog.create_room(&claims, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "message": "Room created", "data": room })),
    ))
}

pub async fn delete_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(number): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.catalog.delete_room(&claims, &number).await?;
    Ok(Json(json!({ "ok": true, "message": "Room deleted" })))
}

pub async fn list_screenings(
    State(state): State<AppState>,
    Path(movie_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let now = chrono::Local::now().naive_local();
    let screenings = state.catalog.screenings_for_movie(movie_id, now).await?;
    Ok(Json(json!({ "ok": true, "data": screenings })))
}

pub async fn add_screening(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(movie_id): Path<Uuid>,
    payload: Result<Json<NewScreening>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let input = body(payload, "Missing room_number, date (YYYY-MM-DD), or time (HH:MM)")?;
    let screening = state.catalog.add_screening(&claims, movie_id, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "message": "Screening added", "data": screening })),
    ))
}

pub async fn delete_screening(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((movie_id, screening_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    state.catalog.delete_screening(&claims, movie_id, screening_id).await?;
    Ok(Json(json!({ "ok": true, "message": "Screening deleted" })))
}
