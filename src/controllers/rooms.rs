use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{error::BookingError, middleware::AdminUser, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{id}", delete(delete_room))
        .route("/rooms/{id}/seats", get(room_seats))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoomRequest {
    #[validate(length(min = 1, message = "cinema_id is required"))]
    pub cinema_id: String,
    #[validate(range(min = 1, message = "room_number must be positive"))]
    pub room_number: i32,
}

// POST /api/rooms (admin)
async fn create_room(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(req): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, BookingError> {
    req.validate()?;
    let (room, seats) = state
        .seats
        .provision_room(&req.cinema_id, req.room_number)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "room": room, "seats": seats })),
    ))
}

// DELETE /api/rooms/{id} (admin)
async fn delete_room(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BookingError> {
    let seats = state.seats.remove_room(&id).await?;
    Ok(Json(json!({ "success": true, "seats_removed": seats })))
}

// GET /api/rooms/{id}/seats
async fn room_seats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BookingError> {
    let seats = state.seats.seats_for_room(&id).await?;
    Ok(Json(json!({ "success": true, "seats": seats })))
}
