use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::{parse_id, BookingError},
    middleware::AdminUser,
    models::SeatStatus,
    services::CreateShowtimeRequest,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/showtimes", post(create_showtime))
        .route("/showtimes/{id}", get(get_showtime).delete(delete_showtime))
        .route("/showtimes/{id}/seats", get(seat_map))
        .route("/showtimes/{id}/seats/{seat_id}", patch(update_seat))
}

// POST /api/showtimes (admin)
async fn create_showtime(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(req): Json<CreateShowtimeRequest>,
) -> Result<impl IntoResponse, BookingError> {
    let showtime = state.showtimes.create_showtime(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "showtime": showtime })),
    ))
}

// GET /api/showtimes/{id}
async fn get_showtime(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BookingError> {
    let showtime = state.showtimes.get_showtime(&id).await?;
    Ok(Json(json!({ "success": true, "showtime": showtime })))
}

// DELETE /api/showtimes/{id} (admin)
async fn delete_showtime(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BookingError> {
    let entries = state.showtimes.delete_showtime(&id).await?;
    state.invalidate_seats(parse_id("showtime_id", &id)?).await;
    Ok(Json(json!({ "success": true, "seats_removed": entries })))
}

// GET /api/showtimes/{id}/seats
async fn seat_map(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BookingError> {
    let showtime_id = parse_id("showtime_id", &id)?;
    if let Some(cache) = &state.cache {
        if let Some(map) = cache.get_seat_map(showtime_id).await {
            return Ok(([("X-Cache", "HIT")], Json(json!({ "success": true, "seat_map": map }))));
        }
    }

    let map = state.ledger.seat_map(&id).await?;
    if let Some(cache) = &state.cache {
        cache.save_seat_map(&map).await;
    }
    Ok(([("X-Cache", "MISS")], Json(json!({ "success": true, "seat_map": map }))))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSeatRequest {
    pub status: SeatStatus,
}

// PATCH /api/showtimes/{id}/seats/{seat_id} (admin)
async fn update_seat(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path((id, seat_id)): Path<(String, String)>,
    Json(req): Json<UpdateSeatRequest>,
) -> Result<impl IntoResponse, BookingError> {
    state
        .ledger
        .update_seat_status(&id, &seat_id, req.status)
        .await?;
    state.invalidate_seats(parse_id("showtime_id", &id)?).await;
    Ok(Json(json!({ "success": true, "status": req.status })))
}
