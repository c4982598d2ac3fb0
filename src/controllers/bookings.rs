use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::{parse_id, BookingError, Result},
    middleware::{AdminUser, CurrentUser},
    models::Booking,
    services::CreateBookingRequest,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(get_user_bookings).post(create_booking))
        .route("/bookings/{id}", get(get_booking))
        .route("/bookings/{id}/cancel", patch(cancel_booking))
        .route("/bookings/{id}/confirm", post(confirm_booking))
        .route("/bookings/{id}/payments", get(booking_payments))
}

/* ---------- helpers ---------- */

/// Loads a booking the caller may act on. Other users' bookings look absent.
async fn visible_booking(state: &AppState, user: CurrentUser, id: &str) -> Result<Booking> {
    let booking_id = parse_id("booking_id", id)?;
    let booking = state.bookings.find_booking(booking_id).await?;
    if !user.can_see(booking.user_id) {
        return Err(BookingError::not_found("booking", booking_id));
    }
    Ok(booking)
}

/* ---------- BOOKINGS ---------- */

// POST /api/bookings
async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse> {
    let details = state.bookings.create_booking(user.0, req).await?;
    state.invalidate_seats(details.booking.showtime_id).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "booking_id": details.booking.id,
            "total_price": details.booking.total_price,
            "status": details.booking.status,
            "booking": details,
        })),
    ))
}

// GET /api/bookings
async fn get_user_bookings(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<impl IntoResponse> {
    let user_id = user.require()?;
    let bookings = state.bookings.get_user_bookings(user_id).await?;
    Ok(Json(json!({ "success": true, "bookings": bookings })))
}

// GET /api/bookings/{id}
async fn get_booking(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let booking = visible_booking(&state, user, &id).await?;
    let details = state.bookings.get_booking(booking.id).await?;
    Ok(Json(json!({ "success": true, "booking": details })))
}

// PATCH /api/bookings/{id}/cancel
async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let booking = visible_booking(&state, user, &id).await?;
    let booking = state.bookings.cancel_booking(booking.id).await?;
    state.invalidate_seats(booking.showtime_id).await;
    Ok(Json(json!({ "success": true, "booking": booking })))
}

// POST /api/bookings/{id}/confirm (admin)
async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let booking_id = parse_id("booking_id", &id)?;
    let booking = state.bookings.confirm_booking(booking_id).await?;
    state.invalidate_seats(booking.showtime_id).await;
    Ok(Json(json!({ "success": true, "booking": booking })))
}

// GET /api/bookings/{id}/payments
async fn booking_payments(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let booking = visible_booking(&state, user, &id).await?;
    let payments = state
        .payments
        .payments_for_booking(&booking.id.to_string())
        .await?;
    Ok(Json(json!({ "success": true, "payments": payments })))
}
