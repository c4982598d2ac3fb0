use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::Result,
    middleware::{AdminUser, CurrentUser},
    models::Payment,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments", post(create_payment))
        .route("/payments/capture", post(capture_payment))
        .route("/payments/return", get(gateway_return))
        .route("/payments/cancel", get(gateway_cancel))
        .route("/payments/reconciliations", get(open_reconciliations))
}

// --- Request structs ---

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    #[validate(length(min = 1, message = "booking_id is required"))]
    pub booking_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CapturePaymentRequest {
    #[validate(length(min = 1, message = "booking_id is required"))]
    pub booking_id: String,
    #[validate(length(min = 1, message = "order_id is required"))]
    pub order_id: String,
}

/// Gateway redirect parameters. PayPal passes the order id as `token`.
#[derive(Debug, Deserialize)]
pub struct RedirectQuery {
    pub token: Option<String>,
    #[serde(rename = "PayerID")]
    pub payer_id: Option<String>,
}

fn payment_body(payment: &Payment) -> serde_json::Value {
    json!({
        "success": true,
        "payment_id": payment.id,
        "booking_id": payment.booking_id,
        "status": payment.status,
        "payment": payment,
    })
}

// --- HTTP Handlers ---

/// POST /api/payments
async fn create_payment(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let initiation = state.payments.create_payment(&req.booking_id, user.0).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "payment_id": initiation.payment_id,
            "gateway_order_id": initiation.gateway_order_id,
            "approve_url": initiation.approve_url,
        })),
    ))
}

/// POST /api/payments/capture
async fn capture_payment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CapturePaymentRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let payment = state
        .payments
        .capture_payment(&req.booking_id, &req.order_id)
        .await?;
    finish_capture(&state, &payment).await;
    Ok(Json(payment_body(&payment)))
}

/// GET /api/payments/return?token=...
async fn gateway_return(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RedirectQuery>,
) -> Result<impl IntoResponse> {
    tracing::info!(token = ?query.token, payer_id = ?query.payer_id, "Gateway return redirect");
    let token = query.token.unwrap_or_default();
    let payment = state.payments.capture_payment_by_order_id(&token).await?;
    finish_capture(&state, &payment).await;
    Ok(Json(payment_body(&payment)))
}

/// GET /api/payments/cancel?token=...
async fn gateway_cancel(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RedirectQuery>,
) -> Result<impl IntoResponse> {
    let token = query.token.unwrap_or_default();
    let payment = state.payments.cancel_payment_by_order_id(&token).await?;
    Ok(Json(payment_body(&payment)))
}

/// GET /api/payments/reconciliations (operator)
async fn open_reconciliations(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<impl IntoResponse> {
    let items = state.payments.open_reconciliations().await?;
    Ok(Json(json!({ "success": true, "reconciliations": items })))
}

async fn finish_capture(state: &AppState, payment: &Payment) {
    if let Ok(booking) = state.bookings.find_booking(payment.booking_id).await {
        state.invalidate_seats(booking.showtime_id).await;
    }
}
