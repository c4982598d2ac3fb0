pub mod bookings;
pub mod payment;
pub mod rooms;
pub mod showtimes;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(rooms::routes())
        .merge(showtimes::routes())
        .merge(bookings::routes())
        .merge(payment::routes())
}
