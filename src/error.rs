use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

/// Coarse error categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    /// Caller lacks the operator credential for the route.
    Forbidden,
    NotFound,
    Conflict,
    StateViolation,
    UpstreamFailure,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid {field}: {value:?}")]
    InvalidId { field: &'static str, value: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operator access required: {0}")]
    Forbidden(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("seat inventory already initialized for room {room_id}")]
    AlreadyInitialized { room_id: Uuid },

    #[error("room {room_id} has {found} seats, expected {expected}")]
    IncompleteRoom {
        room_id: Uuid,
        found: usize,
        expected: usize,
    },

    #[error("room {room_id} is still referenced by showtimes")]
    RoomInUse { room_id: Uuid },

    #[error("room {room_id} is already booked by showtime {existing} in that window")]
    ShowtimeOverlap { room_id: Uuid, existing: Uuid },

    #[error("movie {movie_id} is not bookable (status {status})")]
    MovieNotBookable { movie_id: i64, status: String },

    #[error("{found} of {requested} seats belong to showtime {showtime_id}")]
    SeatsNotFound {
        showtime_id: Uuid,
        requested: usize,
        found: usize,
    },

    #[error("seats no longer available: {seat_ids:?}")]
    SeatUnavailable { seat_ids: Vec<Uuid> },

    #[error("booking {booking_id}: claimed {claimed} of {expected} seats")]
    SeatConflict {
        booking_id: Uuid,
        expected: usize,
        claimed: u64,
    },

    #[error("{entity} {id} is {actual}, expected {expected}")]
    InvalidState {
        entity: &'static str,
        id: Uuid,
        expected: &'static str,
        actual: String,
    },

    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error("payment gateway request timed out")]
    GatewayTimeout,

    #[error("payment gateway temporarily unavailable")]
    CircuitOpen,

    #[error("order {order_id} was not completed (status {status})")]
    PaymentIncomplete { order_id: String, status: String },

    #[error("payment {payment_id} captured but booking {booking_id} could not be confirmed: {reason}")]
    PaymentSucceededBookingFailed {
        payment_id: Uuid,
        booking_id: Uuid,
        reason: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BookingError>;

impl BookingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BookingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::InvalidId { .. } | BookingError::InvalidArgument(_) => {
                ErrorKind::InvalidArgument
            }
            BookingError::Forbidden(_) => ErrorKind::Forbidden,
            BookingError::NotFound { .. } | BookingError::SeatsNotFound { .. } => {
                ErrorKind::NotFound
            }
            BookingError::AlreadyInitialized { .. }
            | BookingError::RoomInUse { .. }
            | BookingError::ShowtimeOverlap { .. }
            | BookingError::SeatUnavailable { .. }
            | BookingError::SeatConflict { .. } => ErrorKind::Conflict,
            BookingError::IncompleteRoom { .. }
            | BookingError::MovieNotBookable { .. }
            | BookingError::InvalidState { .. } => ErrorKind::StateViolation,
            BookingError::Gateway(_)
            | BookingError::GatewayTimeout
            | BookingError::CircuitOpen
            | BookingError::PaymentIncomplete { .. } => ErrorKind::UpstreamFailure,
            BookingError::PaymentSucceededBookingFailed { .. }
            | BookingError::Database(_)
            | BookingError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<validator::ValidationErrors> for BookingError {
    fn from(err: validator::ValidationErrors) -> Self {
        BookingError::InvalidArgument(err.to_string())
    }
}

/// Parses a client-supplied identifier.
pub fn parse_id(field: &'static str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim()).map_err(|_| BookingError::InvalidId {
        field,
        value: value.to_string(),
    })
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::StateViolation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            BookingError::PaymentSucceededBookingFailed { .. } => {
                tracing::error!("{}", self);
                "Payment could not be finalized, please contact support".to_string()
            }
            BookingError::Database(_) | BookingError::Internal(_) => {
                tracing::error!("Internal Server Error: {}", self);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "kind": kind,
            "error": message,
        }));

        (status, body).into_response()
    }
}
