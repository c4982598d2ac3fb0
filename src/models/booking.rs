//! Bookings and their read-side projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Seats reserved, waiting for payment until `expires_at`.
    Pending,
    Confirmed,
    /// Cancelled by the owner or expired by the sweeper.
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status {other:?}")),
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    /// `None` for guest bookings.
    pub user_id: Option<Uuid>,
    pub movie_id: i64,
    pub showtime_id: Uuid,
    /// Ledger entry ids (`ShowtimeSeat.id`).
    pub seat_ids: Vec<Uuid>,
    /// Showtime price times seat count, in local currency units.
    pub total_price: i64,
    pub status: BookingStatus,
    /// End of the hold. Cleared on confirm and cancel.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_pending(&self) -> bool {
        self.status == BookingStatus::Pending
    }

    /// Still pending with its hold lapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatLabel {
    pub id: Uuid,
    pub seat_number: String,
}

/// Display projection of a booking, joined at read time.
#[derive(Debug, Clone, Serialize)]
pub struct BookingDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub movie_title: String,
    pub cinema_name: String,
    pub cinema_address: String,
    pub room_number: i32,
    pub seats: Vec<SeatLabel>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}
