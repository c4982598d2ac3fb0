//! The per-showtime seat ledger, sole arbiter of availability.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    /// Held by a pending booking.
    Reserved,
    /// Owned by a confirmed booking.
    Booked,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "available",
            SeatStatus::Reserved => "reserved",
            SeatStatus::Booked => "booked",
        }
    }
}

impl std::str::FromStr for SeatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SeatStatus::Available),
            "reserved" => Ok(SeatStatus::Reserved),
            "booked" => Ok(SeatStatus::Booked),
            other => Err(format!("unknown seat status {other:?}")),
        }
    }
}

impl std::fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger entry: the state of a room seat for a single showtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowtimeSeat {
    pub id: Uuid,
    pub showtime_id: Uuid,
    pub seat_id: Uuid,
    pub seat_number: String,
    pub status: SeatStatus,
    /// Booking currently holding (`reserved`) or owning (`booked`) the seat.
    pub booking_id: Option<Uuid>,
}

impl ShowtimeSeat {
    pub fn is_available(&self) -> bool {
        self.status == SeatStatus::Available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [SeatStatus::Available, SeatStatus::Reserved, SeatStatus::Booked] {
            assert_eq!(status.as_str().parse::<SeatStatus>().unwrap(), status);
        }
        assert!("sold".parse::<SeatStatus>().is_err());
    }
}
