//! Catalog rows owned by other parts of the application. The booking core
//! only reads them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovieStatus {
    ComingSoon,
    NowPlaying,
    Ended,
}

impl MovieStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovieStatus::ComingSoon => "coming_soon",
            MovieStatus::NowPlaying => "now_playing",
            MovieStatus::Ended => "ended",
        }
    }

    /// Only movies currently in theatres accept showtimes and bookings.
    pub fn is_bookable(&self) -> bool {
        matches!(self, MovieStatus::NowPlaying)
    }
}

impl std::str::FromStr for MovieStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coming_soon" => Ok(MovieStatus::ComingSoon),
            "now_playing" => Ok(MovieStatus::NowPlaying),
            "ended" => Ok(MovieStatus::Ended),
            other => Err(format!("unknown movie status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    /// Catalog id, shared with the movie metadata service.
    pub id: i64,
    pub title: String,
    pub status: MovieStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cinema {
    pub id: Uuid,
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub cinema_id: Uuid,
    /// Unique within the cinema.
    pub room_number: i32,
}
