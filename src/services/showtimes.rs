use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::ledger::ShowtimeSeatLedger;
use crate::error::{parse_id, BookingError, Result};
use crate::models::Showtime;
use crate::repository::Store;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateShowtimeRequest {
    pub movie_id: Option<i64>,
    pub room_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[validate(range(min = 0, message = "price must not be negative"))]
    pub price: Option<i64>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| BookingError::InvalidArgument(format!("missing field {field}")))
}

#[derive(Clone)]
pub struct ShowtimeScheduler {
    store: Arc<dyn Store>,
    ledger: ShowtimeSeatLedger,
}

impl ShowtimeScheduler {
    pub fn new(store: Arc<dyn Store>, ledger: ShowtimeSeatLedger) -> Self {
        Self { store, ledger }
    }

    pub async fn create_showtime(&self, request: CreateShowtimeRequest) -> Result<Showtime> {
        request.validate()?;
        let movie_id = required(request.movie_id, "movie_id")?;
        let room_id = required(request.room_id, "room_id")?;
        let start_time = required(request.start_time, "start_time")?;
        let end_time = required(request.end_time, "end_time")?;
        let price = required(request.price, "price")?;

        let room_id = parse_id("room_id", &room_id)?;
        if self.store.find_room(room_id).await?.is_none() {
            return Err(BookingError::not_found("room", room_id));
        }

        let movie = self
            .store
            .find_movie(movie_id)
            .await?
            .ok_or_else(|| BookingError::not_found("movie", movie_id))?;
        if !movie.status.is_bookable() {
            return Err(BookingError::MovieNotBookable {
                movie_id,
                status: movie.status.as_str().to_string(),
            });
        }

        if start_time >= end_time {
            return Err(BookingError::InvalidArgument(
                "start_time must be before end_time".into(),
            ));
        }

        if let Some(existing) = self
            .store
            .find_overlapping_showtime(room_id, start_time, end_time)
            .await?
        {
            warn!(%room_id, existing = %existing.id, "Showtime overlaps an existing one");
            return Err(BookingError::ShowtimeOverlap {
                room_id,
                existing: existing.id,
            });
        }

        let showtime = Showtime {
            id: Uuid::new_v4(),
            movie_id,
            room_id,
            start_time,
            end_time,
            price,
        };
        self.store.insert_showtime(&showtime).await?;

        if let Err(e) = self.ledger.initialize_seats(showtime.id, room_id).await {
            error!(showtime_id = %showtime.id, error = %e, "Ledger initialization failed, removing showtime");
            self.store.delete_showtime_seats(showtime.id).await?;
            self.store.delete_showtime(showtime.id).await?;
            return Err(e);
        }

        info!(showtime_id = %showtime.id, %room_id, movie_id, "Showtime created");
        Ok(showtime)
    }

    /// Removes the ledger first, then the showtime row. Returns the number of
    /// ledger entries deleted.
    pub async fn delete_showtime(&self, id: &str) -> Result<u64> {
        let id = parse_id("showtime_id", id)?;
        if self.store.find_showtime(id).await?.is_none() {
            return Err(BookingError::not_found("showtime", id));
        }

        let entries = self.store.delete_showtime_seats(id).await?;
        self.store.delete_showtime(id).await?;

        info!(showtime_id = %id, entries, "Showtime deleted");
        Ok(entries)
    }

    pub async fn get_showtime(&self, id: &str) -> Result<Showtime> {
        let id = parse_id("showtime_id", id)?;
        self.store
            .find_showtime(id)
            .await?
            .ok_or_else(|| BookingError::not_found("showtime", id))
    }
}
