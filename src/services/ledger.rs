use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{parse_id, BookingError, Result};
use crate::models::seat::label_order;
use crate::models::{SeatStatus, ShowtimeSeat, SEATS_PER_ROOM};
use crate::repository::Store;

/// Display view of one showtime's ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatMap {
    pub showtime_id: Uuid,
    pub seats: Vec<ShowtimeSeat>,
    pub available: usize,
    pub reserved: usize,
    pub booked: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerCleanup {
    pub showtime_ids: Vec<Uuid>,
    pub entries_removed: u64,
}

/// The per-showtime seat ledger: sole source of truth for seat availability.
#[derive(Clone)]
pub struct ShowtimeSeatLedger {
    store: Arc<dyn Store>,
}

impl ShowtimeSeatLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Materializes one `available` entry per room seat.
    pub async fn initialize_seats(&self, showtime_id: Uuid, room_id: Uuid) -> Result<usize> {
        if self.store.find_showtime(showtime_id).await?.is_none() {
            return Err(BookingError::not_found("showtime", showtime_id));
        }

        let seats = self.store.list_room_seats(room_id).await?;
        if seats.len() != SEATS_PER_ROOM {
            return Err(BookingError::IncompleteRoom {
                room_id,
                found: seats.len(),
                expected: SEATS_PER_ROOM,
            });
        }

        let entries: Vec<ShowtimeSeat> = seats
            .into_iter()
            .map(|seat| ShowtimeSeat {
                id: Uuid::new_v4(),
                showtime_id,
                seat_id: seat.id,
                seat_number: seat.seat_number,
                status: SeatStatus::Available,
                booking_id: None,
            })
            .collect();
        self.store.insert_showtime_seats(&entries).await?;

        info!(%showtime_id, seats = entries.len(), "Ledger initialized");
        Ok(entries.len())
    }

    /// Direct status write for manual and administrative flows.
    pub async fn update_seat_status(
        &self,
        showtime_id: &str,
        seat_id: &str,
        status: SeatStatus,
    ) -> Result<()> {
        let showtime_id = parse_id("showtime_id", showtime_id)?;
        let seat_id = parse_id("seat_id", seat_id)?;

        let updated = self
            .store
            .set_seat_status(showtime_id, seat_id, status)
            .await?;
        if updated == 0 {
            return Err(BookingError::not_found("showtime seat", seat_id));
        }

        warn!(%showtime_id, %seat_id, %status, "Seat status set manually");
        Ok(())
    }

    pub async fn clean_up_expired_showtimes(&self) -> Result<LedgerCleanup> {
        self.clean_up_expired_showtimes_at(Utc::now()).await
    }

    /// Deletes the ledgers of every showtime that ended by `now`. Showtime
    /// rows are kept. Safe to run repeatedly.
    pub async fn clean_up_expired_showtimes_at(&self, now: DateTime<Utc>) -> Result<LedgerCleanup> {
        let mut cleanup = LedgerCleanup::default();
        for showtime_id in self.store.list_ended_showtimes(now).await? {
            let removed = self.store.delete_showtime_seats(showtime_id).await?;
            if removed > 0 {
                cleanup.entries_removed += removed;
                cleanup.showtime_ids.push(showtime_id);
            }
        }

        if !cleanup.showtime_ids.is_empty() {
            info!(
                showtimes = cleanup.showtime_ids.len(),
                entries = cleanup.entries_removed,
                "Ledgers of ended showtimes removed"
            );
        }
        Ok(cleanup)
    }

    pub async fn seat_map(&self, showtime_id: &str) -> Result<SeatMap> {
        let showtime_id = parse_id("showtime_id", showtime_id)?;
        if self.store.find_showtime(showtime_id).await?.is_none() {
            return Err(BookingError::not_found("showtime", showtime_id));
        }

        let mut seats = self.store.list_showtime_seats(showtime_id).await?;
        seats.sort_by_key(|s| label_order(&s.seat_number));

        let count = |status: SeatStatus| seats.iter().filter(|s| s.status == status).count();
        Ok(SeatMap {
            showtime_id,
            available: count(SeatStatus::Available),
            reserved: count(SeatStatus::Reserved),
            booked: count(SeatStatus::Booked),
            seats,
        })
    }
}
