use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::error::{parse_id, BookingError, Result};
use crate::models::seat::{label_order, seat_layout};
use crate::models::{Room, SeatTemplate};
use crate::repository::Store;

/// Per-room seat catalog. Seats are generated once, when the room is
/// created, and never mutated afterwards.
#[derive(Clone)]
pub struct SeatInventory {
    store: Arc<dyn Store>,
}

impl SeatInventory {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn initialize_seats_for_room(&self, room_id: &str) -> Result<Vec<SeatTemplate>> {
        let room_id = parse_id("room_id", room_id)?;
        self.initialize(room_id).await
    }

    async fn initialize(&self, room_id: Uuid) -> Result<Vec<SeatTemplate>> {
        if self.store.find_room(room_id).await?.is_none() {
            return Err(BookingError::not_found("room", room_id));
        }
        if self.store.count_room_seats(room_id).await? > 0 {
            return Err(BookingError::AlreadyInitialized { room_id });
        }

        let seats = seat_layout(room_id);
        self.store.insert_room_seats(&seats).await?;

        info!(%room_id, seats = seats.len(), "Seat inventory initialized");
        Ok(seats)
    }

    /// Creates a room together with its seats. If the seats cannot be
    /// created the room is deleted again and the seat error returned.
    pub async fn provision_room(&self, cinema_id: &str, room_number: i32) -> Result<(Room, usize)> {
        let cinema_id = parse_id("cinema_id", cinema_id)?;
        if room_number <= 0 {
            return Err(BookingError::InvalidArgument(format!(
                "room_number must be positive, got {room_number}"
            )));
        }
        if self.store.find_cinema(cinema_id).await?.is_none() {
            return Err(BookingError::not_found("cinema", cinema_id));
        }

        let room = Room {
            id: Uuid::new_v4(),
            cinema_id,
            room_number,
        };
        self.store.insert_room(&room).await?;

        match self.initialize(room.id).await {
            Ok(seats) => Ok((room, seats.len())),
            Err(e) => {
                error!(room_id = %room.id, error = %e, "Seat initialization failed, removing room");
                self.store.delete_room_seats(room.id).await?;
                self.store.delete_room(room.id).await?;
                Err(e)
            }
        }
    }

    /// Deletes a room and its seats. Refused while any showtime uses the room.
    pub async fn remove_room(&self, room_id: &str) -> Result<u64> {
        let room_id = parse_id("room_id", room_id)?;
        if self.store.find_room(room_id).await?.is_none() {
            return Err(BookingError::not_found("room", room_id));
        }
        if self.store.count_room_showtimes(room_id).await? > 0 {
            return Err(BookingError::RoomInUse { room_id });
        }

        let seats = self.store.delete_room_seats(room_id).await?;
        self.store.delete_room(room_id).await?;
        info!(%room_id, seats, "Room removed");
        Ok(seats)
    }

    pub async fn seats_for_room(&self, room_id: &str) -> Result<Vec<SeatTemplate>> {
        let room_id = parse_id("room_id", room_id)?;
        let mut seats = self.store.list_room_seats(room_id).await?;
        seats.sort_by_key(|s| label_order(&s.seat_number));
        Ok(seats)
    }
}
