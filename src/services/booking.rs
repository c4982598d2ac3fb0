//! Booking lifecycle: pending -> confirmed | cancelled.
//!
//! Seats are claimed when the booking is created: the ledger entries move
//! `available -> reserved` in the same unit that stores the pending booking.
//! Confirmation moves them to `booked` with a matched-count check, and
//! cancellation or expiry returns them to `available`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{parse_id, BookingError, Result};
use crate::models::seat::label_order;
use crate::models::{Booking, BookingDetails, BookingStatus, SeatLabel};
use crate::repository::{ConfirmOutcome, ReleaseOutcome, ReserveOutcome, Store};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBookingRequest {
    #[validate(length(min = 1, message = "showtime_id is required"))]
    pub showtime_id: String,
    #[validate(length(min = 1, max = 144, message = "select between 1 and 144 seats"))]
    pub seat_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExpiredBookings {
    pub bookings: Vec<Booking>,
    pub seats_released: u64,
    pub payments_failed: u64,
}

#[derive(Clone)]
pub struct BookingOrchestrator {
    store: Arc<dyn Store>,
    hold: Duration,
}

impl BookingOrchestrator {
    pub fn new(store: Arc<dyn Store>, hold: Duration) -> Self {
        Self { store, hold }
    }

    pub async fn create_booking(
        &self,
        user_id: Option<Uuid>,
        request: CreateBookingRequest,
    ) -> Result<BookingDetails> {
        request.validate()?;
        let showtime_id = parse_id("showtime_id", &request.showtime_id)?;
        let seat_ids = request
            .seat_ids
            .iter()
            .map(|id| parse_id("seat_id", id))
            .collect::<Result<Vec<_>>>()?;

        let mut seen = HashSet::with_capacity(seat_ids.len());
        if let Some(dup) = seat_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(BookingError::InvalidArgument(format!(
                "seat {dup} selected more than once"
            )));
        }

        let showtime = self
            .store
            .find_showtime(showtime_id)
            .await?
            .ok_or_else(|| BookingError::not_found("showtime", showtime_id))?;
        let movie = self
            .store
            .find_movie(showtime.movie_id)
            .await?
            .ok_or_else(|| BookingError::not_found("movie", showtime.movie_id))?;
        if !movie.status.is_bookable() {
            return Err(BookingError::MovieNotBookable {
                movie_id: movie.id,
                status: movie.status.as_str().to_string(),
            });
        }

        let seats = self
            .store
            .find_showtime_seats(showtime_id, &seat_ids)
            .await?;
        if seats.len() < seat_ids.len() {
            return Err(BookingError::SeatsNotFound {
                showtime_id,
                requested: seat_ids.len(),
                found: seats.len(),
            });
        }

        let taken: Vec<Uuid> = seats
            .iter()
            .filter(|s| !s.is_available())
            .map(|s| s.id)
            .collect();
        if !taken.is_empty() {
            return Err(BookingError::SeatUnavailable { seat_ids: taken });
        }

        let total_price = showtime
            .price
            .checked_mul(seat_ids.len() as i64)
            .ok_or_else(|| BookingError::InvalidArgument("total price overflows".into()))?;

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            user_id,
            movie_id: showtime.movie_id,
            showtime_id,
            seat_ids,
            total_price,
            status: BookingStatus::Pending,
            expires_at: Some(now + self.hold),
            created_at: now,
            updated_at: now,
        };

        // The read above is advisory; this is where the claim is decided
        match self.store.reserve_and_insert(&booking).await? {
            ReserveOutcome::Reserved => {}
            ReserveOutcome::Unavailable(seat_ids) => {
                warn!(%showtime_id, ?seat_ids, "Lost seat race while creating booking");
                return Err(BookingError::SeatUnavailable { seat_ids });
            }
        }

        info!(
            booking_id = %booking.id,
            %showtime_id,
            seats = booking.seat_ids.len(),
            total_price,
            "Booking created"
        );
        self.details(booking).await
    }

    /// Flips the booking's seats to `booked` and the booking to `confirmed`.
    /// A seat claimed by another path aborts the whole unit with
    /// `SeatConflict` and leaves the booking pending.
    pub async fn confirm_booking(&self, booking_id: Uuid) -> Result<Booking> {
        match self.store.confirm(booking_id, Utc::now()).await? {
            ConfirmOutcome::Confirmed(booking) => {
                info!(%booking_id, seats = booking.seat_ids.len(), "Booking confirmed");
                Ok(booking)
            }
            ConfirmOutcome::NotFound => Err(BookingError::not_found("booking", booking_id)),
            ConfirmOutcome::NotPending(booking) => Err(BookingError::InvalidState {
                entity: "booking",
                id: booking_id,
                expected: "pending",
                actual: booking.status.to_string(),
            }),
            ConfirmOutcome::SeatConflict { expected, claimed } => {
                warn!(%booking_id, expected, claimed, "Seat conflict on confirmation");
                Err(BookingError::SeatConflict {
                    booking_id,
                    expected,
                    claimed,
                })
            }
        }
    }

    /// Cancels a pending booking, releases its seats and fails its unpaid
    /// payments. Any other status is left as is and returned unchanged.
    pub async fn cancel_booking(&self, booking_id: Uuid) -> Result<Booking> {
        match self.store.release(booking_id, Utc::now()).await? {
            ReleaseOutcome::Released {
                booking,
                seats_released,
                payments_failed,
            } => {
                info!(%booking_id, seats_released, payments_failed, "Booking cancelled");
                Ok(booking)
            }
            ReleaseOutcome::NotPending(booking) => Ok(booking),
            ReleaseOutcome::NotFound => Err(BookingError::not_found("booking", booking_id)),
        }
    }

    pub async fn find_booking(&self, booking_id: Uuid) -> Result<Booking> {
        self.store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<BookingDetails> {
        let booking = self.find_booking(booking_id).await?;
        self.details(booking).await
    }

    pub async fn get_user_bookings(&self, user_id: Uuid) -> Result<Vec<BookingDetails>> {
        let bookings = self.store.list_user_bookings(user_id).await?;
        let mut out = Vec::with_capacity(bookings.len());
        for booking in bookings {
            out.push(self.details(booking).await?);
        }
        Ok(out)
    }

    /// Cancels every pending booking whose hold lapsed by `now`.
    pub async fn expire_pending_bookings(&self, now: DateTime<Utc>) -> Result<ExpiredBookings> {
        let mut expired = ExpiredBookings::default();
        for candidate in self.store.list_expired_pending(now).await? {
            // A concurrent confirm or cancel wins; release reports NotPending
            if let ReleaseOutcome::Released {
                booking,
                seats_released,
                payments_failed,
            } = self.store.release(candidate.id, now).await?
            {
                info!(
                    booking_id = %booking.id,
                    seats_released,
                    payments_failed,
                    "Pending booking expired"
                );
                expired.seats_released += seats_released;
                expired.payments_failed += payments_failed;
                expired.bookings.push(booking);
            }
        }
        Ok(expired)
    }

    /// Read-side projection joined from the catalog at read time.
    async fn details(&self, booking: Booking) -> Result<BookingDetails> {
        let showtime = self
            .store
            .find_showtime(booking.showtime_id)
            .await?
            .ok_or_else(|| BookingError::not_found("showtime", booking.showtime_id))?;
        let movie = self
            .store
            .find_movie(booking.movie_id)
            .await?
            .ok_or_else(|| BookingError::not_found("movie", booking.movie_id))?;
        let room = self
            .store
            .find_room(showtime.room_id)
            .await?
            .ok_or_else(|| BookingError::not_found("room", showtime.room_id))?;
        let cinema = self
            .store
            .find_cinema(room.cinema_id)
            .await?
            .ok_or_else(|| BookingError::not_found("cinema", room.cinema_id))?;

        // Ledgers of ended showtimes are swept; labels may be gone
        let mut seats: Vec<SeatLabel> = self
            .store
            .find_showtime_seats(booking.showtime_id, &booking.seat_ids)
            .await?
            .into_iter()
            .map(|s| SeatLabel {
                id: s.id,
                seat_number: s.seat_number,
            })
            .collect();
        seats.sort_by_key(|s| label_order(&s.seat_number));

        Ok(BookingDetails {
            booking,
            movie_title: movie.title,
            cinema_name: cinema.name,
            cinema_address: cinema.address,
            room_number: room.room_number,
            seats,
            start_time: showtime.start_time,
            end_time: showtime.end_time,
        })
    }
}
