use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    BookingRepository, CatalogRepository, ConfirmOutcome, LedgerRepository, PaymentRepository,
    ReleaseOutcome, ReserveOutcome, SeatRepository, ShowtimeRepository,
};
use crate::error::{BookingError, Result};
use crate::models::{
    Booking, BookingStatus, Cinema, Movie, Payment, PaymentReconciliation, PaymentStatus, Room,
    SeatStatus, SeatTemplate, Showtime, ShowtimeSeat,
};

#[derive(Default)]
struct State {
    movies: HashMap<i64, Movie>,
    cinemas: HashMap<Uuid, Cinema>,
    rooms: HashMap<Uuid, Room>,
    seats: Vec<SeatTemplate>,
    showtimes: HashMap<Uuid, Showtime>,
    ledger: HashMap<Uuid, ShowtimeSeat>,
    bookings: HashMap<Uuid, Booking>,
    payments: HashMap<Uuid, Payment>,
    reconciliations: Vec<PaymentReconciliation>,
    fail_ledger_inserts: bool,
}

fn fail_unclaimed(state: &mut State, booking_id: Uuid, now: DateTime<Utc>) -> u64 {
    let mut failed = 0;
    for payment in state.payments.values_mut() {
        if payment.booking_id == booking_id
            && payment.status == PaymentStatus::Pending
            && payment.capture_started_at.is_none()
        {
            payment.status = PaymentStatus::Failed;
            payment.updated_at = now;
            failed += 1;
        }
    }
    failed
}

/// In-memory store with the same atomicity as the Postgres one: every
/// method runs under a single lock.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_movie(&self, movie: Movie) {
        self.state.lock().await.movies.insert(movie.id, movie);
    }

    pub async fn put_cinema(&self, cinema: Cinema) {
        self.state.lock().await.cinemas.insert(cinema.id, cinema);
    }

    /// Makes the next ledger inserts fail, to exercise compensating rollbacks.
    pub async fn fail_ledger_inserts(&self, fail: bool) {
        self.state.lock().await.fail_ledger_inserts = fail;
    }

    pub async fn showtime_count(&self) -> usize {
        self.state.lock().await.showtimes.len()
    }

    pub async fn booking_count(&self) -> usize {
        self.state.lock().await.bookings.len()
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn find_movie(&self, id: i64) -> Result<Option<Movie>> {
        Ok(self.state.lock().await.movies.get(&id).cloned())
    }

    async fn find_cinema(&self, id: Uuid) -> Result<Option<Cinema>> {
        Ok(self.state.lock().await.cinemas.get(&id).cloned())
    }

    async fn find_room(&self, id: Uuid) -> Result<Option<Room>> {
        Ok(self.state.lock().await.rooms.get(&id).cloned())
    }

    async fn insert_room(&self, room: &Room) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.cinemas.contains_key(&room.cinema_id) {
            return Err(BookingError::not_found("cinema", room.cinema_id));
        }
        state.rooms.insert(room.id, room.clone());
        Ok(())
    }

    async fn delete_room(&self, id: Uuid) -> Result<u64> {
        Ok(self.state.lock().await.rooms.remove(&id).map_or(0, |_| 1))
    }
}

#[async_trait]
impl SeatRepository for MemoryStore {
    async fn count_room_seats(&self, room_id: Uuid) -> Result<usize> {
        let state = self.state.lock().await;
        Ok(state.seats.iter().filter(|s| s.room_id == room_id).count())
    }

    async fn list_room_seats(&self, room_id: Uuid) -> Result<Vec<SeatTemplate>> {
        let state = self.state.lock().await;
        Ok(state
            .seats
            .iter()
            .filter(|s| s.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn insert_room_seats(&self, seats: &[SeatTemplate]) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut taken: HashSet<(Uuid, String)> = state
            .seats
            .iter()
            .map(|s| (s.room_id, s.seat_number.clone()))
            .collect();
        for seat in seats {
            if !taken.insert((seat.room_id, seat.seat_number.clone())) {
                return Err(BookingError::AlreadyInitialized {
                    room_id: seat.room_id,
                });
            }
        }
        state.seats.extend_from_slice(seats);
        Ok(())
    }

    async fn delete_room_seats(&self, room_id: Uuid) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.seats.len();
        state.seats.retain(|s| s.room_id != room_id);
        Ok((before - state.seats.len()) as u64)
    }
}

#[async_trait]
impl ShowtimeRepository for MemoryStore {
    async fn find_showtime(&self, id: Uuid) -> Result<Option<Showtime>> {
        Ok(self.state.lock().await.showtimes.get(&id).cloned())
    }

    async fn find_overlapping_showtime(
        &self,
        room_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<Showtime>> {
        let state = self.state.lock().await;
        Ok(state
            .showtimes
            .values()
            .find(|s| s.room_id == room_id && s.overlaps(start, end))
            .cloned())
    }

    async fn count_room_showtimes(&self, room_id: Uuid) -> Result<usize> {
        let state = self.state.lock().await;
        Ok(state.showtimes.values().filter(|s| s.room_id == room_id).count())
    }

    async fn insert_showtime(&self, showtime: &Showtime) -> Result<()> {
        self.state
            .lock()
            .await
            .showtimes
            .insert(showtime.id, showtime.clone());
        Ok(())
    }

    async fn delete_showtime(&self, id: Uuid) -> Result<u64> {
        Ok(self.state.lock().await.showtimes.remove(&id).map_or(0, |_| 1))
    }

    async fn list_ended_showtimes(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let state = self.state.lock().await;
        Ok(state
            .showtimes
            .values()
            .filter(|s| s.has_ended(now))
            .filter(|s| state.ledger.values().any(|seat| seat.showtime_id == s.id))
            .map(|s| s.id)
            .collect())
    }
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn insert_showtime_seats(&self, seats: &[ShowtimeSeat]) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_ledger_inserts {
            return Err(BookingError::Internal("ledger insert failed".into()));
        }
        let mut taken: HashSet<(Uuid, Uuid)> = state
            .ledger
            .values()
            .map(|s| (s.showtime_id, s.seat_id))
            .collect();
        for seat in seats {
            if !taken.insert((seat.showtime_id, seat.seat_id)) {
                return Err(BookingError::Internal(format!(
                    "duplicate ledger entry for seat {} in showtime {}",
                    seat.seat_id, seat.showtime_id
                )));
            }
        }
        for seat in seats {
            state.ledger.insert(seat.id, seat.clone());
        }
        Ok(())
    }

    async fn list_showtime_seats(&self, showtime_id: Uuid) -> Result<Vec<ShowtimeSeat>> {
        let state = self.state.lock().await;
        Ok(state
            .ledger
            .values()
            .filter(|s| s.showtime_id == showtime_id)
            .cloned()
            .collect())
    }

    async fn find_showtime_seats(
        &self,
        showtime_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<ShowtimeSeat>> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.ledger.get(id))
            .filter(|s| s.showtime_id == showtime_id)
            .cloned()
            .collect())
    }

    async fn set_seat_status(
        &self,
        showtime_id: Uuid,
        seat_id: Uuid,
        status: SeatStatus,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        match state.ledger.get_mut(&seat_id) {
            Some(seat) if seat.showtime_id == showtime_id => {
                seat.status = status;
                if status == SeatStatus::Available {
                    seat.booking_id = None;
                }
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn delete_showtime_seats(&self, showtime_id: Uuid) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.ledger.len();
        state.ledger.retain(|_, s| s.showtime_id != showtime_id);
        Ok((before - state.ledger.len()) as u64)
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn reserve_and_insert(&self, booking: &Booking) -> Result<ReserveOutcome> {
        let mut state = self.state.lock().await;

        let unavailable: Vec<Uuid> = booking
            .seat_ids
            .iter()
            .filter(|id| {
                !state.ledger.get(*id).is_some_and(|seat| {
                    seat.showtime_id == booking.showtime_id && seat.is_available()
                })
            })
            .copied()
            .collect();
        if !unavailable.is_empty() {
            return Ok(ReserveOutcome::Unavailable(unavailable));
        }

        for id in &booking.seat_ids {
            if let Some(seat) = state.ledger.get_mut(id) {
                seat.status = SeatStatus::Reserved;
                seat.booking_id = Some(booking.id);
            }
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(ReserveOutcome::Reserved)
    }

    async fn find_booking(&self, id: Uuid) -> Result<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn list_user_bookings(&self, user_id: Uuid) -> Result<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.user_id == Some(user_id))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .values()
            .filter(|b| b.is_expired(now))
            .cloned()
            .collect())
    }

    async fn confirm(&self, id: Uuid, now: DateTime<Utc>) -> Result<ConfirmOutcome> {
        let mut state = self.state.lock().await;

        let booking = match state.bookings.get(&id) {
            Some(b) => b.clone(),
            None => return Ok(ConfirmOutcome::NotFound),
        };
        if !booking.is_pending() {
            return Ok(ConfirmOutcome::NotPending(booking));
        }

        let claimable = |seat: &ShowtimeSeat| {
            seat.showtime_id == booking.showtime_id
                && match seat.status {
                    SeatStatus::Available => true,
                    SeatStatus::Reserved => seat.booking_id == Some(booking.id),
                    SeatStatus::Booked => false,
                }
        };
        let claimed = booking
            .seat_ids
            .iter()
            .filter(|sid| state.ledger.get(*sid).is_some_and(|seat| claimable(seat)))
            .count();
        if claimed != booking.seat_ids.len() {
            return Ok(ConfirmOutcome::SeatConflict {
                expected: booking.seat_ids.len(),
                claimed: claimed as u64,
            });
        }

        for sid in &booking.seat_ids {
            if let Some(seat) = state.ledger.get_mut(sid) {
                seat.status = SeatStatus::Booked;
                seat.booking_id = Some(booking.id);
            }
        }
        let stored = state
            .bookings
            .get_mut(&id)
            .ok_or_else(|| BookingError::not_found("booking", id))?;
        stored.status = BookingStatus::Confirmed;
        stored.expires_at = None;
        stored.updated_at = now;
        Ok(ConfirmOutcome::Confirmed(stored.clone()))
    }

    async fn release(&self, id: Uuid, now: DateTime<Utc>) -> Result<ReleaseOutcome> {
        let mut state = self.state.lock().await;

        let booking = match state.bookings.get(&id) {
            Some(b) => b.clone(),
            None => return Ok(ReleaseOutcome::NotFound),
        };
        if !booking.is_pending() {
            return Ok(ReleaseOutcome::NotPending(booking));
        }

        let mut seats_released = 0;
        for seat in state.ledger.values_mut() {
            if seat.booking_id == Some(id) && seat.status == SeatStatus::Reserved {
                seat.status = SeatStatus::Available;
                seat.booking_id = None;
                seats_released += 1;
            }
        }
        let payments_failed = fail_unclaimed(&mut state, id, now);
        let stored = state
            .bookings
            .get_mut(&id)
            .ok_or_else(|| BookingError::not_found("booking", id))?;
        stored.status = BookingStatus::Cancelled;
        stored.expires_at = None;
        stored.updated_at = now;
        Ok(ReleaseOutcome::Released {
            booking: stored.clone(),
            seats_released,
            payments_failed,
        })
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        self.state
            .lock()
            .await
            .payments
            .insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>> {
        Ok(self.state.lock().await.payments.get(&id).cloned())
    }

    async fn find_payment_by_order(&self, order_id: &str) -> Result<Option<Payment>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .values()
            .find(|p| p.transaction_id.as_deref() == Some(order_id))
            .cloned())
    }

    async fn attach_order(&self, id: Uuid, order_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.payments.get_mut(&id) {
            Some(p) if p.status == PaymentStatus::Pending => {
                p.transaction_id = Some(order_id.to_string());
                p.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_payment(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.payments.get_mut(&id) {
            Some(p) if p.status == PaymentStatus::Pending && p.capture_started_at.is_none() => {
                p.status = PaymentStatus::Failed;
                p.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_capture(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.payments.get_mut(&id) {
            Some(p) if p.status == PaymentStatus::Pending && p.capture_started_at.is_none() => {
                p.capture_started_at = Some(now);
                p.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn settle_capture(
        &self,
        id: Uuid,
        status: PaymentStatus,
        capture_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.payments.get_mut(&id) {
            Some(p) if p.is_capturing() => {
                p.status = status;
                p.capture_id = capture_id.map(str::to_string);
                p.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_pending_payments(&self, booking_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        Ok(fail_unclaimed(&mut state, booking_id, now))
    }

    async fn list_booking_payments(&self, booking_id: Uuid) -> Result<Vec<Payment>> {
        let state = self.state.lock().await;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn insert_reconciliation(&self, item: &PaymentReconciliation) -> Result<()> {
        self.state.lock().await.reconciliations.push(item.clone());
        Ok(())
    }

    async fn list_open_reconciliations(&self) -> Result<Vec<PaymentReconciliation>> {
        let state = self.state.lock().await;
        Ok(state
            .reconciliations
            .iter()
            .filter(|r| r.resolved_at.is_none())
            .cloned()
            .collect())
    }
}
