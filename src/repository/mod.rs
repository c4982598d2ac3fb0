//! Persistence seams for the booking core.
//!
//! Each trait groups the reads and writes of one resource. Methods documented
//! as atomic must behave as a single unit against every other writer of the
//! same rows: `PgStore` runs them in one transaction, `MemoryStore` under one
//! lock.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Booking, Cinema, Movie, Payment, PaymentReconciliation, PaymentStatus, Room, SeatStatus,
    SeatTemplate, Showtime, ShowtimeSeat,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_movie(&self, id: i64) -> Result<Option<Movie>>;
    async fn find_cinema(&self, id: Uuid) -> Result<Option<Cinema>>;
    async fn find_room(&self, id: Uuid) -> Result<Option<Room>>;
    async fn insert_room(&self, room: &Room) -> Result<()>;
    async fn delete_room(&self, id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait SeatRepository: Send + Sync {
    async fn count_room_seats(&self, room_id: Uuid) -> Result<usize>;
    async fn list_room_seats(&self, room_id: Uuid) -> Result<Vec<SeatTemplate>>;
    /// Atomic: all seats are inserted or none.
    async fn insert_room_seats(&self, seats: &[SeatTemplate]) -> Result<()>;
    async fn delete_room_seats(&self, room_id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait ShowtimeRepository: Send + Sync {
    async fn find_showtime(&self, id: Uuid) -> Result<Option<Showtime>>;
    /// First showtime in `room_id` whose interval overlaps `[start, end)`.
    async fn find_overlapping_showtime(
        &self,
        room_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<Showtime>>;
    async fn count_room_showtimes(&self, room_id: Uuid) -> Result<usize>;
    async fn insert_showtime(&self, showtime: &Showtime) -> Result<()>;
    async fn delete_showtime(&self, id: Uuid) -> Result<u64>;
    async fn list_ended_showtimes(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Atomic: all entries are inserted or none.
    async fn insert_showtime_seats(&self, seats: &[ShowtimeSeat]) -> Result<()>;
    async fn list_showtime_seats(&self, showtime_id: Uuid) -> Result<Vec<ShowtimeSeat>>;
    async fn find_showtime_seats(&self, showtime_id: Uuid, ids: &[Uuid])
        -> Result<Vec<ShowtimeSeat>>;
    /// Unconditional status write. `available` also clears the holder.
    async fn set_seat_status(
        &self,
        showtime_id: Uuid,
        seat_id: Uuid,
        status: SeatStatus,
    ) -> Result<u64>;
    async fn delete_showtime_seats(&self, showtime_id: Uuid) -> Result<u64>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    /// Seats that were not `available`; nothing was written.
    Unavailable(Vec<Uuid>),
}

#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    Confirmed(Booking),
    NotFound,
    NotPending(Booking),
    /// The conditional update matched fewer rows than the booking holds;
    /// the unit was rolled back.
    SeatConflict { expected: usize, claimed: u64 },
}

#[derive(Debug, Clone)]
pub enum ReleaseOutcome {
    Released {
        booking: Booking,
        seats_released: u64,
        /// Unclaimed pending payments of the booking marked failed.
        payments_failed: u64,
    },
    NotFound,
    NotPending(Booking),
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Atomic: flips every seat of the booking `available -> reserved` with
    /// the booking as holder and inserts the pending booking. If any seat is
    /// not available nothing is written.
    async fn reserve_and_insert(&self, booking: &Booking) -> Result<ReserveOutcome>;

    async fn find_booking(&self, id: Uuid) -> Result<Option<Booking>>;
    async fn list_user_bookings(&self, user_id: Uuid) -> Result<Vec<Booking>>;
    async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Booking>>;

    /// Atomic: requires the booking to be pending, sets its seats to `booked`
    /// where they are `reserved` by this booking or `available`, checks the
    /// matched count and marks the booking confirmed.
    async fn confirm(&self, id: Uuid, now: DateTime<Utc>) -> Result<ConfirmOutcome>;

    /// Atomic: pending booking becomes cancelled, the seats it reserved
    /// return to `available` and its unclaimed pending payments fail.
    async fn release(&self, id: Uuid, now: DateTime<Utc>) -> Result<ReleaseOutcome>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;
    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_payment_by_order(&self, order_id: &str) -> Result<Option<Payment>>;
    /// Records the gateway order id on a pending payment.
    async fn attach_order(&self, id: Uuid, order_id: &str, now: DateTime<Utc>) -> Result<bool>;
    /// `pending -> failed` for a payment no capture has claimed.
    async fn fail_payment(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool>;
    /// Claims a pending, unclaimed payment for capture. `false` means another
    /// caller holds the claim or the payment is no longer pending.
    async fn claim_capture(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool>;
    /// Settles a claimed payment as `completed` or `failed`. Writes nothing
    /// unless the payment is still pending and claimed.
    async fn settle_capture(
        &self,
        id: Uuid,
        status: PaymentStatus,
        capture_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool>;
    /// Marks every unclaimed pending payment of the booking failed.
    async fn fail_pending_payments(&self, booking_id: Uuid, now: DateTime<Utc>) -> Result<u64>;
    async fn list_booking_payments(&self, booking_id: Uuid) -> Result<Vec<Payment>>;
    async fn insert_reconciliation(&self, item: &PaymentReconciliation) -> Result<()>;
    async fn list_open_reconciliations(&self) -> Result<Vec<PaymentReconciliation>>;
}

pub trait Store:
    CatalogRepository
    + SeatRepository
    + ShowtimeRepository
    + LedgerRepository
    + BookingRepository
    + PaymentRepository
{
}

impl<T> Store for T where
    T: CatalogRepository
        + SeatRepository
        + ShowtimeRepository
        + LedgerRepository
        + BookingRepository
        + PaymentRepository
{
}
