//! Postgres implementation of the repository traits.
//!
//! Queries are built at runtime with `sqlx::query_as`. Status columns are
//! plain text guarded by CHECK constraints and parsed back into the model
//! enums. Multi-row units run in one transaction, and the claims are
//! conditional updates whose row count decides the outcome.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{
    BookingRepository, CatalogRepository, ConfirmOutcome, LedgerRepository, PaymentRepository,
    ReleaseOutcome, ReserveOutcome, SeatRepository, ShowtimeRepository,
};
use crate::error::{BookingError, Result};
use crate::models::{
    Booking, Cinema, Movie, Payment, PaymentMethod, PaymentReconciliation, PaymentStatus, Room,
    SeatStatus, SeatTemplate, Showtime, ShowtimeSeat,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse<T: FromStr<Err = String>>(value: &str) -> Result<T> {
    value.parse().map_err(BookingError::Internal)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

// Postgres exclusion_violation, raised by the showtime overlap constraint
fn is_exclusion_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23P01"),
        _ => false,
    }
}

// --- Row types ---
// One struct per table, mirroring its columns; converted into the models below.

#[derive(FromRow)]
struct MovieRow {
    id: i64,
    title: String,
    status: String,
}

/// `seat_templates`; `row_label` and `col_number` avoid SQL keywords.
#[derive(FromRow)]
struct SeatRow {
    id: Uuid,
    room_id: Uuid,
    seat_number: String,
    row_label: String,
    col_number: i32,
    seat_type: String,
}

impl SeatRow {
    fn into_model(self) -> Result<SeatTemplate> {
        Ok(SeatTemplate {
            id: self.id,
            room_id: self.room_id,
            seat_number: self.seat_number,
            row: self.row_label,
            column: self.col_number,
            seat_type: parse(&self.seat_type)?,
        })
    }
}

#[derive(FromRow)]
struct ShowtimeRow {
    id: Uuid,
    movie_id: i64,
    room_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    price: i64,
}

impl From<ShowtimeRow> for Showtime {
    fn from(r: ShowtimeRow) -> Self {
        Showtime {
            id: r.id,
            movie_id: r.movie_id,
            room_id: r.room_id,
            start_time: r.start_time,
            end_time: r.end_time,
            price: r.price,
        }
    }
}

/// `showtime_seats`, one per seat template per showtime.
#[derive(FromRow)]
struct LedgerRow {
    id: Uuid,
    showtime_id: Uuid,
    seat_id: Uuid,
    seat_number: String,
    status: String,
    /// Holder while `reserved`, owner once `booked`.
    booking_id: Option<Uuid>,
}

impl LedgerRow {
    fn into_model(self) -> Result<ShowtimeSeat> {
        Ok(ShowtimeSeat {
            id: self.id,
            showtime_id: self.showtime_id,
            seat_id: self.seat_id,
            seat_number: self.seat_number,
            status: parse(&self.status)?,
            booking_id: self.booking_id,
        })
    }
}

/// `bookings`; `seat_ids` is a `UUID[]` column.
#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Option<Uuid>,
    movie_id: i64,
    showtime_id: Uuid,
    seat_ids: Vec<Uuid>,
    total_price: i64,
    status: String,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_model(self) -> Result<Booking> {
        Ok(Booking {
            id: self.id,
            user_id: self.user_id,
            movie_id: self.movie_id,
            showtime_id: self.showtime_id,
            seat_ids: self.seat_ids,
            total_price: self.total_price,
            status: parse(&self.status)?,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// `payments`. Only `paypal` is accepted as `payment_method`.
#[derive(FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    user_id: Option<Uuid>,
    amount_cents: i64,
    currency: String,
    status: String,
    payment_method: String,
    transaction_id: Option<String>,
    capture_id: Option<String>,
    /// Capture claim; see `claim_capture`.
    capture_started_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_model(self) -> Result<Payment> {
        if self.payment_method != PaymentMethod::Paypal.as_str() {
            return Err(BookingError::Internal(format!(
                "unsupported payment method {:?}",
                self.payment_method
            )));
        }
        Ok(Payment {
            id: self.id,
            booking_id: self.booking_id,
            user_id: self.user_id,
            amount_cents: self.amount_cents,
            currency: self.currency,
            status: parse(&self.status)?,
            payment_method: PaymentMethod::Paypal,
            transaction_id: self.transaction_id,
            capture_id: self.capture_id,
            capture_started_at: self.capture_started_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ReconciliationRow {
    id: Uuid,
    payment_id: Uuid,
    booking_id: Uuid,
    order_id: String,
    capture_id: Option<String>,
    reason: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

const BOOKING_COLUMNS: &str = "id, user_id, movie_id, showtime_id, seat_ids, total_price, \
                               status, expires_at, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, booking_id, user_id, amount_cents, currency, status, \
                               payment_method, transaction_id, capture_id, capture_started_at, \
                               created_at, updated_at";

#[async_trait]
impl CatalogRepository for PgStore {
    async fn find_movie(&self, id: i64) -> Result<Option<Movie>> {
        let row = sqlx::query_as::<_, MovieRow>("SELECT id, title, status FROM movies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            Ok(Movie {
                id: r.id,
                title: r.title,
                status: parse(&r.status)?,
            })
        })
        .transpose()
    }

    async fn find_cinema(&self, id: Uuid) -> Result<Option<Cinema>> {
        let row: Option<(Uuid, String, String)> =
            sqlx::query_as("SELECT id, name, address FROM cinemas WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, name, address)| Cinema { id, name, address }))
    }

    async fn find_room(&self, id: Uuid) -> Result<Option<Room>> {
        let row: Option<(Uuid, Uuid, i32)> =
            sqlx::query_as("SELECT id, cinema_id, room_number FROM rooms WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, cinema_id, room_number)| Room {
            id,
            cinema_id,
            room_number,
        }))
    }

    async fn insert_room(&self, room: &Room) -> Result<()> {
        sqlx::query("INSERT INTO rooms (id, cinema_id, room_number) VALUES ($1, $2, $3)")
            .bind(room.id)
            .bind(room.cinema_id)
            .bind(room.room_number)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    BookingError::InvalidArgument(format!(
                        "room number {} already exists in cinema {}",
                        room.room_number, room.cinema_id
                    ))
                } else {
                    e.into()
                }
            })?;
        Ok(())
    }

    async fn delete_room(&self, id: Uuid) -> Result<u64> {
        let res = sqlx::query("DELETE FROM rooms WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl SeatRepository for PgStore {
    async fn count_room_seats(&self, room_id: Uuid) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM seat_templates WHERE room_id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn list_room_seats(&self, room_id: Uuid) -> Result<Vec<SeatTemplate>> {
        sqlx::query_as::<_, SeatRow>(
            "SELECT id, room_id, seat_number, row_label, col_number, seat_type
             FROM seat_templates
             WHERE room_id = $1
             ORDER BY row_label, col_number",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(SeatRow::into_model)
        .collect()
    }

    async fn insert_room_seats(&self, seats: &[SeatTemplate]) -> Result<()> {
        let Some(first) = seats.first() else {
            return Ok(());
        };
        let room_id = first.room_id;

        let ids: Vec<Uuid> = seats.iter().map(|s| s.id).collect();
        let rooms: Vec<Uuid> = seats.iter().map(|s| s.room_id).collect();
        let numbers: Vec<String> = seats.iter().map(|s| s.seat_number.clone()).collect();
        let rows: Vec<String> = seats.iter().map(|s| s.row.clone()).collect();
        let columns: Vec<i32> = seats.iter().map(|s| s.column).collect();
        let types: Vec<String> = seats.iter().map(|s| s.seat_type.as_str().to_string()).collect();

        // Single statement: either every seat lands or none does
        sqlx::query(
            "INSERT INTO seat_templates (id, room_id, seat_number, row_label, col_number, seat_type)
             SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::text[], $4::text[], $5::int4[], $6::text[])",
        )
        .bind(&ids)
        .bind(&rooms)
        .bind(&numbers)
        .bind(&rows)
        .bind(&columns)
        .bind(&types)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BookingError::AlreadyInitialized { room_id }
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn delete_room_seats(&self, room_id: Uuid) -> Result<u64> {
        let res = sqlx::query("DELETE FROM seat_templates WHERE room_id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl ShowtimeRepository for PgStore {
    async fn find_showtime(&self, id: Uuid) -> Result<Option<Showtime>> {
        let row = sqlx::query_as::<_, ShowtimeRow>(
            "SELECT id, movie_id, room_id, start_time, end_time, price FROM showtimes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Showtime::from))
    }

    async fn find_overlapping_showtime(
        &self,
        room_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<Showtime>> {
        let row = sqlx::query_as::<_, ShowtimeRow>(
            r#"
            SELECT id, movie_id, room_id, start_time, end_time, price
            FROM showtimes
            WHERE room_id = $1
              AND (
                   ($2 >= start_time AND $2 < end_time)
                OR ($3 > start_time AND $3 <= end_time)
                OR ($2 <= start_time AND $3 >= end_time)
              )
            ORDER BY start_time
            LIMIT 1
            "#,
        )
        .bind(room_id)
        .bind(start)
        .bind(end)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Showtime::from))
    }

    async fn count_room_showtimes(&self, room_id: Uuid) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM showtimes WHERE room_id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn insert_showtime(&self, showtime: &Showtime) -> Result<()> {
        let inserted = sqlx::query(
            "INSERT INTO showtimes (id, movie_id, room_id, start_time, end_time, price)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(showtime.id)
        .bind(showtime.movie_id)
        .bind(showtime.room_id)
        .bind(showtime.start_time)
        .bind(showtime.end_time)
        .bind(showtime.price)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            // A concurrent insert slipped past the overlap query
            Err(e) if is_exclusion_violation(&e) => {
                let existing = self
                    .find_overlapping_showtime(
                        showtime.room_id,
                        showtime.start_time,
                        showtime.end_time,
                    )
                    .await?
                    .ok_or(e)?;
                Err(BookingError::ShowtimeOverlap {
                    room_id: showtime.room_id,
                    existing: existing.id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_showtime(&self, id: Uuid) -> Result<u64> {
        let res = sqlx::query("DELETE FROM showtimes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn list_ended_showtimes(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT s.id FROM showtimes s
             WHERE s.end_time <= $1
               AND EXISTS (SELECT 1 FROM showtime_seats ss WHERE ss.showtime_id = s.id)",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl LedgerRepository for PgStore {
    async fn insert_showtime_seats(&self, seats: &[ShowtimeSeat]) -> Result<()> {
        if seats.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = seats.iter().map(|s| s.id).collect();
        let showtimes: Vec<Uuid> = seats.iter().map(|s| s.showtime_id).collect();
        let seat_ids: Vec<Uuid> = seats.iter().map(|s| s.seat_id).collect();
        let numbers: Vec<String> = seats.iter().map(|s| s.seat_number.clone()).collect();
        let statuses: Vec<String> = seats.iter().map(|s| s.status.as_str().to_string()).collect();

        sqlx::query(
            "INSERT INTO showtime_seats (id, showtime_id, seat_id, seat_number, status)
             SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[], $4::text[], $5::text[])",
        )
        .bind(&ids)
        .bind(&showtimes)
        .bind(&seat_ids)
        .bind(&numbers)
        .bind(&statuses)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_showtime_seats(&self, showtime_id: Uuid) -> Result<Vec<ShowtimeSeat>> {
        sqlx::query_as::<_, LedgerRow>(
            "SELECT ss.id, ss.showtime_id, ss.seat_id, ss.seat_number, ss.status, ss.booking_id
             FROM showtime_seats ss
             JOIN seat_templates st ON st.id = ss.seat_id
             WHERE ss.showtime_id = $1
             ORDER BY st.row_label, st.col_number",
        )
        .bind(showtime_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(LedgerRow::into_model)
        .collect()
    }

    async fn find_showtime_seats(
        &self,
        showtime_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<ShowtimeSeat>> {
        sqlx::query_as::<_, LedgerRow>(
            "SELECT id, showtime_id, seat_id, seat_number, status, booking_id
             FROM showtime_seats
             WHERE showtime_id = $1 AND id = ANY($2)",
        )
        .bind(showtime_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(LedgerRow::into_model)
        .collect()
    }

    async fn set_seat_status(
        &self,
        showtime_id: Uuid,
        seat_id: Uuid,
        status: SeatStatus,
    ) -> Result<u64> {
        let res = sqlx::query(
            "UPDATE showtime_seats
             SET status = $3,
                 booking_id = CASE WHEN $3 = 'available' THEN NULL ELSE booking_id END,
                 updated_at = NOW()
             WHERE showtime_id = $1 AND id = $2",
        )
        .bind(showtime_id)
        .bind(seat_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    async fn delete_showtime_seats(&self, showtime_id: Uuid) -> Result<u64> {
        let res = sqlx::query("DELETE FROM showtime_seats WHERE showtime_id = $1")
            .bind(showtime_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl BookingRepository for PgStore {
    async fn reserve_and_insert(&self, booking: &Booking) -> Result<ReserveOutcome> {
        let mut tx = self.pool.begin().await?;

        // Conditional claim: only rows still available are flipped
        let claimed: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE showtime_seats
            SET status = 'reserved', booking_id = $1, updated_at = NOW()
            WHERE showtime_id = $2 AND id = ANY($3) AND status = 'available'
            RETURNING id
            "#,
        )
        .bind(booking.id)
        .bind(booking.showtime_id)
        .bind(&booking.seat_ids)
        .fetch_all(&mut *tx)
        .await?;

        if claimed.len() != booking.seat_ids.len() {
            tx.rollback().await?;
            let claimed: HashSet<Uuid> = claimed.into_iter().collect();
            let unavailable = booking
                .seat_ids
                .iter()
                .filter(|id| !claimed.contains(*id))
                .copied()
                .collect();
            return Ok(ReserveOutcome::Unavailable(unavailable));
        }

        sqlx::query(
            "INSERT INTO bookings
                (id, user_id, movie_id, showtime_id, seat_ids, total_price, status, expires_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.movie_id)
        .bind(booking.showtime_id)
        .bind(&booking.seat_ids)
        .bind(booking.total_price)
        .bind(booking.status.as_str())
        .bind(booking.expires_at)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ReserveOutcome::Reserved)
    }

    async fn find_booking(&self, id: Uuid) -> Result<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(BookingRow::into_model).transpose()
    }

    async fn list_user_bookings(&self, user_id: Uuid) -> Result<Vec<Booking>> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(BookingRow::into_model)
        .collect()
    }

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at <= $1
             ORDER BY expires_at"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(BookingRow::into_model)
        .collect()
    }

    async fn confirm(&self, id: Uuid, now: DateTime<Utc>) -> Result<ConfirmOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let booking = match row {
            Some(row) => row.into_model()?,
            None => return Ok(ConfirmOutcome::NotFound),
        };
        if !booking.is_pending() {
            return Ok(ConfirmOutcome::NotPending(booking));
        }

        let claimed = sqlx::query(
            r#"
            UPDATE showtime_seats
            SET status = 'booked', booking_id = $1, updated_at = NOW()
            WHERE showtime_id = $2
              AND id = ANY($3)
              AND (status = 'available' OR (status = 'reserved' AND booking_id = $1))
            "#,
        )
        .bind(booking.id)
        .bind(booking.showtime_id)
        .bind(&booking.seat_ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed != booking.seat_ids.len() as u64 {
            tx.rollback().await?;
            return Ok(ConfirmOutcome::SeatConflict {
                expected: booking.seat_ids.len(),
                claimed,
            });
        }

        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings
             SET status = 'confirmed', expires_at = NULL, updated_at = $2
             WHERE id = $1
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ConfirmOutcome::Confirmed(row.into_model()?))
    }

    async fn release(&self, id: Uuid, now: DateTime<Utc>) -> Result<ReleaseOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let booking = match row {
            Some(row) => row.into_model()?,
            None => return Ok(ReleaseOutcome::NotFound),
        };
        if !booking.is_pending() {
            return Ok(ReleaseOutcome::NotPending(booking));
        }

        let seats_released = sqlx::query(
            "UPDATE showtime_seats
             SET status = 'available', booking_id = NULL, updated_at = NOW()
             WHERE booking_id = $1 AND status = 'reserved'",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // A claimed payment is left to its capture, which sees the cancelled booking
        let payments_failed = sqlx::query(
            "UPDATE payments SET status = 'failed', updated_at = $2
             WHERE booking_id = $1 AND status = 'pending' AND capture_started_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings
             SET status = 'cancelled', expires_at = NULL, updated_at = $2
             WHERE id = $1
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ReleaseOutcome::Released {
            booking: row.into_model()?,
            seats_released,
            payments_failed,
        })
    }
}

#[async_trait]
impl PaymentRepository for PgStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            "INSERT INTO payments
                (id, booking_id, user_id, amount_cents, currency, status, payment_method,
                 transaction_id, capture_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(payment.id)
        .bind(payment.booking_id)
        .bind(payment.user_id)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.payment_method.as_str())
        .bind(&payment.transaction_id)
        .bind(&payment.capture_id)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentRow::into_model).transpose()
    }

    async fn find_payment_by_order(&self, order_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentRow::into_model).transpose()
    }

    async fn attach_order(&self, id: Uuid, order_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE payments SET transaction_id = $2, updated_at = $3
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(order_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn fail_payment(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE payments SET status = 'failed', updated_at = $2
             WHERE id = $1 AND status = 'pending' AND capture_started_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn claim_capture(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        // Same compare-and-swap as the ledger claims: one caller wins the row
        let res = sqlx::query(
            "UPDATE payments SET capture_started_at = $2, updated_at = $2
             WHERE id = $1 AND status = 'pending' AND capture_started_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn settle_capture(
        &self,
        id: Uuid,
        status: PaymentStatus,
        capture_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE payments SET status = $2, capture_id = $3, updated_at = $4
             WHERE id = $1 AND status = 'pending' AND capture_started_at IS NOT NULL",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(capture_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn fail_pending_payments(&self, booking_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let res = sqlx::query(
            "UPDATE payments SET status = 'failed', updated_at = $2
             WHERE booking_id = $1 AND status = 'pending' AND capture_started_at IS NULL",
        )
        .bind(booking_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    async fn list_booking_payments(&self, booking_id: Uuid) -> Result<Vec<Payment>> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE booking_id = $1 ORDER BY created_at"
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PaymentRow::into_model)
        .collect()
    }

    async fn insert_reconciliation(&self, item: &PaymentReconciliation) -> Result<()> {
        sqlx::query(
            "INSERT INTO payment_reconciliations
                (id, payment_id, booking_id, order_id, capture_id, reason, created_at, resolved_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(item.id)
        .bind(item.payment_id)
        .bind(item.booking_id)
        .bind(&item.order_id)
        .bind(&item.capture_id)
        .bind(&item.reason)
        .bind(item.created_at)
        .bind(item.resolved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_open_reconciliations(&self) -> Result<Vec<PaymentReconciliation>> {
        let rows = sqlx::query_as::<_, ReconciliationRow>(
            "SELECT id, payment_id, booking_id, order_id, capture_id, reason, created_at, resolved_at
             FROM payment_reconciliations
             WHERE resolved_at IS NULL
             ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PaymentReconciliation {
                id: r.id,
                payment_id: r.payment_id,
                booking_id: r.booking_id,
                order_id: r.order_id,
                capture_id: r.capture_id,
                reason: r.reason,
                created_at: r.created_at,
                resolved_at: r.resolved_at,
            })
            .collect())
    }
}
