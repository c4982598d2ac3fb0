use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use super::booking::BookingOrchestrator;
use super::ledger::ShowtimeSeatLedger;
use crate::cache::CacheService;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub bookings_expired: usize,
    pub seats_released: u64,
    pub payments_failed: u64,
    pub showtimes_cleared: usize,
    pub ledger_entries_removed: u64,
    pub failed_passes: usize,
}

/// Periodic housekeeping in two passes: cancel lapsed pending bookings and
/// release their seats, then tear down ledgers of ended showtimes.
#[derive(Clone)]
pub struct ExpirySweeper {
    bookings: BookingOrchestrator,
    ledger: ShowtimeSeatLedger,
    cache: Option<CacheService>,
}

impl ExpirySweeper {
    pub fn new(
        bookings: BookingOrchestrator,
        ledger: ShowtimeSeatLedger,
        cache: Option<CacheService>,
    ) -> Self {
        Self {
            bookings,
            ledger,
            cache,
        }
    }

    pub async fn run(&self) -> SweepReport {
        self.run_at(Utc::now()).await
    }

    /// One sweep as of `now`. A failing pass is logged and does not stop
    /// the other one.
    pub async fn run_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let mut touched = BTreeSet::<Uuid>::new();

        match self.bookings.expire_pending_bookings(now).await {
            Ok(expired) => {
                report.bookings_expired = expired.bookings.len();
                report.seats_released = expired.seats_released;
                report.payments_failed = expired.payments_failed;
                touched.extend(expired.bookings.iter().map(|b| b.showtime_id));
            }
            Err(e) => {
                error!(error = %e, "Expiring pending bookings failed");
                report.failed_passes += 1;
            }
        }

        match self.ledger.clean_up_expired_showtimes_at(now).await {
            Ok(cleanup) => {
                report.showtimes_cleared = cleanup.showtime_ids.len();
                report.ledger_entries_removed = cleanup.entries_removed;
                touched.extend(cleanup.showtime_ids);
            }
            Err(e) => {
                error!(error = %e, "Ledger teardown of ended showtimes failed");
                report.failed_passes += 1;
            }
        }

        if let Some(cache) = &self.cache {
            join_all(touched.iter().map(|id| cache.invalidate_seats(*id))).await;
        }

        if report.bookings_expired > 0 || report.showtimes_cleared > 0 {
            info!(
                bookings_expired = report.bookings_expired,
                seats_released = report.seats_released,
                payments_failed = report.payments_failed,
                showtimes_cleared = report.showtimes_cleared,
                "Sweep completed"
            );
        }
        report
    }

    /// Runs the sweep every `interval` on the tokio runtime.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run().await;
            }
        })
    }
}
