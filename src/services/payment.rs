//! Payment lifecycle against the external gateway.
//!
//! A payment is created `pending` for a pending booking, sized in the
//! gateway currency from the booking total. Capturing it at the gateway
//! completes the payment and confirms the booking. If the booking cannot be
//! confirmed after the money moved, the payment stays `completed` and a
//! reconciliation row is queued for an operator.
//!
//! A capture first claims the payment with a conditional write, so only one
//! caller ever reaches the gateway for a given order, and only that caller
//! settles the payment.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::booking::BookingOrchestrator;
use super::gateway::{OrderRequest, PaymentGateway};
use crate::config::PaymentConfig;
use crate::error::{parse_id, BookingError, Result};
use crate::models::{Payment, PaymentMethod, PaymentReconciliation, PaymentStatus};
use crate::repository::Store;

/// Converts a local-currency total into gateway minor units:
/// `round(total / fx_rate, 2)` expressed in cents.
pub fn to_minor_units(total_price: i64, fx_rate: f64) -> i64 {
    (total_price as f64 / fx_rate * 100.0).round() as i64
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiation {
    pub payment_id: Uuid,
    pub gateway_order_id: String,
    pub approve_url: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub fx_rate: f64,
    pub return_url: String,
    pub cancel_url: String,
}

impl From<&PaymentConfig> for CheckoutSettings {
    fn from(cfg: &PaymentConfig) -> Self {
        Self {
            currency: cfg.currency.clone(),
            fx_rate: cfg.fx_rate,
            return_url: cfg.return_url.clone(),
            cancel_url: cfg.cancel_url.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    bookings: BookingOrchestrator,
    settings: CheckoutSettings,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        bookings: BookingOrchestrator,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            bookings,
            settings,
        }
    }

    pub async fn create_payment(
        &self,
        booking_id: &str,
        user_id: Option<Uuid>,
    ) -> Result<PaymentInitiation> {
        let booking_id = parse_id("booking_id", booking_id)?;
        let booking = self.bookings.find_booking(booking_id).await?;
        if !booking.is_pending() {
            return Err(BookingError::InvalidState {
                entity: "booking",
                id: booking_id,
                expected: "pending",
                actual: booking.status.to_string(),
            });
        }
        if booking.total_price <= 0 {
            return Err(BookingError::InvalidArgument(
                "booking total must be positive to pay".into(),
            ));
        }

        let amount_cents = to_minor_units(booking.total_price, self.settings.fx_rate);
        if amount_cents <= 0 {
            return Err(BookingError::InvalidArgument(format!(
                "booking total {} is below the smallest {} amount",
                booking.total_price, self.settings.currency
            )));
        }

        let payments = self.store.list_booking_payments(booking_id).await?;
        if let Some(in_flight) = payments.iter().find(|p| p.is_capturing()) {
            return Err(BookingError::InvalidState {
                entity: "payment",
                id: in_flight.id,
                expected: "no capture in progress",
                actual: "capturing".into(),
            });
        }

        let now = Utc::now();
        let superseded = self.store.fail_pending_payments(booking_id, now).await?;
        if superseded > 0 {
            info!(%booking_id, superseded, "Earlier pending payments superseded");
        }

        let payment = Payment {
            id: Uuid::new_v4(),
            booking_id,
            user_id: user_id.or(booking.user_id),
            amount_cents,
            currency: self.settings.currency.clone(),
            status: PaymentStatus::Pending,
            payment_method: PaymentMethod::Paypal,
            transaction_id: None,
            capture_id: None,
            capture_started_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_payment(&payment).await?;

        let order = OrderRequest {
            reference_id: booking_id.to_string(),
            amount_cents,
            currency: payment.currency.clone(),
            description: format!("{} cinema seat(s)", booking.seat_ids.len()),
            return_url: self.settings.return_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
        };

        let created = match self.gateway.create_order(&order).await {
            Ok(created) => created,
            Err(e) => {
                self.store.fail_payment(payment.id, Utc::now()).await?;
                error!(payment_id = %payment.id, %booking_id, error = %e, "Gateway order creation failed");
                return Err(e);
            }
        };

        if !self
            .store
            .attach_order(payment.id, &created.id, Utc::now())
            .await?
        {
            // Released or superseded while the order was being created
            return Err(self.payment_not_pending(payment.id).await);
        }
        let Some(approve_url) = created.approve_url else {
            self.store.fail_payment(payment.id, Utc::now()).await?;
            return Err(BookingError::Gateway(format!(
                "order {} has no approval link",
                created.id
            )));
        };

        info!(
            payment_id = %payment.id,
            %booking_id,
            order_id = %created.id,
            amount_cents,
            "Payment created"
        );
        Ok(PaymentInitiation {
            payment_id: payment.id,
            gateway_order_id: created.id,
            approve_url,
        })
    }

    /// Explicit client capture: the order must belong to the booking.
    pub async fn capture_payment(&self, booking_id: &str, order_id: &str) -> Result<Payment> {
        let booking_id = parse_id("booking_id", booking_id)?;
        let payment = self.payment_for_order(order_id).await?;
        if payment.booking_id != booking_id {
            return Err(BookingError::not_found("payment for order", order_id));
        }
        self.capture(payment).await
    }

    /// Gateway redirect capture: the `token` is the order id.
    pub async fn capture_payment_by_order_id(&self, order_id: &str) -> Result<Payment> {
        let payment = self.payment_for_order(order_id).await?;
        self.capture(payment).await
    }

    /// The buyer abandoned checkout at the gateway. Booking and seats are
    /// left alone so payment can be retried until the hold expires.
    /// A payment whose capture is already in flight is returned unchanged.
    pub async fn cancel_payment_by_order_id(&self, order_id: &str) -> Result<Payment> {
        let payment = self.payment_for_order(order_id).await?;
        if !self.store.fail_payment(payment.id, Utc::now()).await? {
            return Ok(payment);
        }
        info!(payment_id = %payment.id, order_id, "Payment cancelled by buyer");
        self.reload(payment.id).await
    }

    pub async fn payments_for_booking(&self, booking_id: &str) -> Result<Vec<Payment>> {
        let booking_id = parse_id("booking_id", booking_id)?;
        self.store.list_booking_payments(booking_id).await
    }

    pub async fn open_reconciliations(&self) -> Result<Vec<PaymentReconciliation>> {
        self.store.list_open_reconciliations().await
    }

    async fn payment_for_order(&self, order_id: &str) -> Result<Payment> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(BookingError::InvalidArgument("order id is required".into()));
        }
        self.store
            .find_payment_by_order(order_id)
            .await?
            .ok_or_else(|| BookingError::not_found("payment for order", order_id))
    }

    async fn reload(&self, payment_id: Uuid) -> Result<Payment> {
        self.store
            .find_payment(payment_id)
            .await?
            .ok_or_else(|| BookingError::not_found("payment", payment_id))
    }

    async fn payment_not_pending(&self, payment_id: Uuid) -> BookingError {
        let actual = match self.store.find_payment(payment_id).await {
            Ok(Some(p)) if p.is_capturing() => "capturing".to_string(),
            Ok(Some(p)) => p.status.to_string(),
            Ok(None) => return BookingError::not_found("payment", payment_id),
            Err(e) => return e,
        };
        BookingError::InvalidState {
            entity: "payment",
            id: payment_id,
            expected: "pending",
            actual,
        }
    }

    /// Settles the claimed payment as failed.
    async fn settle_failed(&self, payment_id: Uuid) -> Result<()> {
        self.store
            .settle_capture(payment_id, PaymentStatus::Failed, None, Utc::now())
            .await?;
        Ok(())
    }

    async fn capture(&self, payment: Payment) -> Result<Payment> {
        if !self.store.claim_capture(payment.id, Utc::now()).await? {
            return Err(self.payment_not_pending(payment.id).await);
        }
        let order_id = payment.transaction_id.clone().unwrap_or_default();

        // Never charge for seats the booking no longer holds
        let booking = match self.bookings.find_booking(payment.booking_id).await {
            Ok(booking) => booking,
            Err(e) => {
                self.settle_failed(payment.id).await?;
                return Err(e);
            }
        };
        if !booking.is_pending() {
            self.settle_failed(payment.id).await?;
            warn!(
                payment_id = %payment.id,
                booking_id = %booking.id,
                status = %booking.status,
                "Capture refused, booking is no longer pending"
            );
            return Err(BookingError::InvalidState {
                entity: "booking",
                id: booking.id,
                expected: "pending",
                actual: booking.status.to_string(),
            });
        }

        let captured = match self.gateway.capture_order(&order_id).await {
            Ok(captured) => captured,
            Err(e) => {
                self.settle_failed(payment.id).await?;
                error!(payment_id = %payment.id, %order_id, error = %e, "Gateway capture failed");
                return Err(e);
            }
        };
        if !captured.is_completed() {
            self.settle_failed(payment.id).await?;
            warn!(payment_id = %payment.id, %order_id, status = %captured.status, "Capture not completed");
            return Err(BookingError::PaymentIncomplete {
                order_id,
                status: captured.status,
            });
        }

        let settled = self
            .store
            .settle_capture(
                payment.id,
                PaymentStatus::Completed,
                captured.capture_id.as_deref(),
                Utc::now(),
            )
            .await?;
        if !settled {
            // Only the claimant settles, so the row was changed out of band
            let reason = "payment changed while its capture was in flight".to_string();
            self.queue_reconciliation(&payment, &order_id, captured.capture_id, &reason)
                .await?;
            return Err(BookingError::PaymentSucceededBookingFailed {
                payment_id: payment.id,
                booking_id: payment.booking_id,
                reason,
            });
        }
        info!(payment_id = %payment.id, %order_id, "Payment captured");
        let payment = self.reload(payment.id).await?;

        if let Err(e) = self.bookings.confirm_booking(payment.booking_id).await {
            let reason = e.to_string();
            self.queue_reconciliation(&payment, &order_id, payment.capture_id.clone(), &reason)
                .await?;
            return Err(BookingError::PaymentSucceededBookingFailed {
                payment_id: payment.id,
                booking_id: payment.booking_id,
                reason,
            });
        }

        Ok(payment)
    }

    async fn queue_reconciliation(
        &self,
        payment: &Payment,
        order_id: &str,
        capture_id: Option<String>,
        reason: &str,
    ) -> Result<()> {
        let item = PaymentReconciliation {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            booking_id: payment.booking_id,
            order_id: order_id.to_string(),
            capture_id,
            reason: reason.to_string(),
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.store.insert_reconciliation(&item).await?;
        error!(
            payment_id = %payment.id,
            booking_id = %payment.booking_id,
            order_id,
            reason,
            "Payment captured but booking not confirmed, queued for reconciliation"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_at_the_configured_rate() {
        // 200 000 local units at 25 000 per dollar
        assert_eq!(to_minor_units(200_000, 25_000.0), 800);
        assert_eq!(to_minor_units(100_000, 25_000.0), 400);
    }

    #[test]
    fn rounds_to_the_nearest_cent() {
        // 12 345 / 25 000 = 0.4938 -> 0.49
        assert_eq!(to_minor_units(12_345, 25_000.0), 49);
        // 12 490 / 25 000 = 0.4996 -> 0.50
        assert_eq!(to_minor_units(12_490, 25_000.0), 50);
    }
}
