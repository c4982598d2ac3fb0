//! Payments against the external gateway and the operator queue for
//! captures that could not be matched to confirmed seats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Created, possibly with a gateway order, not yet captured.
    Pending,
    /// Captured at the gateway. Terminal.
    Completed,
    /// Gateway rejected, buyer cancelled, superseded or released. Terminal.
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status {other:?}")),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only supported gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Paypal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Paypal => "paypal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: Option<Uuid>,
    /// Amount in minor units of `currency`.
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    /// Gateway order id.
    pub transaction_id: Option<String>,
    /// Gateway capture id, set once the payment is completed.
    pub capture_id: Option<String>,
    /// Set when a capture claims the payment. A claimed payment is only
    /// settled by the claimant; nothing else may fail it.
    pub capture_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Pending with a capture call in flight at the gateway.
    pub fn is_capturing(&self) -> bool {
        self.status == PaymentStatus::Pending && self.capture_started_at.is_some()
    }
}

/// A captured payment whose booking could not be confirmed. Rows here are
/// worked by an operator (refund or manual seat assignment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReconciliation {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub order_id: String,
    pub capture_id: Option<String>,
    /// Error that kept the booking from being confirmed.
    pub reason: String,
    pub created_at: DateTime<Utc>,
    /// Open while `None`.
    pub resolved_at: Option<DateTime<Utc>>,
}
