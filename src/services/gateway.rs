//! External payment gateway: "create order" / "capture order".
//!
//! `PayPalClient` speaks the PayPal Orders v2 REST API. Every call goes
//! through the circuit breaker and is bounded by the client timeout; a
//! timeout counts as a failure.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::circuit_breaker::CircuitBreaker;
use crate::config::{CircuitBreakerConfig, PaymentConfig};
use crate::error::{BookingError, Result};

/// Gateway status of a fully captured order.
pub const ORDER_COMPLETED: &str = "COMPLETED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    /// Our booking id, echoed back by the gateway.
    pub reference_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub id: String,
    pub status: String,
    pub approve_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOrder {
    pub id: String,
    pub status: String,
    pub capture_id: Option<String>,
}

impl CapturedOrder {
    pub fn is_completed(&self) -> bool {
        self.status == ORDER_COMPLETED
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, order: &OrderRequest) -> Result<CreatedOrder>;
    async fn capture_order(&self, order_id: &str) -> Result<CapturedOrder>;
}

/// Formats minor units as a decimal string with two places, e.g. 800 -> "8.00".
pub fn format_amount(amount_cents: i64) -> String {
    let sign = if amount_cents < 0 { "-" } else { "" };
    let abs = amount_cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

// --- PayPal wire types ---

#[derive(Serialize)]
struct Money<'a> {
    currency_code: &'a str,
    value: String,
}

#[derive(Serialize)]
struct PurchaseUnit<'a> {
    reference_id: &'a str,
    description: &'a str,
    amount: Money<'a>,
}

#[derive(Serialize)]
struct ApplicationContext<'a> {
    return_url: &'a str,
    cancel_url: &'a str,
    user_action: &'static str,
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    intent: &'static str,
    purchase_units: Vec<PurchaseUnit<'a>>,
    application_context: ApplicationContext<'a>,
}

#[derive(Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Deserialize)]
struct CaptureResponse {
    id: String,
    status: String,
    #[serde(default)]
    purchase_units: Vec<CapturedUnit>,
}

#[derive(Deserialize)]
struct CapturedUnit {
    payments: Option<CapturedPayments>,
}

#[derive(Deserialize)]
struct CapturedPayments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Deserialize)]
struct Capture {
    id: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct PayPalClient {
    base_url: String,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
    token: tokio::sync::Mutex<Option<CachedToken>>,
}

impl PayPalClient {
    pub fn from_config(payment: &PaymentConfig, breaker: &CircuitBreakerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(payment.request_timeout_secs))
            .build()
            .map_err(|e| BookingError::Internal(format!("http client: {e}")))?;

        Ok(Self {
            base_url: payment.gateway_url.trim_end_matches('/').to_string(),
            client_id: payment.client_id.clone(),
            client_secret: payment.client_secret.clone(),
            http,
            breaker: Arc::new(CircuitBreaker::new(
                breaker.failure_threshold,
                Duration::from_secs(breaker.timeout_seconds),
            )),
            token: tokio::sync::Mutex::new(None),
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Runs one gateway call through the breaker.
    async fn guarded<T, F>(&self, call: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        if !self.breaker.can_execute() {
            warn!("Circuit breaker is OPEN, blocking payment gateway request");
            return Err(BookingError::CircuitOpen);
        }

        match call.await {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(e) => {
                warn!(error = %e, "Payment gateway request failed");
                self.breaker.record_failure();
                Err(e)
            }
        }
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(transport_error)?;
        let token: TokenResponse = read_json(response).await?;

        // Refresh a minute early
        let ttl = Duration::from_secs(token.expires_in.saturating_sub(60));
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(token.access_token)
    }

    async fn send_create(&self, order: &OrderRequest) -> Result<CreatedOrder> {
        let token = self.access_token().await?;
        let body = CreateOrderBody {
            intent: "CAPTURE",
            purchase_units: vec![PurchaseUnit {
                reference_id: &order.reference_id,
                description: &order.description,
                amount: Money {
                    currency_code: &order.currency,
                    value: format_amount(order.amount_cents),
                },
            }],
            application_context: ApplicationContext {
                return_url: &order.return_url,
                cancel_url: &order.cancel_url,
                user_action: "PAY_NOW",
            },
        };

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let order: OrderResponse = read_json(response).await?;

        let approve_url = order
            .links
            .into_iter()
            .find(|link| link.rel == "approve" || link.rel == "payer-action")
            .map(|link| link.href);

        Ok(CreatedOrder {
            id: order.id,
            status: order.status,
            approve_url,
        })
    }

    async fn send_capture(&self, order_id: &str) -> Result<CapturedOrder> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}/v2/checkout/orders/{order_id}/capture", self.base_url))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await
            .map_err(transport_error)?;
        let capture: CaptureResponse = read_json(response).await?;

        let capture_id = capture
            .purchase_units
            .into_iter()
            .filter_map(|unit| unit.payments)
            .flat_map(|payments| payments.captures)
            .map(|c| c.id)
            .next();

        Ok(CapturedOrder {
            id: capture.id,
            status: capture.status,
            capture_id,
        })
    }
}

fn transport_error(err: reqwest::Error) -> BookingError {
    if err.is_timeout() {
        BookingError::GatewayTimeout
    } else {
        BookingError::Gateway(err.to_string())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BookingError::Gateway(format!("HTTP {status}: {body}")));
    }
    response.json::<T>().await.map_err(transport_error)
}

#[async_trait]
impl PaymentGateway for PayPalClient {
    async fn create_order(&self, order: &OrderRequest) -> Result<CreatedOrder> {
        info!(
            reference_id = %order.reference_id,
            amount = %format_amount(order.amount_cents),
            currency = %order.currency,
            "Creating gateway order"
        );
        self.guarded(self.send_create(order)).await
    }

    async fn capture_order(&self, order_id: &str) -> Result<CapturedOrder> {
        info!(order_id, "Capturing gateway order");
        self.guarded(self.send_capture(order_id)).await
    }
}

#[derive(Default)]
struct InMemoryGatewayState {
    orders: HashMap<String, OrderRequest>,
    captured: Vec<String>,
    next_id: u32,
    create_failures: VecDeque<BookingError>,
    capture_status: Option<String>,
    capture_failure: Option<fn() -> BookingError>,
}

/// Scripted gateway for tests and local runs without PayPal credentials.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryGatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `create_order` call fail with `err`.
    pub fn fail_next_create(&self, err: BookingError) {
        self.lock().create_failures.push_back(err);
    }

    /// Status reported by subsequent captures (default `COMPLETED`).
    pub fn set_capture_status(&self, status: &str) {
        self.lock().capture_status = Some(status.to_string());
    }

    /// Makes every capture fail with the error `make` builds, until cleared.
    pub fn set_capture_failure(&self, make: Option<fn() -> BookingError>) {
        self.lock().capture_failure = make;
    }

    pub fn order(&self, order_id: &str) -> Option<OrderRequest> {
        self.lock().orders.get(order_id).cloned()
    }

    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    pub fn captured(&self) -> Vec<String> {
        self.lock().captured.clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn create_order(&self, order: &OrderRequest) -> Result<CreatedOrder> {
        let mut state = self.lock();
        if let Some(err) = state.create_failures.pop_front() {
            return Err(err);
        }

        state.next_id += 1;
        let id = format!("ORDER-{:04}", state.next_id);
        state.orders.insert(id.clone(), order.clone());

        Ok(CreatedOrder {
            approve_url: Some(format!("https://gateway.test/checkoutnow?token={id}")),
            id,
            status: "CREATED".to_string(),
        })
    }

    async fn capture_order(&self, order_id: &str) -> Result<CapturedOrder> {
        // Give concurrent callers a chance to interleave, like a network hop
        tokio::task::yield_now().await;

        let mut state = self.lock();
        if let Some(make) = state.capture_failure {
            return Err(make());
        }
        if !state.orders.contains_key(order_id) {
            return Err(BookingError::Gateway(format!("unknown order {order_id}")));
        }
        if state.captured.iter().any(|id| id == order_id) {
            return Err(BookingError::Gateway(format!(
                "HTTP 422 Unprocessable Entity: ORDER_ALREADY_CAPTURED {order_id}"
            )));
        }

        let status = state
            .capture_status
            .clone()
            .unwrap_or_else(|| ORDER_COMPLETED.to_string());
        let capture_id = (status == ORDER_COMPLETED).then(|| format!("CAPTURE-{order_id}"));
        if capture_id.is_some() {
            state.captured.push(order_id.to_string());
        }

        Ok(CapturedOrder {
            id: order_id.to_string(),
            status,
            capture_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_have_two_decimals() {
        assert_eq!(format_amount(800), "8.00");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(123_456), "1234.56");
    }

    #[tokio::test]
    async fn in_memory_gateway_issues_sequential_orders() {
        let gateway = InMemoryGateway::new();
        let request = OrderRequest {
            reference_id: "b-1".into(),
            amount_cents: 800,
            currency: "USD".into(),
            description: "2 seats".into(),
            return_url: "http://localhost/return".into(),
            cancel_url: "http://localhost/cancel".into(),
        };

        let first = gateway.create_order(&request).await.unwrap();
        let second = gateway.create_order(&request).await.unwrap();
        assert_eq!(first.id, "ORDER-0001");
        assert_eq!(second.id, "ORDER-0002");
        assert!(first.approve_url.unwrap().ends_with("ORDER-0001"));

        let captured = gateway.capture_order(&first.id).await.unwrap();
        assert!(captured.is_completed());
        assert_eq!(gateway.captured(), vec!["ORDER-0001".to_string()]);
    }

    #[tokio::test]
    async fn second_capture_of_an_order_is_rejected() {
        let gateway = InMemoryGateway::new();
        let request = OrderRequest {
            reference_id: "b-1".into(),
            amount_cents: 800,
            currency: "USD".into(),
            description: String::new(),
            return_url: String::new(),
            cancel_url: String::new(),
        };
        let order = gateway.create_order(&request).await.unwrap();

        gateway.capture_order(&order.id).await.unwrap();
        let err = gateway.capture_order(&order.id).await.unwrap_err();
        assert!(err.to_string().contains("ORDER_ALREADY_CAPTURED"));
        assert_eq!(gateway.captured().len(), 1);
    }

    #[tokio::test]
    async fn scripted_failure_is_consumed_once() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next_create(BookingError::GatewayTimeout);
        let request = OrderRequest {
            reference_id: "b-1".into(),
            amount_cents: 100,
            currency: "USD".into(),
            description: String::new(),
            return_url: String::new(),
            cancel_url: String::new(),
        };

        assert!(matches!(
            gateway.create_order(&request).await,
            Err(BookingError::GatewayTimeout)
        ));
        assert!(gateway.create_order(&request).await.is_ok());
    }
}
