mod common;

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cinema_booking::config::CircuitBreakerConfig;
use cinema_booking::error::BookingError;
use cinema_booking::services::circuit_breaker::CircuitState;
use cinema_booking::services::gateway::OrderRequest;
use cinema_booking::services::{PayPalClient, PaymentGateway};

async fn client_for(server: &MockServer, failure_threshold: u32) -> PayPalClient {
    client_with_breaker(server, failure_threshold, 60)
}

fn client_with_breaker(
    server: &MockServer,
    failure_threshold: u32,
    timeout_seconds: u64,
) -> PayPalClient {
    let mut payment = common::test_config().payment;
    payment.gateway_url = server.uri();
    let breaker = CircuitBreakerConfig {
        failure_threshold,
        timeout_seconds,
    };
    PayPalClient::from_config(&payment, &breaker).unwrap()
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A21AA-test-token",
            "token_type": "Bearer",
            "expires_in": 32400
        })))
        .mount(server)
        .await;
}

fn order() -> OrderRequest {
    OrderRequest {
        reference_id: "5f0c1a9e-booking".into(),
        amount_cents: 800,
        currency: "USD".into(),
        description: "2 cinema seat(s)".into(),
        return_url: "http://localhost/api/payments/return".into(),
        cancel_url: "http://localhost/api/payments/cancel".into(),
    }
}

#[tokio::test]
async fn creates_an_order_with_a_bearer_token() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .and(header("authorization", "Bearer A21AA-test-token"))
        .and(body_partial_json(json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": "5f0c1a9e-booking",
                "amount": { "currency_code": "USD", "value": "8.00" }
            }]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "5O190127TN364715T",
            "status": "PAYER_ACTION_REQUIRED",
            "links": [
                { "href": "https://api.sandbox.paypal.com/v2/checkout/orders/5O190127TN364715T", "rel": "self", "method": "GET" },
                { "href": "https://www.sandbox.paypal.com/checkoutnow?token=5O190127TN364715T", "rel": "payer-action", "method": "GET" }
            ]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, 3).await;
    let created = client.create_order(&order()).await.unwrap();
    assert_eq!(created.id, "5O190127TN364715T");
    assert_eq!(
        created.approve_url.as_deref(),
        Some("https://www.sandbox.paypal.com/checkoutnow?token=5O190127TN364715T")
    );

    // Second call reuses the cached token
    client.create_order(&order()).await.unwrap();
    let token_calls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/v1/oauth2/token")
        .count();
    assert_eq!(token_calls, 1);
}

#[tokio::test]
async fn captures_and_reads_the_capture_id() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/5O190127TN364715T/capture"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "5O190127TN364715T",
            "status": "COMPLETED",
            "purchase_units": [{
                "reference_id": "5f0c1a9e-booking",
                "payments": { "captures": [{ "id": "3C679366HH908993F", "status": "COMPLETED" }] }
            }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 3).await;
    let captured = client.capture_order("5O190127TN364715T").await.unwrap();
    assert!(captured.is_completed());
    assert_eq!(captured.capture_id.as_deref(), Some("3C679366HH908993F"));
}

#[tokio::test]
async fn server_errors_open_the_breaker() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .respond_with(ResponseTemplate::new(500).set_body_string("INTERNAL_SERVICE_ERROR"))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, 2).await;
    for _ in 0..2 {
        let err = client.create_order(&order()).await.unwrap_err();
        match err {
            BookingError::Gateway(message) => {
                assert!(message.contains("500"), "{message}");
                assert!(message.contains("INTERNAL_SERVICE_ERROR"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(client.breaker().state(), CircuitState::Open);

    let err = client.create_order(&order()).await.unwrap_err();
    assert!(matches!(err, BookingError::CircuitOpen));
}

#[tokio::test]
async fn slow_gateway_times_out() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/SLOW/capture"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "id": "SLOW", "status": "COMPLETED" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 3).await;
    let err = client.capture_order("SLOW").await.unwrap_err();
    assert!(matches!(err, BookingError::GatewayTimeout), "{err:?}");
    assert_eq!(client.breaker().failure_count(), 1);
}

#[tokio::test]
async fn rejected_credentials_surface_as_gateway_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "Client Authentication failed"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 3).await;
    let err = client.capture_order("ANY").await.unwrap_err();
    assert!(matches!(err, BookingError::Gateway(ref m) if m.contains("401")), "{err:?}");
}

#[tokio::test]
async fn dropped_trial_call_does_not_keep_the_breaker_open() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    let capture = "/v2/checkout/orders/TRIAL/capture";
    Mock::given(method("POST"))
        .and(path(capture))
        .respond_with(ResponseTemplate::new(500).set_body_string("INTERNAL_SERVICE_ERROR"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(capture))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "id": "TRIAL", "status": "COMPLETED" }))
                .set_delay(Duration::from_millis(500)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(capture))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": "TRIAL", "status": "COMPLETED" })),
        )
        .mount(&server)
        .await;

    let client = client_with_breaker(&server, 1, 0);
    client.capture_order("TRIAL").await.unwrap_err();
    assert_eq!(client.breaker().state(), CircuitState::Open);

    // The caller gives up on the trial before the gateway answers
    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), client.capture_order("TRIAL")).await;
    assert!(abandoned.is_err());
    assert_eq!(client.breaker().state(), CircuitState::HalfOpen);

    let captured = client.capture_order("TRIAL").await.unwrap();
    assert!(captured.is_completed());
    assert_eq!(client.breaker().state(), CircuitState::Closed);
}
