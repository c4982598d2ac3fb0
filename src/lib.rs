pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod repository;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::repository::{PgStore, Store};
use crate::services::{
    BookingOrchestrator, CheckoutSettings, ExpirySweeper, PayPalClient, PaymentGateway,
    PaymentService, SeatInventory, ShowtimeScheduler, ShowtimeSeatLedger,
};

// Shared state for the whole application
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub cache: Option<cache::CacheService>,
    pub seats: SeatInventory,
    pub ledger: ShowtimeSeatLedger,
    pub showtimes: ShowtimeScheduler,
    pub bookings: BookingOrchestrator,
    pub payments: PaymentService,
}

impl AppState {
    /// Connects Postgres and Redis, runs migrations and wires the services.
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database)
            .await
            .context("failed to connect to database")?;
        info!("Database connected");
        db.run_migrations()
            .await
            .context("failed to run migrations")?;

        let redis = redis_client::RedisClient::new(&config.redis.url)
            .await
            .context("failed to connect to Redis")?;
        redis.ping().await.context("Redis did not answer PING")?;
        info!("Redis connected");
        let cache = cache::CacheService::new(redis, config.redis.seat_map_ttl_secs);

        let gateway = PayPalClient::from_config(&config.payment, &config.circuit_breaker)
            .context("failed to build payment gateway client")?;

        let store: Arc<dyn Store> = Arc::new(PgStore::new(db.pool.clone()));
        Ok(Arc::new(Self::with_store(
            config,
            store,
            Arc::new(gateway),
            Some(cache),
        )))
    }

    /// Wires the services over any store and gateway.
    pub fn with_store(
        config: config::Config,
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        cache: Option<cache::CacheService>,
    ) -> Self {
        let hold = chrono::Duration::minutes(config.booking.hold_minutes);
        let ledger = ShowtimeSeatLedger::new(store.clone());
        let bookings = BookingOrchestrator::new(store.clone(), hold);
        let payments = PaymentService::new(
            store.clone(),
            gateway,
            bookings.clone(),
            CheckoutSettings::from(&config.payment),
        );

        Self {
            seats: SeatInventory::new(store.clone()),
            showtimes: ShowtimeScheduler::new(store, ledger.clone()),
            ledger,
            bookings,
            payments,
            cache,
            config,
        }
    }

    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(self.bookings.clone(), self.ledger.clone(), self.cache.clone())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.config.booking.sweep_interval_secs.max(1))
    }

    pub async fn invalidate_seats(&self, showtime_id: uuid::Uuid) {
        if let Some(cache) = &self.cache {
            cache.invalidate_seats(showtime_id).await;
        }
    }
}

/// Full HTTP surface: health routes plus the `/api` controllers.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Cinema Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
