#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use cinema_booking::config::{
    AppConfig, BookingConfig, CircuitBreakerConfig, Config, DatabaseConfig, PaymentConfig,
    RedisConfig,
};
use cinema_booking::models::{Cinema, Movie, MovieStatus, Room, Showtime, ShowtimeSeat};
use cinema_booking::repository::{LedgerRepository, MemoryStore, Store};
use cinema_booking::services::{
    BookingOrchestrator, CreateBookingRequest, CreateShowtimeRequest, ExpirySweeper,
    InMemoryGateway,
};
use cinema_booking::AppState;

pub const NOW_PLAYING: i64 = 1;
pub const COMING_SOON: i64 = 2;
pub const ADMIN_TOKEN: &str = "operator-secret";

pub fn test_config() -> Config {
    Config {
        app: AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            environment: "test".into(),
            rust_log: "cinema_booking=debug".into(),
            admin_token: ADMIN_TOKEN.into(),
        },
        database: DatabaseConfig {
            url: "postgres://unused".into(),
            pool_size: 1,
            acquire_timeout_secs: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".into(),
            seat_map_ttl_secs: 30,
        },
        payment: PaymentConfig {
            gateway_url: "http://gateway.test".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            currency: "USD".into(),
            fx_rate: 25_000.0,
            return_url: "http://localhost/api/payments/return".into(),
            cancel_url: "http://localhost/api/payments/cancel".into(),
            request_timeout_secs: 1,
        },
        booking: BookingConfig {
            hold_minutes: 120,
            sweep_interval_secs: 60,
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 3,
            timeout_seconds: 60,
        },
    }
}

/// Services over a `MemoryStore` and a scripted gateway, with one cinema,
/// one fully provisioned room and two movies.
pub struct TestHarness {
    pub store: MemoryStore,
    pub gateway: InMemoryGateway,
    pub state: Arc<AppState>,
    pub cinema: Cinema,
    pub room: Room,
}

impl TestHarness {
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let gateway = InMemoryGateway::new();

        let cinema = Cinema {
            id: Uuid::new_v4(),
            name: "Galaxy Cinema".into(),
            address: "116 Nguyen Du".into(),
        };
        store.put_cinema(cinema.clone()).await;
        store
            .put_movie(Movie {
                id: NOW_PLAYING,
                title: "Dune: Part Two".into(),
                status: MovieStatus::NowPlaying,
            })
            .await;
        store
            .put_movie(Movie {
                id: COMING_SOON,
                title: "Untitled Sequel".into(),
                status: MovieStatus::ComingSoon,
            })
            .await;

        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let state = Arc::new(AppState::with_store(
            test_config(),
            shared,
            Arc::new(gateway.clone()),
            None,
        ));

        let (room, _) = state
            .seats
            .provision_room(&cinema.id.to_string(), 1)
            .await
            .unwrap();

        Self {
            store,
            gateway,
            state,
            cinema,
            room,
        }
    }

    pub fn bookings(&self) -> &BookingOrchestrator {
        &self.state.bookings
    }

    pub fn sweeper(&self) -> ExpirySweeper {
        self.state.sweeper()
    }

    /// Schedules a two-hour showtime starting at `start`.
    pub async fn showtime_at(&self, start: DateTime<Utc>, price: i64) -> Showtime {
        self.state
            .showtimes
            .create_showtime(CreateShowtimeRequest {
                movie_id: Some(NOW_PLAYING),
                room_id: Some(self.room.id.to_string()),
                start_time: Some(start),
                end_time: Some(start + Duration::hours(2)),
                price: Some(price),
            })
            .await
            .unwrap()
    }

    pub async fn showtime(&self, price: i64) -> Showtime {
        self.showtime_at(Utc::now() + Duration::days(1), price).await
    }

    pub async fn ledger(&self, showtime_id: Uuid) -> Vec<ShowtimeSeat> {
        self.store.list_showtime_seats(showtime_id).await.unwrap()
    }

    pub async fn seat(&self, showtime_id: Uuid, label: &str) -> ShowtimeSeat {
        self.ledger(showtime_id)
            .await
            .into_iter()
            .find(|s| s.seat_number == label)
            .unwrap_or_else(|| panic!("no seat {label}"))
    }

    /// Ledger entry ids for the given labels, as a client would send them.
    pub async fn seat_ids(&self, showtime_id: Uuid, labels: &[&str]) -> Vec<String> {
        let mut ids = Vec::new();
        for label in labels {
            ids.push(self.seat(showtime_id, label).await.id.to_string());
        }
        ids
    }

    pub async fn request(&self, showtime_id: Uuid, labels: &[&str]) -> CreateBookingRequest {
        CreateBookingRequest {
            showtime_id: showtime_id.to_string(),
            seat_ids: self.seat_ids(showtime_id, labels).await,
        }
    }
}
