pub mod booking;
pub mod circuit_breaker;
pub mod cleanup;
pub mod gateway;
pub mod ledger;
pub mod payment;
pub mod seats;
pub mod showtimes;

pub use booking::{BookingOrchestrator, CreateBookingRequest};
pub use cleanup::{ExpirySweeper, SweepReport};
pub use gateway::{InMemoryGateway, PayPalClient, PaymentGateway};
pub use ledger::{SeatMap, ShowtimeSeatLedger};
pub use payment::{CheckoutSettings, PaymentService};
pub use seats::SeatInventory;
pub use showtimes::{CreateShowtimeRequest, ShowtimeScheduler};
