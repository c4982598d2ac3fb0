pub mod booking;
pub mod catalog;
pub mod payment;
pub mod seat;
pub mod showtime;
pub mod showtime_seat;

pub use booking::{Booking, BookingDetails, BookingStatus, SeatLabel};
pub use catalog::{Cinema, Movie, MovieStatus, Room};
pub use payment::{Payment, PaymentMethod, PaymentReconciliation, PaymentStatus};
pub use seat::{SeatTemplate, SeatType, SEATS_PER_ROOM};
pub use showtime::Showtime;
pub use showtime_seat::{SeatStatus, ShowtimeSeat};
