mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use cinema_booking::error::{BookingError, ErrorKind};
use cinema_booking::models::seat::seat_layout;
use cinema_booking::models::{Room, SeatStatus, SEATS_PER_ROOM};
use cinema_booking::repository::{CatalogRepository, SeatRepository};
use cinema_booking::services::CreateShowtimeRequest;
use common::{TestHarness, COMING_SOON, NOW_PLAYING};

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 1, hour, 0, 0).unwrap()
}

fn request(room: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> CreateShowtimeRequest {
    CreateShowtimeRequest {
        movie_id: Some(NOW_PLAYING),
        room_id: Some(room.to_string()),
        start_time: Some(start),
        end_time: Some(end),
        price: Some(90_000),
    }
}

#[tokio::test]
async fn overlapping_windows_are_rejected() {
    let h = TestHarness::new().await;
    let scheduler = &h.state.showtimes;
    let existing = scheduler
        .create_showtime(request(h.room.id, at(14), at(16)))
        .await
        .unwrap();

    let clashes = [
        (at(13), at(15)), // covers the start
        (at(15), at(17)), // covers the end
        (at(14), at(16)), // identical
        (at(13), at(17)), // encloses
    ];
    for (start, end) in clashes {
        let err = scheduler
            .create_showtime(request(h.room.id, start, end))
            .await
            .unwrap_err();
        match err {
            BookingError::ShowtimeOverlap { room_id, existing: id } => {
                assert_eq!(room_id, h.room.id);
                assert_eq!(id, existing.id);
            }
            other => panic!("expected overlap for {start}..{end}, got {other:?}"),
        }
    }

    // Enclosed
    let err = scheduler
        .create_showtime(request(
            h.room.id,
            at(14) + Duration::minutes(30),
            at(15) + Duration::minutes(30),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert_eq!(h.store.showtime_count().await, 1);
}

#[tokio::test]
async fn back_to_back_showtimes_do_not_overlap() {
    let h = TestHarness::new().await;
    let scheduler = &h.state.showtimes;
    scheduler
        .create_showtime(request(h.room.id, at(14), at(16)))
        .await
        .unwrap();
    scheduler
        .create_showtime(request(h.room.id, at(16), at(18)))
        .await
        .unwrap();
    scheduler
        .create_showtime(request(h.room.id, at(12), at(14)))
        .await
        .unwrap();
    assert_eq!(h.store.showtime_count().await, 3);
}

#[tokio::test]
async fn same_window_in_another_room_is_fine() {
    let h = TestHarness::new().await;
    let (other_room, seats) = h
        .state
        .seats
        .provision_room(&h.cinema.id.to_string(), 2)
        .await
        .unwrap();
    assert_eq!(seats, SEATS_PER_ROOM);

    let scheduler = &h.state.showtimes;
    scheduler
        .create_showtime(request(h.room.id, at(14), at(16)))
        .await
        .unwrap();
    let second = scheduler
        .create_showtime(request(other_room.id, at(14), at(16)))
        .await
        .unwrap();
    assert_eq!(h.ledger(second.id).await.len(), SEATS_PER_ROOM);
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_any_write() {
    let h = TestHarness::new().await;
    let scheduler = &h.state.showtimes;

    let mut missing_movie = request(h.room.id, at(10), at(12));
    missing_movie.movie_id = None;
    let err = scheduler.create_showtime(missing_movie).await.unwrap_err();
    assert!(err.to_string().contains("movie_id"), "{err}");

    let mut missing_end = request(h.room.id, at(10), at(12));
    missing_end.end_time = None;
    let err = scheduler.create_showtime(missing_end).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let mut negative = request(h.room.id, at(10), at(12));
    negative.price = Some(-1);
    let err = scheduler.create_showtime(negative).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = scheduler
        .create_showtime(request(h.room.id, at(12), at(12)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = scheduler
        .create_showtime(request(h.room.id, at(12), at(10)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let mut bad_room = request(h.room.id, at(10), at(12));
    bad_room.room_id = Some("room-1".into());
    let err = scheduler.create_showtime(bad_room).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidId { field: "room_id", .. }));

    assert_eq!(h.store.showtime_count().await, 0);
}

#[tokio::test]
async fn unknown_room_and_unreleased_movie() {
    let h = TestHarness::new().await;
    let scheduler = &h.state.showtimes;

    let err = scheduler
        .create_showtime(request(Uuid::new_v4(), at(10), at(12)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let mut unknown_movie = request(h.room.id, at(10), at(12));
    unknown_movie.movie_id = Some(999);
    let err = scheduler.create_showtime(unknown_movie).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let mut coming_soon = request(h.room.id, at(10), at(12));
    coming_soon.movie_id = Some(COMING_SOON);
    let err = scheduler.create_showtime(coming_soon).await.unwrap_err();
    assert!(matches!(
        err,
        BookingError::MovieNotBookable { movie_id: COMING_SOON, .. }
    ));

    assert_eq!(h.store.showtime_count().await, 0);
}

#[tokio::test]
async fn showtime_is_removed_when_its_ledger_cannot_be_built() {
    let h = TestHarness::new().await;
    h.store.fail_ledger_inserts(true).await;

    let err = h
        .state
        .showtimes
        .create_showtime(request(h.room.id, at(10), at(12)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(h.store.showtime_count().await, 0);

    // The window is free again once the store recovers
    h.store.fail_ledger_inserts(false).await;
    let showtime = h
        .state
        .showtimes
        .create_showtime(request(h.room.id, at(10), at(12)))
        .await
        .unwrap();
    assert_eq!(h.ledger(showtime.id).await.len(), SEATS_PER_ROOM);
}

#[tokio::test]
async fn incomplete_room_cannot_host_a_showtime() {
    let h = TestHarness::new().await;
    let room = Room {
        id: Uuid::new_v4(),
        cinema_id: h.cinema.id,
        room_number: 9,
    };
    h.store.insert_room(&room).await.unwrap();
    let partial: Vec<_> = seat_layout(room.id).into_iter().take(100).collect();
    h.store.insert_room_seats(&partial).await.unwrap();

    let err = h
        .state
        .showtimes
        .create_showtime(request(room.id, at(10), at(12)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::IncompleteRoom { found: 100, expected: 144, .. }
    ));
    assert_eq!(h.store.showtime_count().await, 0);
}

#[tokio::test]
async fn deleting_a_showtime_drops_its_ledger() {
    let h = TestHarness::new().await;
    let showtime = h.showtime(50_000).await;
    let id = showtime.id.to_string();

    let removed = h.state.showtimes.delete_showtime(&id).await.unwrap();
    assert_eq!(removed, SEATS_PER_ROOM as u64);
    assert!(h.ledger(showtime.id).await.is_empty());
    assert_eq!(
        h.state.showtimes.get_showtime(&id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        h.state.showtimes.delete_showtime(&id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn seat_map_counts_each_status() {
    let h = TestHarness::new().await;
    let showtime = h.showtime(50_000).await;
    h.bookings()
        .create_booking(None, h.request(showtime.id, &["A1", "A2"]).await)
        .await
        .unwrap();
    let b1 = h.seat(showtime.id, "B1").await;
    h.state
        .ledger
        .update_seat_status(&showtime.id.to_string(), &b1.id.to_string(), SeatStatus::Booked)
        .await
        .unwrap();

    let map = h.state.ledger.seat_map(&showtime.id.to_string()).await.unwrap();
    assert_eq!(map.reserved, 2);
    assert_eq!(map.booked, 1);
    assert_eq!(map.available, SEATS_PER_ROOM - 3);
    let first: Vec<_> = map.seats.iter().take(11).map(|s| s.seat_number.as_str()).collect();
    assert_eq!(
        first,
        vec!["A1", "A2", "A3", "A4", "A5", "A6", "A7", "A8", "A9", "A10", "A11"]
    );
}

#[tokio::test]
async fn manual_status_write_requires_a_known_seat() {
    let h = TestHarness::new().await;
    let showtime = h.showtime(50_000).await;
    let other = h.showtime_at(Utc::now() + Duration::days(4), 50_000).await;
    let foreign = h.seat(other.id, "A1").await;

    let err = h
        .state
        .ledger
        .update_seat_status(
            &showtime.id.to_string(),
            &foreign.id.to_string(),
            SeatStatus::Booked,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.seat(other.id, "A1").await.status, SeatStatus::Available);
}

#[tokio::test]
async fn room_seats_are_initialized_once() {
    let h = TestHarness::new().await;
    let room_id = h.room.id.to_string();

    let err = h
        .state
        .seats
        .initialize_seats_for_room(&room_id)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::AlreadyInitialized { .. }));

    let seats = h.state.seats.seats_for_room(&room_id).await.unwrap();
    assert_eq!(seats.len(), SEATS_PER_ROOM);
    assert_eq!(seats[0].seat_number, "A1");
    assert_eq!(seats[SEATS_PER_ROOM - 1].seat_number, "H18");

    let err = h
        .state
        .seats
        .initialize_seats_for_room(&Uuid::new_v4().to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn rooms_in_use_cannot_be_removed() {
    let h = TestHarness::new().await;
    let showtime = h.showtime(50_000).await;
    let room_id = h.room.id.to_string();

    let err = h.state.seats.remove_room(&room_id).await.unwrap_err();
    assert!(matches!(err, BookingError::RoomInUse { .. }));

    h.state
        .showtimes
        .delete_showtime(&showtime.id.to_string())
        .await
        .unwrap();
    let removed = h.state.seats.remove_room(&room_id).await.unwrap();
    assert_eq!(removed, SEATS_PER_ROOM as u64);
    assert_eq!(h.store.count_room_seats(h.room.id).await.unwrap(), 0);
    assert!(h.store.find_room(h.room.id).await.unwrap().is_none());
}

#[tokio::test]
async fn provisioning_needs_a_known_cinema() {
    let h = TestHarness::new().await;
    let err = h
        .state
        .seats
        .provision_room(&Uuid::new_v4().to_string(), 3)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = h
        .state
        .seats
        .provision_room(&h.cinema.id.to_string(), 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}
