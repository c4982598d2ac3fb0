//! Scheduled screenings and the room overlap rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One screening of a movie in a room over `[start_time, end_time)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Showtime {
    pub id: Uuid,
    pub movie_id: i64,
    pub room_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Per-seat price in local currency units.
    pub price: i64,
}

impl Showtime {
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        intervals_overlap(start, end, self.start_time, self.end_time)
    }
}

/// Half-open interval overlap between a new `[start, end)` and an existing
/// `[other_start, other_end)`: the new start falls inside the existing
/// interval, the new end falls inside it, or the new interval contains it.
/// Back-to-back intervals do not overlap.
pub fn intervals_overlap(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    other_start: DateTime<Utc>,
    other_end: DateTime<Utc>,
) -> bool {
    let start_inside = start >= other_start && start < other_end;
    let end_inside = end > other_start && end <= other_end;
    let contains = start <= other_start && end >= other_end;
    start_inside || end_inside || contains
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    #[test]
    fn four_overlap_shapes() {
        let (s, e) = (at(60), at(180));
        // new inside existing
        assert!(intervals_overlap(at(90), at(120), s, e));
        // existing inside new
        assert!(intervals_overlap(at(0), at(240), s, e));
        // partial left
        assert!(intervals_overlap(at(0), at(90), s, e));
        // partial right
        assert!(intervals_overlap(at(120), at(240), s, e));
        // identical
        assert!(intervals_overlap(s, e, s, e));
    }

    #[test]
    fn back_to_back_is_allowed() {
        let (s, e) = (at(60), at(180));
        assert!(!intervals_overlap(at(180), at(300), s, e));
        assert!(!intervals_overlap(at(0), at(60), s, e));
    }

    proptest! {
        #[test]
        fn overlap_matches_interval_intersection(
            a in 0i64..1000, la in 1i64..300,
            b in 0i64..1000, lb in 1i64..300,
        ) {
            let (s1, e1) = (at(a), at(a + la));
            let (s2, e2) = (at(b), at(b + lb));
            let expected = s1 < e2 && s2 < e1;
            prop_assert_eq!(intervals_overlap(s1, e1, s2, e2), expected);
            prop_assert_eq!(intervals_overlap(s2, e2, s1, e1), expected);
        }
    }
}
