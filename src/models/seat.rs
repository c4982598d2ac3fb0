//! Per-room seat inventory, created once when a room is provisioned.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed room layout: rows A..H, columns 1..18.
pub const SEAT_ROWS: [char; 8] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];
pub const SEAT_COLUMNS: i32 = 18;
pub const SEATS_PER_ROOM: usize = SEAT_ROWS.len() * SEAT_COLUMNS as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatType {
    Standard,
}

impl SeatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatType::Standard => "standard",
        }
    }
}

impl std::str::FromStr for SeatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(SeatType::Standard),
            other => Err(format!("unknown seat type {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatTemplate {
    pub id: Uuid,
    pub room_id: Uuid,
    /// Row letter followed by column, e.g. `C7`.
    pub seat_number: String,
    pub row: String,
    /// 1-based.
    pub column: i32,
    #[serde(rename = "type")]
    pub seat_type: SeatType,
}

/// Builds the full seat grid for a room, row-major.
pub fn seat_layout(room_id: Uuid) -> Vec<SeatTemplate> {
    let mut seats = Vec::with_capacity(SEATS_PER_ROOM);
    for row in SEAT_ROWS {
        for column in 1..=SEAT_COLUMNS {
            seats.push(SeatTemplate {
                id: Uuid::new_v4(),
                room_id,
                seat_number: format!("{row}{column}"),
                row: row.to_string(),
                column,
                seat_type: SeatType::Standard,
            });
        }
    }
    seats
}

/// Sort key for a seat label such as "C7": row letter, then numeric column.
pub fn label_order(label: &str) -> (String, i32) {
    let split = label
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(label.len());
    let (row, column) = label.split_at(split);
    (row.to_string(), column.parse().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn layout_has_one_seat_per_cell() {
        let room_id = Uuid::new_v4();
        let seats = seat_layout(room_id);

        assert_eq!(seats.len(), 144);
        let labels: HashSet<_> = seats.iter().map(|s| s.seat_number.as_str()).collect();
        assert_eq!(labels.len(), 144);
        assert!(seats.iter().all(|s| s.room_id == room_id));
        assert_eq!(seats[0].seat_number, "A1");
        assert_eq!(seats[143].seat_number, "H18");
    }

    #[test]
    fn label_is_row_then_column() {
        let seats = seat_layout(Uuid::new_v4());
        let c7 = seats.iter().find(|s| s.seat_number == "C7").unwrap();
        assert_eq!(c7.row, "C");
        assert_eq!(c7.column, 7);
        assert_eq!(c7.seat_type, SeatType::Standard);
    }

    #[test]
    fn labels_sort_by_row_then_numeric_column() {
        let mut labels = vec!["A10", "B1", "A2", "A1"];
        labels.sort_by_key(|l| label_order(l));
        assert_eq!(labels, vec!["A1", "A2", "A10", "B1"]);
    }

    proptest! {
        #[test]
        fn label_order_recovers_the_cell(row in 0usize..8, column in 1i32..=18) {
            let label = format!("{}{column}", SEAT_ROWS[row]);
            prop_assert_eq!(label_order(&label), (SEAT_ROWS[row].to_string(), column));
        }
    }
}
