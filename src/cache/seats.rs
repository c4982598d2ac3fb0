use redis::AsyncCommands;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::CacheService;
use crate::services::ledger::SeatMap;

fn seats_key(showtime_id: Uuid) -> String {
    format!("seats:{showtime_id}")
}

impl CacheService {
    pub async fn get_seat_map(&self, showtime_id: Uuid) -> Option<SeatMap> {
        let mut conn = self.redis.conn.clone();
        let data: Option<String> = match conn.get(seats_key(showtime_id)).await {
            Ok(data) => data,
            Err(e) => {
                warn!(%showtime_id, error = %e, "Seat map cache read failed");
                return None;
            }
        };
        data.and_then(|raw| serde_json::from_str(&raw).ok())
    }

    pub async fn save_seat_map(&self, map: &SeatMap) {
        let Ok(data) = serde_json::to_string(map) else {
            return;
        };
        let mut conn = self.redis.conn.clone();
        let saved: Result<(), _> = conn
            .set_ex(seats_key(map.showtime_id), data, self.seat_map_ttl_secs)
            .await;
        if let Err(e) = saved {
            warn!(showtime_id = %map.showtime_id, error = %e, "Seat map cache write failed");
        }
    }

    pub async fn invalidate_seats(&self, showtime_id: Uuid) {
        let mut conn = self.redis.conn.clone();
        let _: Result<(), _> = conn.del(seats_key(showtime_id)).await;
        debug!(%showtime_id, "Invalidated seat map cache");
    }
}
