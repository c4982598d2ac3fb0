use crate::redis_client::RedisClient;

pub mod seats;

/// Redis read cache. Display-only: booking decisions always read the ledger.
#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    seat_map_ttl_secs: u64,
}

impl CacheService {
    pub fn new(redis: RedisClient, seat_map_ttl_secs: u64) -> Self {
        Self {
            redis,
            seat_map_ttl_secs,
        }
    }
}
