use crate::error::Result;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tokio::sync::Mutex;

pub struct RedisClient {
    manager: Mutex<ConnectionManager>,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            manager: Mutex::new(manager),
        })
    }

    /// Fixed-window rate limit: true while the caller has performed fewer
    /// than `limit` actions in the current window.
    pub async fn check_rate_limit(
        &self,
        key: &str,
        limit: u32,
        window_seconds: i64,
    ) -> Result<bool> {
        let mut conn = self.manager.lock().await;

        let current: u32 = conn.get(key).await.unwrap_or(0);

        if current >= limit {
            return Ok(false);
        }

        let _: () = conn.incr(key, 1).await?;
        let _: () = conn.expire(key, window_seconds).await?;

        Ok(true)
    }
}
