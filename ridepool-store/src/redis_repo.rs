use redis::RedisResult;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns whether the request identified by `key`
    /// is still within `limit` for the current window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = rate_limit_pipe(key, window_seconds).query_async(&mut conn).await?;
        Ok(count <= limit)
    }
}

/// INCR plus an expiry that only the first hit of a window sets (`EXPIRE NX`,
/// Redis 7+). Later hits must not push the window forward.
fn rate_limit_pipe(key: &str, window_seconds: i64) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .incr(key, 1)
        .cmd("EXPIRE")
        .arg(key)
        .arg(window_seconds)
        .arg("NX")
        .ignore();
    pipe
}

pub fn rate_limit_key(client_ip: &str) -> String {
    format!("rate_limit:{}", client_ip)
}
