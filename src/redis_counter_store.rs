use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, IntoConnectionInfo, RedisResult, Script};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RedisConfig;
use crate::counter_store::{CounterStore, StoreError};

// Runs server-side as a single atomic unit, so concurrent issuers never read
// the same previous value.
const ADVANCE_WRAPPING_LUA: &str = r#"
local current = redis.call('GET', KEYS[1])
local modulus = tonumber(ARGV[1])
local next_value = 0
if current then
    next_value = ((tonumber(current) % modulus) + 1) % modulus
end
redis.call('SET', KEYS[1], next_value)
return next_value
"#;

#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
    advance_script: Arc<Script>,
    timeout: Duration,
}

impl RedisCounterStore {
    /// Opens a multiplexed, auto-reconnecting connection. Credentials in the
    /// config take precedence over any embedded in the URL.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let mut info = config.url.as_str().into_connection_info()?;
        if let Some(username) = config.username.as_ref().filter(|u| !u.is_empty()) {
            info.redis.username = Some(username.clone());
        }
        if let Some(password) = config.password.as_ref().filter(|p| !p.is_empty()) {
            info.redis.password = Some(password.clone());
        }

        let client = Client::open(info)?;
        let conn = bounded(timeout, ConnectionManager::new(client)).await?;
        tracing::info!(url = %redact_url(&config.url), "connected to Redis");

        Ok(RedisCounterStore {
            conn,
            advance_script: Arc::new(Script::new(ADVANCE_WRAPPING_LUA)),
            timeout,
        })
    }
}

async fn bounded<T, F>(timeout: Duration, op: F) -> Result<T, StoreError>
where
    F: Future<Output = RedisResult<T>>,
{
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}

/// Strips any `user:password@` section before the URL is logged.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        bounded(self.timeout, conn.get::<_, Option<i64>>(key)).await
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        bounded(self.timeout, conn.set::<_, _, ()>(key, value)).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = bounded(self.timeout, conn.del(key)).await?;
        Ok(removed > 0)
    }

    async fn advance_wrapping(&self, key: &str, modulus: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.advance_script.key(key);
        invocation.arg(modulus);
        bounded(self.timeout, invocation.invoke_async::<_, i64>(&mut conn)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = bounded(
            self.timeout,
            redis::cmd("PING").query_async::<_, String>(&mut conn),
        )
        .await?;
        Ok(())
    }
}
