//! Serializes pipeline runs.
//!
//! Inside one process a mutex is enough. When several processes share the
//! same database, a Redis lock (`SET NX PX` with a random token, released by
//! compare-and-delete) keeps a manual trigger on one replica from overlapping
//! a scheduled tick on another. The Redis TTL bounds how long a crashed
//! holder can block others.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use stockwatch_common::error::AppError;

/// Redis key holding the current run token.
pub const RUN_LOCK_KEY: &str = "stockwatch:notify:run-lock";

/// Deletes the key only while it still holds our token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
struct RedisLock {
    conn: ConnectionManager,
    ttl: Duration,
}

/// Grants at most one `RunPermit` at a time.
#[derive(Clone)]
pub struct RunGuard {
    local: Arc<Mutex<()>>,
    redis: Option<RedisLock>,
}

impl RunGuard {
    /// A guard that only serializes runs within this process.
    pub fn local() -> Self {
        Self {
            local: Arc::new(Mutex::new(())),
            redis: None,
        }
    }

    /// A guard that additionally takes a Redis lock held for at most `ttl`.
    pub async fn with_redis(redis_url: &str, ttl: Duration) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis for run locking");

        Ok(Self {
            local: Arc::new(Mutex::new(())),
            redis: Some(RedisLock { conn, ttl }),
        })
    }

    /// Whether a run currently holds the in-process lock.
    pub fn is_busy(&self) -> bool {
        self.local.try_lock().is_err()
    }

    /// Try to start a run. `Ok(None)` means another run is in progress.
    pub async fn try_acquire(&self) -> Result<Option<RunPermit>, AppError> {
        let Ok(local) = Arc::clone(&self.local).try_lock_owned() else {
            return Ok(None);
        };

        let redis = match &self.redis {
            None => None,
            Some(lock) => {
                let token = Uuid::new_v4().to_string();
                let mut conn = lock.conn.clone();
                let acquired: Option<String> = redis::cmd("SET")
                    .arg(RUN_LOCK_KEY)
                    .arg(&token)
                    .arg("NX")
                    .arg("PX")
                    .arg(lock.ttl.as_millis() as u64)
                    .query_async(&mut conn)
                    .await?;

                if acquired.is_none() {
                    tracing::debug!("Run lock held by another process");
                    return Ok(None);
                }
                Some((conn, token))
            }
        };

        Ok(Some(RunPermit {
            _local: local,
            redis,
        }))
    }
}

/// Proof that the holder may run the pipeline. Release it when done; if it
/// is dropped instead, the local lock is freed and the Redis key expires.
pub struct RunPermit {
    _local: OwnedMutexGuard<()>,
    redis: Option<(ConnectionManager, String)>,
}

impl RunPermit {
    pub async fn release(self) {
        if let Some((mut conn, token)) = self.redis {
            let result: Result<i64, _> = redis::Script::new(RELEASE_SCRIPT)
                .key(RUN_LOCK_KEY)
                .arg(&token)
                .invoke_async(&mut conn)
                .await;

            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to release Redis run lock; it will expire");
            }
        }
    }
}
