// Queue consumers: the dispatcher only needs a blocking pop of the next raw entry

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::RedisConfig;
use crate::types::{WorkerError, WorkerResult};

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Block until an entry is available and return it.
    ///
    /// Returns [`WorkerError::QueueClosed`] when the queue can never yield again.
    async fn pop(&self) -> WorkerResult<String>;

    fn name(&self) -> &str;
}

/// Redis list consumer (`BLPOP <queue> 0`).
pub struct RedisQueue {
    client: redis::Client,
    queue_name: String,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisQueue {
    pub fn new(redis_url: &str, queue_name: impl Into<String>) -> WorkerResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            queue_name: queue_name.into(),
            conn: Mutex::new(None),
        })
    }

    /// Open the queue and verify the server answers `PING`.
    pub async fn connect(config: &RedisConfig) -> WorkerResult<Self> {
        let queue = Self::new(&config.url, config.queue_name.clone())?;
        let mut conn = queue.client.get_multiplexed_tokio_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        *queue.conn.lock().await = Some(conn);
        info!(queue = %queue.queue_name, "connected to Redis");
        Ok(queue)
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn pop(&self) -> WorkerResult<String> {
        // Only the dispatcher loop pops, so holding the lock across BLPOP is uncontended
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            debug!(queue = %self.queue_name, "opening Redis connection");
            *guard = Some(self.client.get_multiplexed_tokio_connection().await?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(WorkerError::QueueClosed);
        };

        let popped: redis::RedisResult<Option<(String, String)>> =
            conn.blpop(&self.queue_name, 0.0).await;

        match popped {
            Ok(Some((_key, entry))) => Ok(entry),
            Ok(None) => Ok(String::new()),
            Err(e) => {
                // Drop the connection so the next pop reconnects
                *guard = None;
                Err(e.into())
            }
        }
    }

    fn name(&self) -> &str {
        &self.queue_name
    }
}
