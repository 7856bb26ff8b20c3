//! Wake-up signal for idle workers. Purely an optimisation: workers also poll, so a
//! lost signal only delays work until the next poll.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client as RedisClient, RedisResult};
use tokio::sync::Mutex;
use tracing::warn;

const SIGNAL_KEY: &str = "talentmatch:work:signal";
/// Pending wake-ups beyond this are dropped; one per idle worker is enough.
const MAX_PENDING_SIGNALS: isize = 64;

#[async_trait]
pub trait QueueSignal: Send + Sync {
    async fn notify(&self);

    /// Returns when signalled or after `timeout`, whichever comes first.
    async fn wait(&self, timeout: Duration);
}

/// Redis list signal: LPUSH to wake, BRPOP to wait.
///
/// Notifications share one multiplexed connection. BRPOP blocks the connection
/// it runs on, so each waiting worker borrows a dedicated one from `idle_waiters`.
pub struct RedisSignal {
    client: RedisClient,
    notifier: Mutex<Option<MultiplexedConnection>>,
    idle_waiters: Mutex<Vec<MultiplexedConnection>>,
}

impl RedisSignal {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            notifier: Mutex::new(None),
            idle_waiters: Mutex::new(Vec::new()),
        }
    }

    async fn notifier(&self) -> RedisResult<MultiplexedConnection> {
        let mut slot = self.notifier.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_tokio_connection().await?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn waiter(&self) -> RedisResult<MultiplexedConnection> {
        let idle = self.idle_waiters.lock().await.pop();
        match idle {
            Some(conn) => Ok(conn),
            None => self.client.get_multiplexed_tokio_connection().await,
        }
    }
}

#[async_trait]
impl QueueSignal for RedisSignal {
    async fn notify(&self) {
        let result = async {
            let mut conn = self.notifier().await?;
            redis::pipe()
                .cmd("LPUSH")
                .arg(SIGNAL_KEY)
                .arg(1)
                .ignore()
                .cmd("LTRIM")
                .arg(SIGNAL_KEY)
                .arg(0)
                .arg(MAX_PENDING_SIGNALS - 1)
                .ignore()
                .query_async::<_, ()>(&mut conn)
                .await
        }
        .await;

        if let Err(e) = result {
            warn!("Failed to signal workers via Redis: {e}");
            // reconnect on the next notify
            self.notifier.lock().await.take();
        }
    }

    async fn wait(&self, timeout: Duration) {
        // BRPOP takes whole seconds; sub-second waits round up to one.
        let seconds = timeout.as_secs().max(1);

        let result = async {
            let mut conn = self.waiter().await?;
            redis::cmd("BRPOP")
                .arg(SIGNAL_KEY)
                .arg(seconds)
                .query_async::<_, Option<(String, String)>>(&mut conn)
                .await?;
            Ok::<_, redis::RedisError>(conn)
        }
        .await;

        match result {
            Ok(conn) => self.idle_waiters.lock().await.push(conn),
            Err(e) => {
                warn!("Redis wait failed, falling back to polling: {e}");
                tokio::time::sleep(timeout).await;
            }
        }
    }
}
