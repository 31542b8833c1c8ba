//! Reliable-queue consumer
//!
//! Submissions arrive on a single broker list. Each worker moves the next
//! message into its own processing list and only removes it there once the
//! verdict has been delivered, so at most one unacknowledged message is in
//! flight per worker. The pool's admission control is exactly this: N
//! workers times one message.
//!
//! Each worker owns a dedicated broker connection: BLMOVE parks the
//! connection server-side until a message arrives or the timeout fires.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use gavel::QueueConfig;

/// Seconds one blocking pop waits before the worker loop re-checks shutdown
const POP_TIMEOUT_SECS: f64 = 5.0;

/// One message pulled off the submissions queue, not yet acknowledged
#[derive(Debug)]
pub struct Delivery {
    pub payload: String,
    processing_key: String,
}

#[derive(Clone)]
pub struct JobQueue {
    conn: ConnectionManager,
    submissions_key: String,
    processing_prefix: String,
}

impl JobQueue {
    pub fn new(conn: ConnectionManager, queue: &QueueConfig) -> Self {
        Self {
            conn,
            submissions_key: queue.submissions_key.clone(),
            processing_prefix: queue.processing_prefix.clone(),
        }
    }

    fn processing_key(&self, worker_id: usize) -> String {
        processing_key(&self.processing_prefix, worker_id)
    }

    /// Block for the next submission message.
    ///
    /// Returns `None` on timeout so the caller can observe shutdown. The
    /// message is moved atomically into this worker's processing list and
    /// stays there until [`ack`](Self::ack) or [`reject`](Self::reject).
    pub async fn next(&self, worker_id: usize) -> redis::RedisResult<Option<Delivery>> {
        let processing_key = self.processing_key(worker_id);
        let mut conn = self.conn.clone();

        let payload: Option<String> = redis::cmd("BLMOVE")
            .arg(&self.submissions_key)
            .arg(&processing_key)
            .arg("LEFT")
            .arg("RIGHT")
            .arg(POP_TIMEOUT_SECS)
            .query_async(&mut conn)
            .await?;

        Ok(payload.map(|payload| Delivery {
            payload,
            processing_key,
        }))
    }

    /// Acknowledge a fully processed message
    pub async fn ack(&self, delivery: &Delivery) -> redis::RedisResult<()> {
        self.remove(delivery).await
    }

    /// Drop a malformed message without redelivery
    pub async fn reject(&self, delivery: &Delivery) -> redis::RedisResult<()> {
        self.remove(delivery).await
    }

    async fn remove(&self, delivery: &Delivery) -> redis::RedisResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .lrem(&delivery.processing_key, 1, &delivery.payload)
            .await?;
        Ok(())
    }
}

/// Processing list for one worker slot
fn processing_key(prefix: &str, worker_id: usize) -> String {
    format!("{prefix}:{worker_id}")
}
