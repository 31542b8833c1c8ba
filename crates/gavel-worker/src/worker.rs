//! The per-worker grading loop
//!
//! Each worker wholly owns one submission at a time: pop, decode, grade,
//! publish, acknowledge. The only suspension points are the queue wait
//! (bounded, shutdown-aware) and the sandboxed execution inside the judge
//! (bounded by the wall-clock limit).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use gavel::{Judge, Submission};

use crate::publish::Publisher;
use crate::queue::JobQueue;
use crate::store::WorkerStore;

/// Back-off after a broker error before retrying the queue wait
const BROKER_RETRY_DELAY: Duration = Duration::from_secs(1);

pub async fn run(
    worker_id: usize,
    judge: Arc<Judge<WorkerStore>>,
    queue: JobQueue,
    publisher: Publisher,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(worker = worker_id, "worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        // The queue wait is the cancellation point: an idle worker stops
        // pulling new work the moment shutdown is signalled. A worker already
        // grading finishes its job first.
        let delivery = tokio::select! {
            _ = shutdown.changed() => break,
            next = queue.next(worker_id) => match next {
                Ok(Some(delivery)) => delivery,
                Ok(None) => continue,
                Err(err) => {
                    error!(worker = worker_id, error = %err, "broker error while waiting for work");
                    tokio::time::sleep(BROKER_RETRY_DELAY).await;
                    continue;
                }
            },
        };

        match serde_json::from_str::<Submission>(&delivery.payload) {
            Ok(submission) => {
                info!(
                    worker = worker_id,
                    submission_id = %submission.submission_id,
                    language = %submission.language,
                    source_size = submission.source_code.len(),
                    "received submission"
                );

                let report = judge.process(&submission).await;
                publisher.publish(&submission, report).await;

                if let Err(err) = queue.ack(&delivery).await {
                    error!(
                        worker = worker_id,
                        submission_id = %submission.submission_id,
                        error = %err,
                        "failed to acknowledge message"
                    );
                }
            }
            Err(err) => {
                // A payload that does not parse can never succeed; reject it
                // without invoking the judge and without redelivery
                warn!(
                    worker = worker_id,
                    error = %err,
                    "rejecting malformed submission payload"
                );
                if let Err(err) = queue.reject(&delivery).await {
                    error!(worker = worker_id, error = %err, "failed to reject message");
                }
            }
        }
    }

    info!(worker = worker_id, "worker exiting");
}
