//! Validation queue listener
//!
//! Single loop that claims batches from the validation queue and hands them to
//! the validation worker. Success ids are acked and retry ids released; fatal
//! messages are already on the dead-letter destination when the worker
//! returns. A batch that only produced retries waits out the poll interval
//! like an empty one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::QueueError;
use crate::workflow::OnboardingService;

/// Backoff interval after a queue error
const ERROR_BACKOFF_MS: u64 = 1000;

/// Counts from one claimed batch.
#[derive(Debug, Clone, Copy, Default)]
struct Polled {
    claimed: usize,
    retried: usize,
}

impl Polled {
    fn made_progress(&self) -> bool {
        self.claimed > self.retried
    }
}

pub struct ValidationQueueListener {
    service: Arc<OnboardingService>,
}

impl ValidationQueueListener {
    pub fn new(service: Arc<OnboardingService>) -> Self {
        Self { service }
    }

    /// Start the listener loop (returns on shutdown signal)
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Validation queue listener started");
        let poll_interval = self.service.config().queue.poll_interval;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.poll().await {
                Ok(polled) if polled.made_progress() => continue,
                Ok(_) => {
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    error!(error = %e, "Error polling validation queue");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(ERROR_BACKOFF_MS)) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        info!("Validation queue listener shutting down");
    }

    /// Claim and process one batch. Returns the number of messages claimed.
    pub async fn poll_once(&self) -> Result<usize, QueueError> {
        Ok(self.poll().await?.claimed)
    }

    async fn poll(&self) -> Result<Polled, QueueError> {
        let queue = self.service.queue();
        let messages = queue.receive(self.service.config().queue.batch_size).await?;
        if messages.is_empty() {
            return Ok(Polled::default());
        }

        let claimed = messages.len();
        let report = self.service.validate_batch(messages).await;
        debug!(
            claimed,
            succeeded = report.succeeded.len(),
            retry = report.retry.len(),
            dead_lettered = report.dead_lettered.len(),
            "Validation batch processed"
        );

        if !report.succeeded.is_empty() {
            queue.ack(&report.succeeded).await?;
        }
        if !report.retry.is_empty() {
            queue.release(&report.retry).await?;
        }
        Ok(Polled {
            claimed,
            retried: report.retry.len(),
        })
    }
}
