//! Event publishers and the in-process drain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use super::router::EventRouter;
use super::types::EventEnvelope;
use crate::error::ClientError;

/// Delivery attempts per event before the drain gives up on it.
const MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Backoff between delivery attempts, multiplied by the attempt number.
const RETRY_BACKOFF_MS: u64 = 100;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), ClientError>;
}

// ============================================================================
// CHANNEL PUBLISHER + DRAIN
// ============================================================================

/// Loopback publisher: events go onto a bounded channel and are routed by an
/// [`EventDrain`] running on its own task.
#[derive(Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<EventEnvelope>,
}

impl ChannelPublisher {
    /// Returns the publisher and the receiver the drain consumes.
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<EventEnvelope>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), ClientError> {
        debug!(detail_type = %envelope.detail_type, "Publishing event");
        self.sender
            .send(envelope)
            .await
            .map_err(|_| ClientError::unavailable("event bus", "channel closed"))
    }
}

/// Routes events from a [`ChannelPublisher`] until shutdown.
///
/// A handler error is retried with backoff; after the last attempt the event
/// is logged and dropped.
pub struct EventDrain {
    receiver: mpsc::Receiver<EventEnvelope>,
    router: Arc<EventRouter>,
}

impl EventDrain {
    pub fn new(receiver: mpsc::Receiver<EventEnvelope>, router: Arc<EventRouter>) -> Self {
        Self { receiver, router }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Event drain started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                next = self.receiver.recv() => {
                    let Some(envelope) = next else {
                        info!("Event channel closed");
                        break;
                    };
                    self.deliver(envelope).await;
                }
                _ = shutdown.changed() => {}
            }
        }

        info!("Event drain shutting down");
    }

    async fn deliver(&self, envelope: EventEnvelope) {
        for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
            match self.router.route(&envelope).await {
                Ok(_) => return,
                Err(e) if attempt < MAX_DELIVERY_ATTEMPTS => {
                    warn!(
                        detail_type = %envelope.detail_type,
                        attempt,
                        error = %e,
                        "Event handler failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64))
                        .await;
                }
                Err(e) => {
                    error!(
                        detail_type = %envelope.detail_type,
                        correlation_id = ?envelope.correlation_id,
                        error = %e,
                        "Dropping event after {} attempts",
                        MAX_DELIVERY_ATTEMPTS
                    );
                }
            }
        }
    }
}

// ============================================================================
// RECORDING PUBLISHER
// ============================================================================

/// Keeps every published event for inspection.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<EventEnvelope>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<EventEnvelope> {
        self.events.lock().await.clone()
    }

    /// Published events with the given detail type.
    pub async fn of_type(&self, detail_type: &str) -> Vec<EventEnvelope> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.detail_type == detail_type)
            .cloned()
            .collect()
    }

    /// Drain everything published so far.
    pub async fn take(&self) -> Vec<EventEnvelope> {
        std::mem::take(&mut *self.events.lock().await)
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), ClientError> {
        self.events.lock().await.push(envelope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::OnboardingEvent;
    use serde_json::json;

    #[tokio::test]
    async fn test_recording_filters_by_type() {
        let publisher = RecordingPublisher::new();
        let envelope =
            EventEnvelope::lifecycle(OnboardingEvent::Initiated, &json!({"onboardingId": "x"}))
                .unwrap();
        publisher.publish(envelope).await.unwrap();

        assert_eq!(publisher.of_type("Onboarding Initiated").await.len(), 1);
        assert!(publisher.of_type("Onboarding Failed").await.is_empty());
        assert_eq!(publisher.take().await.len(), 1);
        assert!(publisher.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_channel_closed_is_an_error() {
        let (publisher, receiver) = ChannelPublisher::new(4);
        drop(receiver);
        let envelope =
            EventEnvelope::lifecycle(OnboardingEvent::Deployed, &json!({})).unwrap();
        assert!(publisher.publish(envelope).await.is_err());
    }
}
