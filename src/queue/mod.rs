//! Validation queue.
//!
//! One message per onboarding id. Consumers classify each received message
//! and then either ack it (done), release it (redeliver later) or move it to
//! the dead-letter destination. Delivery is at-least-once.

mod listener;
mod memory;
#[cfg(feature = "database")]
mod postgres;

pub use listener::ValidationQueueListener;
pub use memory::MemoryQueue;
#[cfg(feature = "database")]
pub use postgres::PgValidationQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;

pub type MessageId = i64;

/// Body of a validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    pub onboarding_id: Uuid,
}

/// A received message. The body stays raw so a malformed producer is
/// classified by the consumer rather than lost in the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: MessageId,
    pub body: String,
    /// How many times this message has been handed out, including this one.
    pub receive_count: u32,
}

impl QueueMessage {
    pub fn request(&self) -> Result<ValidationRequest, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

#[async_trait]
pub trait ValidationQueue: Send + Sync {
    async fn send(&self, request: &ValidationRequest) -> Result<MessageId, QueueError>;

    /// Claim up to `max` visible messages.
    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>, QueueError>;

    /// Delete processed messages.
    async fn ack(&self, ids: &[MessageId]) -> Result<(), QueueError>;

    /// Return messages for later redelivery.
    async fn release(&self, ids: &[MessageId]) -> Result<(), QueueError>;

    /// Move messages to the dead-letter destination in one operation.
    async fn dead_letter(&self, messages: &[QueueMessage]) -> Result<(), QueueError>;
}
