//! In-memory validation queue.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{MessageId, QueueMessage, ValidationQueue, ValidationRequest};
use crate::error::QueueError;

#[derive(Debug, Default)]
struct QueueState {
    next_id: MessageId,
    ready: VecDeque<QueueMessage>,
    /// Released messages and when they become visible again.
    delayed: Vec<(Instant, QueueMessage)>,
    in_flight: HashMap<MessageId, QueueMessage>,
    dead: Vec<QueueMessage>,
    dead_letter_calls: usize,
}

/// Released messages stay hidden for the retry delay, then are visible again.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    retry_delay: Duration,
}

impl MemoryQueue {
    /// Released messages are visible again immediately.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_delay(retry_delay: Duration) -> Self {
        Self {
            state: Mutex::default(),
            retry_delay,
        }
    }

    /// Enqueue an arbitrary body, bypassing request serialisation.
    pub async fn send_raw(&self, body: impl Into<String>) -> MessageId {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        state.ready.push_back(QueueMessage {
            id,
            body: body.into(),
            receive_count: 0,
        });
        id
    }

    /// Messages waiting for delivery, delayed, or currently claimed.
    pub async fn pending(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.delayed.len() + state.in_flight.len()
    }

    pub async fn dead_letters(&self) -> Vec<QueueMessage> {
        self.state.lock().await.dead.clone()
    }

    /// Number of dead-letter operations performed.
    pub async fn dead_letter_calls(&self) -> usize {
        self.state.lock().await.dead_letter_calls
    }
}

#[async_trait]
impl ValidationQueue for MemoryQueue {
    async fn send(&self, request: &ValidationRequest) -> Result<MessageId, QueueError> {
        let body = serde_json::to_string(request)?;
        Ok(self.send_raw(body).await)
    }

    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.delayed)
            .into_iter()
            .partition(|(visible_at, _)| *visible_at <= now);
        state.delayed = waiting;
        state.ready.extend(due.into_iter().map(|(_, message)| message));

        let mut batch = Vec::new();
        while batch.len() < max {
            let Some(mut message) = state.ready.pop_front() else {
                break;
            };
            message.receive_count += 1;
            state.in_flight.insert(message.id, message.clone());
            batch.push(message);
        }
        Ok(batch)
    }

    async fn ack(&self, ids: &[MessageId]) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        for id in ids {
            state.in_flight.remove(id);
        }
        Ok(())
    }

    async fn release(&self, ids: &[MessageId]) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let visible_at = Instant::now() + self.retry_delay;
        for id in ids {
            if let Some(message) = state.in_flight.remove(id) {
                state.delayed.push((visible_at, message));
            }
        }
        Ok(())
    }

    async fn dead_letter(&self, messages: &[QueueMessage]) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.dead_letter_calls += 1;
        for message in messages {
            state.in_flight.remove(&message.id);
            state.dead.push(message.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_release_redelivers_with_count() {
        let queue = MemoryQueue::new();
        let id = queue
            .send(&ValidationRequest {
                onboarding_id: Uuid::new_v4(),
            })
            .await
            .unwrap();

        let first = queue.receive(10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(queue.receive(10).await.unwrap().is_empty());

        queue.release(&[id]).await.unwrap();
        let second = queue.receive(10).await.unwrap();
        assert_eq!(second[0].receive_count, 2);

        queue.ack(&[id]).await.unwrap();
        assert_eq!(queue.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_message_waits_for_retry_delay() {
        let queue = MemoryQueue::with_retry_delay(Duration::from_secs(30));
        let id = queue
            .send(&ValidationRequest {
                onboarding_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        queue.receive(10).await.unwrap();
        queue.release(&[id]).await.unwrap();

        assert!(queue.receive(10).await.unwrap().is_empty());
        assert_eq!(queue.pending().await, 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let redelivered = queue.receive(10).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].receive_count, 2);
    }

    #[tokio::test]
    async fn test_dead_letter_removes_from_queue() {
        let queue = MemoryQueue::new();
        queue.send_raw("not json").await;
        let batch = queue.receive(10).await.unwrap();
        assert!(batch[0].request().is_err());

        queue.dead_letter(&batch).await.unwrap();
        assert_eq!(queue.pending().await, 0);
        assert_eq!(queue.dead_letters().await.len(), 1);
        assert_eq!(queue.dead_letter_calls().await, 1);
    }
}
