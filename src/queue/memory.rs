//! In-process queue transport for local runs and tests.
//!
//! Behaves like a hosted at-least-once queue: a received message is hidden
//! for the visibility timeout and reappears, under a new receipt handle, unless
//! it is deleted first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::{InboundMessage, QueueError, QueueTransport, ReceiptHandle};

const URL_SCHEME: &str = "memory://";

/// Counters for one queue.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct QueueStats {
    pub sent: usize,
    pub received: usize,
    pub deleted: usize,
    /// Messages still stored, in flight or visible.
    pub depth: usize,
}

struct Stored {
    body: String,
    custom_attribute: Option<String>,
    receipt: Option<String>,
    visible_at: Instant,
}

enum Take {
    Batch(Vec<InboundMessage>),
    Empty(Arc<Notify>),
}

#[derive(Default)]
struct QueueState {
    messages: Vec<Stored>,
    stats: QueueStats,
    arrivals: Arc<Notify>,
}

pub struct MemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    visibility_timeout: Duration,
}

impl MemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self { queues: Mutex::new(HashMap::new()), visibility_timeout }
    }

    /// A transport with `names` already created and a 30 s visibility timeout.
    pub fn with_queues<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue = Self::new(Duration::from_secs(30));
        for name in names {
            queue.create_queue(name);
        }
        queue
    }

    pub fn create_queue(&self, name: impl Into<String>) {
        self.lock().entry(name.into()).or_default();
    }

    /// Enqueues directly by name, bypassing URL resolution.
    pub fn push(&self, name: &str, body: &str, custom_attribute: Option<&str>) -> Result<String, QueueError> {
        let mut queues = self.lock();
        let state = queues
            .get_mut(name)
            .ok_or_else(|| QueueError::UnknownQueue(name.to_owned()))?;
        state.messages.push(Stored {
            body: body.to_owned(),
            custom_attribute: custom_attribute.map(str::to_owned),
            receipt: None,
            visible_at: Instant::now(),
        });
        state.stats.sent += 1;
        state.stats.depth = state.messages.len();
        state.arrivals.notify_one();
        Ok(Uuid::new_v4().to_string())
    }

    pub fn stats(&self, name: &str) -> Option<QueueStats> {
        self.lock().get(name).map(|state| state.stats)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, QueueState>> {
        // A poisoned lock only means another thread panicked mid-update of
        // counters; the message list itself is always left consistent.
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn name_from_url(queue_url: &str) -> Result<&str, QueueError> {
        queue_url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| QueueError::UnknownQueue(queue_url.to_owned()))
    }

    /// Takes every visible message up to `max`, or hands back the notifier to wait on.
    fn take_visible(&self, name: &str, max: usize) -> Result<Take, QueueError> {
        let mut queues = self.lock();
        let state = queues
            .get_mut(name)
            .ok_or_else(|| QueueError::UnknownQueue(name.to_owned()))?;
        let now = Instant::now();
        let hidden_until = now + self.visibility_timeout;

        let batch: Vec<InboundMessage> = state
            .messages
            .iter_mut()
            .filter(|m| m.visible_at <= now)
            .take(max)
            .map(|m| {
                let receipt = Uuid::new_v4().to_string();
                m.receipt = Some(receipt.clone());
                m.visible_at = hidden_until;
                InboundMessage {
                    body: m.body.clone(),
                    custom_attribute: m.custom_attribute.clone(),
                    receipt_handle: ReceiptHandle(receipt),
                }
            })
            .collect();

        if batch.is_empty() {
            return Ok(Take::Empty(Arc::clone(&state.arrivals)));
        }
        state.stats.received += batch.len();
        Ok(Take::Batch(batch))
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl QueueTransport for MemoryQueue {
    async fn queue_url(&self, queue_name: &str) -> Result<String, QueueError> {
        if self.lock().contains_key(queue_name) {
            Ok(format!("{URL_SCHEME}{queue_name}"))
        } else {
            Err(QueueError::UnknownQueue(queue_name.to_owned()))
        }
    }

    async fn receive(
        &self,
        queue_url: &str,
        max_messages: u32,
        wait: Duration,
    ) -> Result<Vec<InboundMessage>, QueueError> {
        let name = Self::name_from_url(queue_url)?;
        let deadline = Instant::now() + wait;
        loop {
            let arrivals = match self.take_visible(name, max_messages as usize)? {
                Take::Batch(batch) => return Ok(batch),
                Take::Empty(arrivals) => arrivals,
            };
            if tokio::time::timeout_at(deadline, arrivals.notified()).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn delete(&self, queue_url: &str, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let name = Self::name_from_url(queue_url)?;
        let mut queues = self.lock();
        let state = queues
            .get_mut(name)
            .ok_or_else(|| QueueError::UnknownQueue(name.to_owned()))?;
        let position = state
            .messages
            .iter()
            .position(|m| m.receipt.as_deref() == Some(receipt.0.as_str()))
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.0.clone()))?;
        state.messages.remove(position);
        state.stats.deleted += 1;
        state.stats.depth = state.messages.len();
        Ok(())
    }

    async fn send(
        &self,
        queue_url: &str,
        body: &str,
        custom_attribute: Option<&str>,
    ) -> Result<String, QueueError> {
        let name = Self::name_from_url(queue_url)?;
        self.push(name, body, custom_attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn receive_hides_until_visibility_timeout() {
        let queue = MemoryQueue::new(Duration::from_secs(5));
        queue.create_queue("jobs");
        let url = queue.queue_url("jobs").await.unwrap();
        queue.send(&url, "one", Some("x")).await.unwrap();

        let first = queue.receive(&url, 10, Duration::ZERO).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].custom_attribute.as_deref(), Some("x"));

        let hidden = queue.receive(&url, 10, Duration::from_secs(1)).await.unwrap();
        assert!(hidden.is_empty());

        tokio::time::advance(Duration::from_secs(5)).await;
        let again = queue.receive(&url, 10, Duration::ZERO).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_ne!(again[0].receipt_handle, first[0].receipt_handle);

        // The first delivery's receipt went stale when the message reappeared.
        assert!(matches!(
            queue.delete(&url, &first[0].receipt_handle).await,
            Err(QueueError::UnknownReceipt(_))
        ));
        queue.delete(&url, &again[0].receipt_handle).await.unwrap();
        assert_eq!(queue.stats("jobs").unwrap().depth, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn receive_caps_batch_size() {
        let queue = MemoryQueue::with_queues(["jobs"]);
        for i in 0..12 {
            queue.push("jobs", &i.to_string(), None).unwrap();
        }
        let url = queue.queue_url("jobs").await.unwrap();
        assert_eq!(queue.receive(&url, 10, Duration::ZERO).await.unwrap().len(), 10);
        assert_eq!(queue.receive(&url, 10, Duration::ZERO).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn long_poll_wakes_on_arrival() {
        let queue = Arc::new(MemoryQueue::with_queues(["jobs"]));
        let url = queue.queue_url("jobs").await.unwrap();

        let producer = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push("jobs", "late", None).unwrap();
        });

        let batch = queue.receive(&url, 10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "late");
    }

    #[tokio::test]
    async fn unknown_queue_is_an_error() {
        let queue = MemoryQueue::default();
        assert!(matches!(queue.queue_url("nope").await, Err(QueueError::UnknownQueue(_))));
    }
}
