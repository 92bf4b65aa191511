//! Queue transport seam and the consumer engine built on top of it.
//!
//! ```text
//! App::queue_handlers()  ──►  Host (ref → physical name, once)
//!                                   │ start_consumers()
//!                                   ▼
//!                     Consumer (one task per binding, forever)
//!                       receive ─► spawn per message ─► handler
//!                                                     └► delete / retain
//! ```

mod consumer;
mod handler;
mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BoxError;

pub(crate) use consumer::{Consumer, QueueBinding};
pub use handler::{Cleanup, HandlerError, Outcome, QueueHandler, QueueMessage, QueueRoute};
#[doc(hidden)]
pub use handler::{BoxedQueueHandler, ErasedQueueHandler};
pub use memory::{MemoryQueue, QueueStats};

/// Message attribute carrying the optional custom value handed to handlers.
pub const CUSTOM_ATTRIBUTE: &str = "CustomData";

/// Opaque token identifying one delivery of a message. Required to delete it.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ReceiptHandle(pub String);

/// A message as delivered by the transport.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub body: String,
    pub custom_attribute: Option<String>,
    pub receipt_handle: ReceiptHandle,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("transport: {0}")]
    Transport(BoxError),

    #[error("queue `{0}` does not exist")]
    UnknownQueue(String),

    #[error("receipt handle `{0}` is not in flight")]
    UnknownReceipt(String),
}

/// An at-least-once message queue.
///
/// Queues are addressed by the URL returned from [`queue_url`](Self::queue_url).
/// Undeleted messages become visible again after the transport's visibility
/// timeout, so handlers must tolerate redelivery.
#[async_trait]
pub trait QueueTransport: Send + Sync + 'static {
    async fn queue_url(&self, queue_name: &str) -> Result<String, QueueError>;

    /// Long-polls for up to `max_messages`, waiting at most `wait` for the first.
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: u32,
        wait: Duration,
    ) -> Result<Vec<InboundMessage>, QueueError>;

    async fn delete(&self, queue_url: &str, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Returns the transport-assigned message id.
    async fn send(
        &self,
        queue_url: &str,
        body: &str,
        custom_attribute: Option<&str>,
    ) -> Result<String, QueueError>;
}
