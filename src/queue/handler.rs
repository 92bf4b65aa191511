//! Queue handler trait, outcomes and type erasure.
//!
//! Mirrors [`crate::handler`]: any `Fn(QueueMessage) -> impl Future<Output = Outcome>`
//! is a handler, boxed once at registration into an `Arc<dyn ErasedQueueHandler>`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::BoxError;
use crate::handler::BoxFuture;

// ── Message ──────────────────────────────────────────────────────────────────

/// What a handler receives for one message.
#[derive(Clone, Debug)]
pub struct QueueMessage {
    pub body: String,
    pub custom_attribute: Option<String>,
    /// Fresh per message; use it for every log line about this message.
    pub request_id: String,
}

impl QueueMessage {
    /// The custom attribute, or `""` when the message carried none.
    pub fn custom_attribute(&self) -> &str {
        self.custom_attribute.as_deref().unwrap_or("")
    }
}

// ── Cleanup ──────────────────────────────────────────────────────────────────

/// Work to run after the message has been deleted. Receives the request id.
pub struct Cleanup(Option<Box<dyn FnOnce(&str) + Send + 'static>>);

impl Cleanup {
    pub fn new(f: impl FnOnce(&str) + Send + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub(crate) fn run(self, request_id: &str) {
        if let Some(f) = self.0 {
            f(request_id);
        }
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "Cleanup(..)" } else { "Cleanup(none)" })
    }
}

// ── Outcome ──────────────────────────────────────────────────────────────────

/// Why a handler did not finish cleanly.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Leave the message on the queue; it becomes visible again after the
    /// visibility timeout.
    #[error("{0}")]
    Retry(BoxError),

    /// The message can never succeed. Delete it anyway.
    #[error("{0}")]
    ForceDelete(BoxError),
}

impl HandlerError {
    pub fn retry(err: impl Into<BoxError>) -> Self {
        Self::Retry(err.into())
    }

    pub fn force_delete(err: impl Into<BoxError>) -> Self {
        Self::ForceDelete(err.into())
    }
}

/// A handler's verdict on one message.
#[derive(Debug)]
pub struct Outcome {
    pub(crate) cleanup: Cleanup,
    pub(crate) result: Result<(), HandlerError>,
}

impl Outcome {
    pub fn new(cleanup: Cleanup, result: Result<(), HandlerError>) -> Self {
        Self { cleanup, result }
    }

    /// Processed: delete the message, then run `cleanup`.
    pub fn done(cleanup: Cleanup) -> Self {
        Self::new(cleanup, Ok(()))
    }

    /// Processed with nothing to clean up.
    pub fn ack() -> Self {
        Self::done(Cleanup::none())
    }

    /// Failed: keep the message for redelivery.
    pub fn retry(err: impl Into<BoxError>) -> Self {
        Self::new(Cleanup::none(), Err(HandlerError::retry(err)))
    }

    /// Poison message: delete it despite `err`, then run `cleanup`.
    pub fn force_delete(cleanup: Cleanup, err: impl Into<BoxError>) -> Self {
        Self::new(cleanup, Err(HandlerError::force_delete(err)))
    }
}

// ── Type erasure ─────────────────────────────────────────────────────────────

#[doc(hidden)]
pub trait ErasedQueueHandler {
    fn call(&self, message: QueueMessage) -> BoxFuture<Outcome>;
}

#[doc(hidden)]
pub type BoxedQueueHandler = Arc<dyn ErasedQueueHandler + Send + Sync + 'static>;

/// Implemented for every `Fn(QueueMessage) -> impl Future<Output = Outcome>`.
pub trait QueueHandler: Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_queue_handler(self) -> BoxedQueueHandler;
}

impl<F, Fut> QueueHandler for F
where
    F: Fn(QueueMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    fn into_boxed_queue_handler(self) -> BoxedQueueHandler {
        Arc::new(FnQueueHandler(self))
    }
}

struct FnQueueHandler<F>(F);

impl<F, Fut> ErasedQueueHandler for FnQueueHandler<F>
where
    F: Fn(QueueMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    fn call(&self, message: QueueMessage) -> BoxFuture<Outcome> {
        Box::pin((self.0)(message))
    }
}

// ── QueueRoute ───────────────────────────────────────────────────────────────

/// A queue ref bound to the handler that consumes it.
///
/// The ref is logical; the host resolves it to a physical queue name through
/// [`Config::queues`](crate::Config::queues) at startup.
pub struct QueueRoute {
    pub(crate) queue_ref: String,
    pub(crate) handler: BoxedQueueHandler,
}

impl QueueRoute {
    pub fn new(queue_ref: impl Into<String>, handler: impl QueueHandler) -> Self {
        Self {
            queue_ref: queue_ref.into(),
            handler: handler.into_boxed_queue_handler(),
        }
    }
}
