//! Queue consumer engine.
//!
//! One [`Consumer`] per binding polls its queue for the life of the process.
//! Every received message gets its own task, so a slow or panicking handler
//! never holds up its siblings or the next poll. There is no shutdown hook.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::handler::{BoxedQueueHandler, HandlerError, Outcome, QueueMessage};
use super::{InboundMessage, QueueTransport};
use crate::config::ConsumerConfig;
use crate::telemetry::{Telemetry, panic_message};

/// An app's handler bound to a physical queue name, resolved at startup.
pub(crate) struct QueueBinding {
    pub(crate) app: String,
    pub(crate) queue_ref: String,
    pub(crate) queue_name: String,
    pub(crate) handler: BoxedQueueHandler,
}

pub(crate) struct Consumer {
    queue_name: Arc<str>,
    queue_url: Arc<str>,
    handler: BoxedQueueHandler,
    transport: Arc<dyn QueueTransport>,
    telemetry: Arc<dyn Telemetry>,
    config: ConsumerConfig,
    in_flight: Option<Arc<Semaphore>>,
}

impl Consumer {
    pub(crate) fn new(
        binding: &QueueBinding,
        queue_url: String,
        transport: Arc<dyn QueueTransport>,
        telemetry: Arc<dyn Telemetry>,
        config: ConsumerConfig,
    ) -> Self {
        let in_flight = config.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));
        Self {
            queue_name: Arc::from(binding.queue_name.as_str()),
            queue_url: Arc::from(queue_url),
            handler: Arc::clone(&binding.handler),
            transport,
            telemetry,
            config,
            in_flight,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        let span = info_span!("consumer", queue = %self.queue_name);
        tokio::spawn(self.run().instrument(span))
    }

    async fn run(self) {
        info!("successfully initiated queue");
        loop {
            let received = self
                .transport
                .receive(&self.queue_url, self.config.max_messages, self.config.wait())
                .await;

            let batch = match received {
                Ok(batch) => batch,
                Err(e) => {
                    self.telemetry.capture_message(&format!(
                        "receive from queue({}) failed: {e}",
                        self.queue_name
                    ));
                    tokio::time::sleep(self.config.error_backoff()).await;
                    continue;
                }
            };

            if batch.is_empty() {
                tokio::time::sleep(self.config.idle_backoff()).await;
                continue;
            }

            debug!(messages = batch.len(), "received batch");
            for message in batch {
                self.dispatch(message).await;
            }
        }
    }

    /// Spawns the task for one message, waiting for a slot when fan-out is bounded.
    async fn dispatch(&self, message: InboundMessage) {
        let permit = match &self.in_flight {
            // The semaphore is never closed, so acquisition only fails if that changes.
            Some(limit) => Arc::clone(limit).acquire_owned().await.ok(),
            None => None,
        };

        let job = Job {
            message,
            request_id: Uuid::new_v4().to_string(),
            queue_name: Arc::clone(&self.queue_name),
            queue_url: Arc::clone(&self.queue_url),
            handler: Arc::clone(&self.handler),
            transport: Arc::clone(&self.transport),
            telemetry: Arc::clone(&self.telemetry),
        };
        let span = info_span!("message", request_id = %job.request_id);
        tokio::spawn(
            async move {
                job.process().await;
                drop(permit);
            }
            .instrument(span),
        );
    }
}

/// Everything one message task owns.
struct Job {
    message: InboundMessage,
    request_id: String,
    queue_name: Arc<str>,
    queue_url: Arc<str>,
    handler: BoxedQueueHandler,
    transport: Arc<dyn QueueTransport>,
    telemetry: Arc<dyn Telemetry>,
}

impl Job {
    async fn process(self) {
        let InboundMessage { body, custom_attribute, receipt_handle } = self.message;
        let message = QueueMessage { body, custom_attribute, request_id: self.request_id.clone() };

        let handler = Arc::clone(&self.handler);
        let caught = AssertUnwindSafe(async move { handler.call(message).await })
            .catch_unwind()
            .await;

        let Outcome { cleanup, result } = match caught {
            Ok(outcome) => outcome,
            Err(payload) => {
                self.telemetry.capture_message(&format!(
                    "{}: RECOVER from panic running queue({}): {}",
                    self.request_id,
                    self.queue_name,
                    panic_message(payload.as_ref())
                ));
                return;
            }
        };

        match result {
            Ok(()) => {}
            Err(HandlerError::Retry(e)) => {
                self.telemetry.capture_message(&format!(
                    "{} failed to process message on queue({}) with error {e}",
                    self.request_id, self.queue_name
                ));
                info!("skipping message delete");
                return;
            }
            Err(HandlerError::ForceDelete(e)) => {
                self.telemetry.capture_message(&format!(
                    "{} poison message on queue({}) deleted after error {e}",
                    self.request_id, self.queue_name
                ));
            }
        }

        if let Err(e) = self.transport.delete(&self.queue_url, &receipt_handle).await {
            warn!(error = %e, "delete message failed");
        }
        cleanup.run(&self.request_id);
    }
}
