//! Shared, immutable host state handed to validators, handlers and consumers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Config;
use crate::error::{BoxError, Error};
use crate::queue::QueueTransport;
use crate::response::Response;
use crate::telemetry::Telemetry;

/// Product analytics sink. Events are fire-and-forget from the host's view.
#[async_trait]
pub trait Analytics: Send + Sync + 'static {
    async fn identify(&self, user_id: &str, traits: Value) -> Result<(), BoxError>;
    async fn track(&self, user_id: &str, event: &str, properties: Value) -> Result<(), BoxError>;
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAnalytics;

#[async_trait]
impl Analytics for NoopAnalytics {
    async fn identify(&self, _user_id: &str, _traits: Value) -> Result<(), BoxError> {
        Ok(())
    }

    async fn track(&self, _user_id: &str, _event: &str, _properties: Value) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Everything a request or message needs from the host, built once.
///
/// There is no global registry: the context lives behind an `Arc`, and every
/// dispatch and consumer task holds its own clone.
pub struct HostContext {
    config: Config,
    telemetry: Arc<dyn Telemetry>,
    analytics: Arc<dyn Analytics>,
    transport: Option<Arc<dyn QueueTransport>>,
}

impl HostContext {
    pub(crate) fn new(
        config: Config,
        telemetry: Arc<dyn Telemetry>,
        analytics: Arc<dyn Analytics>,
        transport: Option<Arc<dyn QueueTransport>>,
    ) -> Self {
        Self { config, telemetry, analytics, transport }
    }

    pub fn config(&self) -> &Config { &self.config }
    pub fn telemetry(&self) -> &dyn Telemetry { self.telemetry.as_ref() }
    pub fn analytics(&self) -> &dyn Analytics { self.analytics.as_ref() }

    pub(crate) fn telemetry_handle(&self) -> Arc<dyn Telemetry> {
        Arc::clone(&self.telemetry)
    }

    pub(crate) fn transport(&self) -> Option<Arc<dyn QueueTransport>> {
        self.transport.clone()
    }

    /// Physical queue name configured for `queue_ref`.
    pub fn queue_name(&self, queue_ref: &str) -> Option<&str> {
        self.config.queues.get(queue_ref).map(String::as_str)
    }

    /// Reports `err` and returns the generic 500 response.
    pub fn error_response(&self, request_id: &str, err: &(dyn std::error::Error + 'static)) -> Response {
        self.telemetry.capture_error(request_id, err);
        Response::internal_error()
    }

    /// Sends `body` to the queue configured under `queue_ref`, returning the
    /// transport's message id.
    pub async fn publish(&self, queue_ref: &str, body: &str, request_id: &str) -> Result<String, Error> {
        let transport = self.transport.as_ref().ok_or(Error::MissingQueueTransport)?;
        let queue = self.queue_name(queue_ref).ok_or_else(|| Error::UnknownQueueRef {
            app: String::new(),
            queue_ref: queue_ref.to_owned(),
        })?;
        tracing::debug!(request_id, queue, "publishing message");
        let url = transport.queue_url(queue).await?;
        let message_id = transport.send(&url, body, None).await?;
        tracing::info!(request_id, queue, message_id = %message_id, "message published");
        Ok(message_id)
    }
}
