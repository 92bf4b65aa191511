//! Unified error type.

use crate::config::ConfigError;
use crate::method::Method;
use crate::queue::QueueError;

/// Boxed error used at collaborator seams (validators, queue handlers, connectors).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by switchyard's fallible operations.
///
/// Application-level failures (404, 401, 500, ...) are expressed as
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// startup misconfiguration and infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid route pattern: {0}")]
    RoutePattern(#[from] matchit::InsertError),

    #[error("app `{0}` is registered more than once")]
    DuplicateApp(String),

    #[error("route {method} `{app}/{action}` is registered more than once")]
    DuplicateRoute {
        app: String,
        action: String,
        method: Method,
    },

    #[error("route {method} `{app}/{action}` can never be reached")]
    UnroutableMethod {
        app: String,
        action: String,
        method: Method,
    },

    #[error("{queue_ref} queue-ref of app `{app}` not found in config")]
    UnknownQueueRef { app: String, queue_ref: String },

    #[error("queue `{queue}` is bound more than once by app `{app}`")]
    DuplicateQueueBinding { app: String, queue: String },

    #[error("queue handlers are registered but no queue transport is configured")]
    MissingQueueTransport,

    #[error("queue: {0}")]
    Queue(#[from] QueueError),

    #[error("connection attempts exhausted after {attempts} tries: {last_error}")]
    ConnectionExhausted { attempts: u32, last_error: String },

    #[error("handler for request {request_id} panicked")]
    HandlerPanicked { request_id: String },
}
