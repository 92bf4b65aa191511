//! Connection-scoped execution for cache and pool clients.
//!
//! [`ConnectionExecutor::execute`] opens one connection per attempt, hands it
//! to the operation by value, and lets it drop when the attempt ends, whether
//! it succeeded, failed or the connection never opened. Failed attempts are
//! retried in a loop up to a fixed bound.

use std::future::Future;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{BoxError, Error};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Opens connections to some backing service.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    async fn connect(&self) -> Result<Self::Connection, BoxError>;
}

pub struct ConnectionExecutor<C> {
    connector: C,
    max_attempts: u32,
}

impl<C: Connector> ConnectionExecutor<C> {
    pub fn new(connector: C) -> Self {
        Self { connector, max_attempts: DEFAULT_MAX_ATTEMPTS }
    }

    /// Total attempts, the first one included. Clamped to at least one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Runs `op` against a fresh connection until it succeeds or the attempts
    /// run out.
    pub async fn execute<T, F, Fut>(&self, request_id: &str, mut op: F) -> Result<T, Error>
    where
        F: FnMut(C::Connection) -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            let result = match self.connector.connect().await {
                Ok(conn) => op(conn).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(request_id, attempt, error = %e, "connection attempt failed");
                    last_error = e.to_string();
                }
            }
        }
        warn!(request_id, attempts = self.max_attempts, "connection retries exhausted");
        Err(Error::ConnectionExhausted { attempts: self.max_attempts, last_error })
    }
}
