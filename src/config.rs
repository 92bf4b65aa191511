//! Host configuration.
//!
//! Loaded once at startup from a JSON file and never reloaded. Every field is
//! optional in the file; missing fields take the defaults below.
//!
//! ```json
//! {
//!   "port": 8080,
//!   "env": "local",
//!   "auth_token": "service-secret",
//!   "jwt_validation_url": "https://auth.internal/validate",
//!   "queues": { "emails": "prod-email-queue" }
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Deployment environment.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Dev,
    Qa,
    Prod,
}

/// Root configuration for the host.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub name: String,
    pub version: String,
    pub version_date: String,
    pub env: Environment,

    /// Shared secret accepted by [`SharedTokenValidator`](crate::validators::SharedTokenValidator).
    pub auth_token: String,

    /// Only honoured when the crate is built with the `stress-test` feature.
    pub allow_stress_test: bool,

    pub jwt_validation_url: Option<String>,
    pub profile_url: Option<String>,

    /// Logical queue ref → physical queue name.
    pub queues: HashMap<String, String>,

    pub consumer: ConsumerConfig,

    pub sse_heartbeat_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            name: String::new(),
            version: String::new(),
            version_date: String::new(),
            env: Environment::Local,
            auth_token: String::new(),
            allow_stress_test: false,
            jwt_validation_url: None,
            profile_url: None,
            queues: HashMap::new(),
            consumer: ConsumerConfig::default(),
            sse_heartbeat_seconds: 55,
        }
    }
}

/// Polling behaviour shared by every queue supervisor.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Upper bound per receive call. The common cloud transports cap this at 10.
    pub max_messages: u32,
    pub wait_seconds: u64,
    pub error_backoff_seconds: u64,
    pub idle_backoff_seconds: u64,
    /// Cap on concurrently running message tasks per queue. `None` means unbounded.
    pub max_in_flight: Option<usize>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_seconds: 1,
            error_backoff_seconds: 30,
            idle_backoff_seconds: 1,
            max_in_flight: None,
        }
    }
}

impl ConsumerConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_seconds)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_secs(self.idle_backoff_seconds)
    }
}

impl Config {
    /// Load and validate configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.consumer.max_messages) {
            return Err(ConfigError::Invalid(format!(
                "consumer.max_messages must be between 1 and 10, got {}",
                self.consumer.max_messages
            )));
        }
        if self.consumer.max_in_flight == Some(0) {
            return Err(ConfigError::Invalid("consumer.max_in_flight must be at least 1".into()));
        }
        if self.sse_heartbeat_seconds == 0 {
            return Err(ConfigError::Invalid("sse_heartbeat_seconds must be positive".into()));
        }
        for (name, value) in [
            ("jwt_validation_url", &self.jwt_validation_url),
            ("profile_url", &self.profile_url),
        ] {
            if let Some(raw) = value {
                url::Url::parse(raw)
                    .map_err(|e| ConfigError::Invalid(format!("{name} `{raw}`: {e}")))?;
            }
        }
        if let Some((queue_ref, _)) = self.queues.iter().find(|(_, name)| name.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("queue-ref `{queue_ref}` maps to an empty name")));
        }
        Ok(())
    }

    pub fn sse_heartbeat(&self) -> Duration {
        Duration::from_secs(self.sse_heartbeat_seconds)
    }
}
