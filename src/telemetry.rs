//! Error-reporting seam.
//!
//! The host reports route misses, handler panics, serialization failures and
//! queue errors through [`Telemetry`]. Wire a real sink (Sentry, an OTLP
//! collector, ...) by implementing the trait; the default simply logs.

use std::any::Any;

/// A sink for operational errors that should reach a human.
pub trait Telemetry: Send + Sync + 'static {
    fn capture_message(&self, message: &str);

    fn capture_error(&self, context: &str, error: &(dyn std::error::Error + 'static)) {
        self.capture_message(&format!("{context}: {error}"));
    }
}

/// Reports through `tracing` at `error` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn capture_message(&self, message: &str) {
        tracing::error!(target: "switchyard::telemetry", "{message}");
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_panic_text() {
        let payload = std::panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom 7");

        let payload = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");
    }
}
