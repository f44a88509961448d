//! Fire-and-forget telemetry.
//!
//! The job runner reports lifecycle events through this seam; delivery is
//! best-effort and never blocks or fails a job. The default sink writes
//! structured log lines; an exporting sink can be swapped in without
//! touching the runner.

use serde_json::Value;
use tracing::{info, warn};

pub trait TelemetrySink: Send + Sync {
    fn track_event(&self, name: &str, properties: Value);

    fn track_exception(&self, message: &str);
}

/// Default sink: events become structured log lines.
pub struct LogTelemetry;

impl TelemetrySink for LogTelemetry {
    fn track_event(&self, name: &str, properties: Value) {
        info!(event = name, properties = %properties, "telemetry event");
    }

    fn track_exception(&self, message: &str) {
        warn!(exception = message, "telemetry exception");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Captures events for assertions.
    #[derive(Default)]
    pub struct CapturingTelemetry {
        pub events: Mutex<Vec<(String, Value)>>,
        pub exceptions: Mutex<Vec<String>>,
    }

    impl TelemetrySink for CapturingTelemetry {
        fn track_event(&self, name: &str, properties: Value) {
            self.events
                .lock()
                .unwrap()
                .push((name.to_string(), properties));
        }

        fn track_exception(&self, message: &str) {
            self.exceptions.lock().unwrap().push(message.to_string());
        }
    }
}
