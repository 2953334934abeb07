//! Injected sink for decision messages.

use parking_lot::Mutex;
use tracing::{error, info, warn};

/// Receives the human-readable messages produced while deciding.
pub trait DecisionLogger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards decision messages to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl DecisionLogger for TracingLogger {
    fn info(&self, message: &str) {
        info!(target: "turnstile::decision", "{}", message);
    }

    fn warn(&self, message: &str) {
        warn!(target: "turnstile::decision", "{}", message);
    }

    fn error(&self, message: &str) {
        error!(target: "turnstile::decision", "{}", message);
    }
}

/// Level tag of a message kept by [`RecordingLogger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Info,
    Warn,
    Error,
}

/// Keeps every message in memory, for assertions.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<(Recorded, String)>>,
}

impl RecordingLogger {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages so far, oldest first.
    pub fn entries(&self) -> Vec<(Recorded, String)> {
        self.entries.lock().clone()
    }

    /// Messages recorded at `level`.
    pub fn messages_at(&self, level: Recorded) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(recorded, _)| *recorded == level)
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn push(&self, level: Recorded, message: &str) {
        self.entries.lock().push((level, message.to_string()));
    }
}

impl DecisionLogger for RecordingLogger {
    fn info(&self, message: &str) {
        self.push(Recorded::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(Recorded::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(Recorded::Error, message);
    }
}
