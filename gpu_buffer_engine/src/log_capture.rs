/// Capturing logger for unit tests
///
/// Installs itself as the global logger and keeps every entry so tests can
/// assert on what an operation reported. Tests using it must be `#[serial]`
/// because the logger is process-wide.

use std::sync::{Arc, Mutex};

use crate::engine::Engine;
use crate::log::{LogEntry, LogSeverity, Logger};

#[derive(Clone, Default)]
pub struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl CaptureLogger {
    /// Install a fresh capture logger and return a handle to its entries
    pub fn install() -> Self {
        let logger = Self::default();
        Engine::set_logger(logger.clone());
        Engine::set_min_severity(LogSeverity::Trace);
        logger
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Messages logged at exactly `severity`
    pub fn messages(&self, severity: LogSeverity) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.severity == severity)
            .map(|e| e.message)
            .collect()
    }

    pub fn contains(&self, severity: LogSeverity, needle: &str) -> bool {
        self.messages(severity).iter().any(|m| m.contains(needle))
    }
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}
