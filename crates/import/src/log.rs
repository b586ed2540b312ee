//! Running, human-readable import log.
//!
//! Every entry is also emitted through `tracing` so a CLI run shows the
//! same lines the persisted job record gets.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportLog {
    entries: Vec<LogEntry>,
}

impl ImportLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "vrfleet::import", "{message}");
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(target: "vrfleet::import", "{message}");
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(target: "vrfleet::import", "{message}");
        self.push(LogLevel::Error, message);
    }

    fn push(&mut self, level: LogLevel, message: String) {
        self.entries.push(LogEntry { level, message });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.level == LogLevel::Error)
            .count()
    }

    /// Error lines joined for the job's error log, or `None` when clean.
    pub fn error_text(&self) -> Option<String> {
        let errors: Vec<&str> = self
            .entries
            .iter()
            .filter(|e| e.level == LogLevel::Error)
            .map(|e| e.message.as_str())
            .collect();
        (!errors.is_empty()).then(|| errors.join("\n"))
    }

    /// Whole log as `[LEVEL] message` lines.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("[{}] {}", e.level.as_str(), e.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_text_collects_only_errors() {
        let mut log = ImportLog::new();
        log.info("Loaded 3 rows");
        log.error("Row 2: missing binocular_number");
        log.warn("Row 3: repeated");
        log.error("Row 4: unknown app");
        assert_eq!(log.error_count(), 2);
        assert_eq!(
            log.error_text().unwrap(),
            "Row 2: missing binocular_number\nRow 4: unknown app"
        );
    }

    #[test]
    fn clean_log_has_no_error_text() {
        let mut log = ImportLog::new();
        log.info("ok");
        assert!(log.error_text().is_none());
        assert_eq!(log.render(), "[INFO] ok");
    }
}
