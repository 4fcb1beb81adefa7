use std::sync::{Mutex, PoisonError};

/// Toast severity understood by the notification sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

/// A user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub severity: Severity,
}

impl Notice {
    #[must_use]
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

/// Fire-and-forget toast output.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);

    fn notice(&self, notice: &Notice) {
        self.notify(&notice.message, notice.severity);
    }
}

/// Writes notices to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Error => tracing::error!(target: "exam::notice", "{message}"),
            Severity::Warning => tracing::warn!(target: "exam::notice", "{message}"),
            Severity::Success | Severity::Info => tracing::info!(target: "exam::notice", "{message}"),
        }
    }
}

/// Keeps every notice in memory, oldest first.
#[derive(Debug, Default)]
pub struct CollectingSink {
    notices: Mutex<Vec<Notice>>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return everything collected so far.
    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl NotificationSink for CollectingSink {
    fn notify(&self, message: &str, severity: Severity) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Notice::new(message, severity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_sink_keeps_order_and_drains() {
        let sink = CollectingSink::new();
        sink.notify("first", Severity::Warning);
        sink.notice(&Notice::new("second", Severity::Error));

        let notices = sink.drain();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].message, "first");
        assert_eq!(notices[1].severity, Severity::Error);
        assert!(sink.notices().is_empty());
    }
}
