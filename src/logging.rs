//! In-memory capture of recent log lines for the `/logs` command.

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A single log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: Level,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    pub fn format(&self) -> String {
        format!(
            "{} {:>5} [{}] {}",
            self.timestamp.format("%m-%d %H:%M:%S"),
            self.level,
            self.target,
            self.message
        )
    }
}

/// Ring buffer of the most recent entries
pub struct LogBuffer {
    recent: parking_lot::RwLock<VecDeque<LogEntry>>,
    max_entries: usize,
}

impl LogBuffer {
    pub fn new(max_entries: usize) -> Self {
        Self {
            recent: parking_lot::RwLock::new(VecDeque::with_capacity(max_entries)),
            max_entries,
        }
    }

    pub fn push(&self, entry: LogEntry) {
        let mut recent = self.recent.write();
        if recent.len() >= self.max_entries {
            recent.pop_front();
        }
        recent.push_back(entry);
    }

    /// Last `count` entries at `min_level` or more severe, oldest first
    pub fn get_recent(&self, count: usize, min_level: Level) -> Vec<LogEntry> {
        let recent = self.recent.read();
        // tracing orders levels by verbosity: ERROR < WARN < INFO
        let mut matching: Vec<LogEntry> = recent
            .iter()
            .rev()
            .filter(|entry| entry.level <= min_level)
            .take(count)
            .cloned()
            .collect();
        matching.reverse();
        matching
    }
}

/// Shared log buffer type
pub type SharedLogBuffer = Arc<LogBuffer>;

pub fn create_log_buffer(max_entries: usize) -> SharedLogBuffer {
    Arc::new(LogBuffer::new(max_entries))
}

/// Tracing layer that copies every event into the buffer
pub struct LogCaptureLayer {
    buffer: SharedLogBuffer,
}

impl LogCaptureLayer {
    pub fn new(buffer: SharedLogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S> Layer<S> for LogCaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(LogEntry {
            timestamp: chrono::Utc::now(),
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else if self.message.is_empty() {
            self.message = format!("{}={}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: Level, message: &str) -> LogEntry {
        LogEntry {
            timestamp: chrono::Utc::now(),
            level,
            target: "clanwarden".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_log_buffer_overflow() {
        let buffer = create_log_buffer(2);
        for i in 1..=5 {
            buffer.push(entry(Level::INFO, &format!("Message {}", i)));
        }

        let recent = buffer.get_recent(10, Level::TRACE);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "Message 4");
        assert_eq!(recent[1].message, "Message 5");
    }

    #[test]
    fn test_level_filter() {
        let buffer = create_log_buffer(10);
        buffer.push(entry(Level::WARN, "role sync failed"));
        buffer.push(entry(Level::INFO, "tick"));
        buffer.push(entry(Level::ERROR, "api down"));
        buffer.push(entry(Level::DEBUG, "noise"));

        let warnings: Vec<String> = buffer
            .get_recent(10, Level::WARN)
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(warnings, vec!["role sync failed", "api down"]);

        assert_eq!(buffer.get_recent(1, Level::INFO)[0].message, "api down");
    }
}
