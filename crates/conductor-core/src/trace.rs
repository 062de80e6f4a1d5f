//! Per-request execution trace.
//!
//! Every step of a request is appended here and the whole sequence is handed
//! back to the caller with the reply (or with the failure envelope). Entries
//! are mirrored to `tracing` so process logs tell the same story.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a [`TraceEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TraceLevel {
    /// Routine progress.
    Info,
    /// A step that finished well.
    Success,
    /// Degraded but recoverable.
    Warn,
    /// A failure.
    Error,
    /// Model activity (completion calls and their outcome).
    Ai,
}

/// One step of the execution trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// When the step was recorded. Never earlier than the previous entry.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: TraceLevel,
    /// Component that produced the entry (e.g. `registry`, `dispatcher`).
    pub component: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details, with secret-looking keys redacted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

const SECRET_KEYS: &[&str] = &[
    "api_key",
    "apikey",
    "x-api-key",
    "authorization",
    "password",
    "secret",
    "access_token",
    "refresh_token",
];

const REDACTED: &str = "[REDACTED]";

/// Append-only, time-ordered log of one request.
#[derive(Debug, Default, Clone)]
pub struct ExecutionTracer {
    entries: Vec<TraceEntry>,
}

impl ExecutionTracer {
    /// Creates an empty tracer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry without details.
    pub fn log(&mut self, level: TraceLevel, component: &str, message: impl Into<String>) {
        self.push(level, component, message.into(), None);
    }

    /// Appends an entry with structured details.
    pub fn log_with(
        &mut self,
        level: TraceLevel,
        component: &str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) {
        self.push(level, component, message.into(), Some(redact_secrets(details)));
    }

    /// Shorthand for an [`TraceLevel::Info`] entry.
    pub fn info(&mut self, component: &str, message: impl Into<String>) {
        self.log(TraceLevel::Info, component, message);
    }

    /// Shorthand for a [`TraceLevel::Success`] entry.
    pub fn success(&mut self, component: &str, message: impl Into<String>) {
        self.log(TraceLevel::Success, component, message);
    }

    /// Shorthand for a [`TraceLevel::Warn`] entry.
    pub fn warn(&mut self, component: &str, message: impl Into<String>) {
        self.log(TraceLevel::Warn, component, message);
    }

    /// Shorthand for an [`TraceLevel::Error`] entry.
    pub fn error(&mut self, component: &str, message: impl Into<String>) {
        self.log(TraceLevel::Error, component, message);
    }

    /// Entries recorded so far.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Number of entries recorded so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the tracer, returning its entries.
    pub fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }

    fn push(
        &mut self,
        level: TraceLevel,
        component: &str,
        message: String,
        details: Option<serde_json::Value>,
    ) {
        let now = Utc::now();
        // Wall clocks can step backwards; keep the sequence ordered.
        let timestamp = match self.entries.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };

        match level {
            TraceLevel::Error => tracing::error!(component, "{message}"),
            TraceLevel::Warn => tracing::warn!(component, "{message}"),
            TraceLevel::Info | TraceLevel::Success | TraceLevel::Ai => {
                tracing::info!(component, level = ?level, "{message}");
            }
        }

        self.entries.push(TraceEntry {
            timestamp,
            level,
            component: component.to_string(),
            message,
            details,
        });
    }
}

/// Replaces the value of every secret-looking object key with a marker.
pub fn redact_secrets(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let lower = k.to_ascii_lowercase();
                    if SECRET_KEYS.contains(&lower.as_str()) {
                        (k, serde_json::Value::String(REDACTED.to_string()))
                    } else {
                        (k, redact_secrets(v))
                    }
                })
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(redact_secrets).collect())
        }
        other => other,
    }
}

/// Shortens `text` to at most `max_chars` characters, appending an ellipsis
/// when something was cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
