//! Severity-gated logging
//!
//! The run loop and key actions report through a [`LogSink`] instead of a
//! global logger. The sink owns a runtime-adjustable threshold (the `;` and
//! `'` keys move it) and drops lines below it.
//!
//! - [`TracingLog`] forwards accepted lines to `tracing`
//! - [`MemoryLog`] keeps them in memory (tests, headless reports)

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log line severity, ascending
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Severity {
    Trace = 0,
    Debug = 1,
    #[default]
    Info = 2,
    Status = 3,
    Warning = 4,
    Error = 5,
}

impl Severity {
    const ALL: [Severity; 6] = [
        Severity::Trace,
        Severity::Debug,
        Severity::Info,
        Severity::Status,
        Severity::Warning,
        Severity::Error,
    ];

    fn from_u8(raw: u8) -> Self {
        Self::ALL[(raw as usize).min(Self::ALL.len() - 1)]
    }

    /// Next level up, saturating at `Error`
    pub fn raised(self) -> Self {
        Self::from_u8(self as u8 + 1)
    }

    /// Next level down, saturating at `Trace`
    pub fn lowered(self) -> Self {
        Self::from_u8((self as u8).saturating_sub(1))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace => write!(f, "TRACE"),
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Status => write!(f, "STATUS"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Logging collaborator shared by the key table, the run state and the loop
pub trait LogSink: Send + Sync {
    /// Emit a line if `severity` is at or above the current threshold
    fn log(&self, severity: Severity, message: &str);

    /// Current threshold
    fn threshold(&self) -> Severity;

    /// Raise the threshold one level (fewer lines)
    fn increment_severity(&self);

    /// Lower the threshold one level (more lines)
    fn decrement_severity(&self);

    fn trace(&self, message: &str) {
        self.log(Severity::Trace, message);
    }

    fn status(&self, message: &str) {
        self.log(Severity::Status, message);
    }

    fn warning(&self, message: &str) {
        self.log(Severity::Warning, message);
    }
}

/// Atomic threshold shared by both sink implementations
#[derive(Debug)]
struct Threshold(AtomicU8);

impl Threshold {
    fn new(level: Severity) -> Self {
        Self(AtomicU8::new(level as u8))
    }

    fn get(&self) -> Severity {
        Severity::from_u8(self.0.load(Ordering::Relaxed))
    }

    fn update(&self, f: impl Fn(Severity) -> Severity) -> Severity {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = f(Severity::from_u8(current)) as u8;
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return Severity::from_u8(next),
                Err(actual) => current = actual,
            }
        }
    }

    fn accepts(&self, severity: Severity) -> bool {
        severity >= self.get()
    }
}

/// Sink that forwards accepted lines to `tracing`
#[derive(Debug)]
pub struct TracingLog {
    threshold: Threshold,
}

impl TracingLog {
    pub fn new(threshold: Severity) -> Self {
        Self {
            threshold: Threshold::new(threshold),
        }
    }

    pub fn shared(threshold: Severity) -> Arc<dyn LogSink> {
        Arc::new(Self::new(threshold))
    }
}

impl Default for TracingLog {
    fn default() -> Self {
        Self::new(Severity::default())
    }
}

impl LogSink for TracingLog {
    fn log(&self, severity: Severity, message: &str) {
        if !self.threshold.accepts(severity) {
            return;
        }
        match severity {
            Severity::Trace => tracing::trace!(severity = %severity, "{}", message),
            Severity::Debug => tracing::debug!(severity = %severity, "{}", message),
            Severity::Info | Severity::Status => {
                tracing::info!(severity = %severity, "{}", message)
            }
            Severity::Warning => tracing::warn!(severity = %severity, "{}", message),
            Severity::Error => tracing::error!(severity = %severity, "{}", message),
        }
    }

    fn threshold(&self) -> Severity {
        self.threshold.get()
    }

    fn increment_severity(&self) {
        let now = self.threshold.update(Severity::raised);
        tracing::info!("log severity threshold is now {}", now);
    }

    fn decrement_severity(&self) {
        let now = self.threshold.update(Severity::lowered);
        tracing::info!("log severity threshold is now {}", now);
    }
}

/// A recorded line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub severity: Severity,
    pub message: String,
}

/// Sink that keeps accepted lines in memory
///
/// Cloning shares the same buffer and threshold.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    lines: Arc<Mutex<Vec<LogLine>>>,
    threshold: Arc<Threshold>,
}

impl MemoryLog {
    pub fn new(threshold: Severity) -> Self {
        Self {
            lines: Arc::new(Mutex::new(Vec::new())),
            threshold: Arc::new(Threshold::new(threshold)),
        }
    }

    /// All recorded lines (cloned)
    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().clone()
    }

    /// Recorded lines of exactly `severity`
    pub fn at(&self, severity: Severity) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|l| l.severity == severity)
            .map(|l| l.message.clone())
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.at(Severity::Warning)
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.message.contains(needle))
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Default for MemoryLog {
    /// Records everything
    fn default() -> Self {
        Self::new(Severity::Trace)
    }
}

impl LogSink for MemoryLog {
    fn log(&self, severity: Severity, message: &str) {
        if self.threshold.accepts(severity) {
            self.lines.lock().push(LogLine {
                severity,
                message: message.to_string(),
            });
        }
    }

    fn threshold(&self) -> Severity {
        self.threshold.get()
    }

    fn increment_severity(&self) {
        self.threshold.update(Severity::raised);
    }

    fn decrement_severity(&self) {
        self.threshold.update(Severity::lowered);
    }
}
