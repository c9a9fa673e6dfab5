//! Log entries and their levels
//!
//! A `LogEntry` is created once by `LogEntry::new` and never mutated afterwards.

use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supplementary structured data attached to an entry
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Severity or category of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Success,
    Api,
    User,
}

impl LogLevel {
    /// Every level, in declaration order
    pub const ALL: [LogLevel; 7] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Success,
        LogLevel::Api,
        LogLevel::User,
    ];

    /// Get the wire name for this level
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Success => "success",
            LogLevel::Api => "api",
            LogLevel::User => "user",
        }
    }

    /// Check if this level is a warning or error
    pub fn is_alert(&self) -> bool {
        matches!(self, LogLevel::Warn | LogLevel::Error)
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a level
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct UnknownLevel(pub String);

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownLevel(s.to_string()))
    }
}

/// Unique identifier of an entry
///
/// Millisecond timestamp plus a random suffix, so ids minted in the same
/// millisecond still differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Generate a fresh id
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", now.timestamp_millis(), &suffix[..9]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single structured diagnostic record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique identifier
    pub id: EntryId,
    /// Creation instant
    pub timestamp: DateTime<Utc>,
    /// Severity or category
    pub level: LogLevel,
    /// Free-form message
    pub message: String,
    /// Logical operation or component that emitted the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Supplementary structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// Call stack captured at creation, `error` entries only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl LogEntry {
    /// Create a new log entry stamped with the current time
    ///
    /// The stack is captured for `LogLevel::Error` only. It points at the
    /// logging call site, not necessarily at the fault origin.
    pub fn new(
        level: LogLevel,
        message: impl Into<String>,
        context: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Self {
        let timestamp = Utc::now();
        let stack = (level == LogLevel::Error)
            .then(|| Backtrace::force_capture().to_string());

        Self {
            id: EntryId::generate(timestamp),
            timestamp,
            level,
            message: message.into(),
            context: context.map(str::to_string),
            metadata,
            stack,
        }
    }

    /// Set the context label
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set the metadata map
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
