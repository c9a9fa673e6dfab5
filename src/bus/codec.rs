//! Export codec
//!
//! Indented JSON array of entries. The persistence mirror writes the same
//! format, so an export can be loaded back as history.

use chrono::{DateTime, Local};

use super::entry::LogEntry;

/// Serialize entries as indented JSON
pub fn encode(entries: &[LogEntry]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(entries)
}

/// Parse text produced by `encode`
pub fn decode(text: &str) -> serde_json::Result<Vec<LogEntry>> {
    serde_json::from_str(text)
}

/// File name for an export taken at `now`
pub fn export_file_name(now: DateTime<Local>) -> String {
    format!("logbus-export-{}.json", now.format("%Y-%m-%d_%H-%M-%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::entry::{LogLevel, Metadata};
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> Vec<LogEntry> {
        let mut metadata = Metadata::new();
        metadata.insert("model".to_string(), json!("gpt"));
        metadata.insert("tokens".to_string(), json!({"prompt": 12, "completion": 40}));

        vec![
            LogEntry::new(LogLevel::Api, "POST /chat", Some("ChatClient"), Some(metadata)),
            LogEntry::new(LogLevel::Error, "request failed", Some("ChatClient"), None),
            LogEntry::new(LogLevel::User, "clicked send", None, None),
        ]
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let entries = sample();
        let text = encode(&entries).unwrap();
        let decoded = decode(&text).unwrap();
        assert_eq!(decoded, entries);
        assert!(decoded[1].stack.is_some());
    }

    #[test]
    fn test_export_is_indented_with_text_timestamps() {
        let entries = sample();
        let text = encode(&entries).unwrap();
        assert!(text.starts_with("[\n  {"));

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let first = &value[0];
        let timestamp = first["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert_eq!(first["metadata"]["tokens"]["completion"], json!(40));
        assert_eq!(first["level"], json!("api"));
    }

    #[test]
    fn test_decode_accepts_minimal_records() {
        let text = r#"[{"id":"1700000000000-abc123def","timestamp":"2026-01-21T14:30:45.123Z","level":"warn","message":"slow"}]"#;
        let decoded = decode(text).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].level, LogLevel::Warn);
        assert!(decoded[0].context.is_none());
        assert_eq!(decoded[0].timestamp.timestamp_subsec_millis(), 123);
    }

    #[test]
    fn test_decode_rejects_truncated_text() {
        assert!(decode(r#"[{"id":"1","#).is_err());
    }

    #[test]
    fn test_empty_export() {
        assert_eq!(encode(&[]).unwrap(), "[]");
    }

    #[test]
    fn test_export_file_name() {
        let now = Local.with_ymd_and_hms(2026, 1, 21, 14, 30, 45).unwrap();
        assert_eq!(export_file_name(now), "logbus-export-2026-01-21_14-30-45.json");
    }
}
