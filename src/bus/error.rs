//! Error types for the persistence mirror

use std::io;

use thiserror::Error;

use crate::config::{categorize_io_error, DiskErrorKind};

/// Failure while reading, writing or decoding the persisted record
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("failed to read persisted logs '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write persisted logs '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove persisted logs '{key}': {source}")]
    Remove {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize logs: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("persisted logs '{key}' are corrupt: {source}")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl MirrorError {
    /// Disk error category for I/O failures, `None` for codec failures
    pub fn disk_error_kind(&self) -> Option<DiskErrorKind> {
        match self {
            MirrorError::Read { source, .. }
            | MirrorError::Write { source, .. }
            | MirrorError::Remove { source, .. } => Some(categorize_io_error(source)),
            MirrorError::Serialize(_) | MirrorError::Parse { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_error_kind_for_io() {
        let err = MirrorError::Write {
            key: "k".to_string(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(err.disk_error_kind(), Some(DiskErrorKind::PermissionDenied));
        assert!(err.to_string().contains("'k'"));
    }

    #[test]
    fn test_disk_error_kind_for_codec() {
        let source = serde_json::from_str::<serde_json::Value>("[").unwrap_err();
        let err = MirrorError::Parse {
            key: "k".to_string(),
            source,
        };
        assert_eq!(err.disk_error_kind(), None);
    }
}
