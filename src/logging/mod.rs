//! Process logging for logbus
//!
//! File-based `tracing` output with retention. This is where the fallback
//! sink and the console mirror end up; it never feeds back into the bus.

mod file_writer;
mod retention;

pub use file_writer::{create_log_file_path, init_file_logging, LogFileInfo, LoggingGuard};
pub use retention::{cleanup_old_logs, cleanup_old_logs_with_retention, DEFAULT_RETENTION_DAYS};
