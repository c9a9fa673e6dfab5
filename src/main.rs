use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use logbus::bus::{FileStorage, LogBus, TracingSink};
use logbus::config::{self, Config};
use logbus::ingest::parse_line;
use logbus::logging;

#[tokio::main]
async fn main() -> Result<()> {
    config::ensure_directories()?;
    let config = Config::load()?;

    // Initialize file logging BEFORE any tracing calls
    let (log_file_info, _guard) =
        logging::init_file_logging(config::logs_dir(), &config.log_filter)?;

    if let Ok(count) =
        logging::cleanup_old_logs_with_retention(&config::logs_dir(), config.log_retention_days)
    {
        if count > 0 {
            tracing::info!("Cleaned up {} old log files", count);
        }
    }

    tracing::info!("Logging to: {}", log_file_info.path.display());

    let bus = Arc::new(LogBus::open(
        config.bus_options(),
        Arc::new(FileStorage::new(config.data_dir.clone())),
        Arc::new(TracingSink),
    ));
    if config.console_mirror {
        bus.mirror_to_console();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if let Some(parsed) = parse_line(&line) {
            bus.append(parsed.level, parsed.message, parsed.context.as_deref(), None);
        }
    }

    for (level, count) in bus.stats().iter() {
        eprintln!("{:>8}: {}", level.as_str(), count);
    }
    println!("{}", bus.export().context("Failed to export logs")?);

    bus.flush_async().await;

    Ok(())
}
