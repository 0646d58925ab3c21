//! Logging setup.

use anyhow::Result;
use log::LevelFilter;
use std::str::FromStr;

/// Initializes env_logger with the given level, timestamped, without
/// module paths. `RUST_LOG` still takes precedence.
pub fn setup_logger(level: &str) -> Result<()> {
    let log_level = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .try_init()?;

    Ok(())
}
