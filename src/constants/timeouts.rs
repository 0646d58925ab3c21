//! Timeout and delay constants for various operations.

use std::time::Duration;

/// Transient bridge errors are retried this many times at the call site
pub const BRIDGE_RETRY_LIMIT: u32 = 3;

/// Delay between bridge retries
pub const BRIDGE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Longest uninterruptible sleep slice; longer waits poll the cancel token
pub const CANCEL_SLICE: Duration = Duration::from_millis(100);

/// Device registry poll interval
pub const DEVICE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Wait after restart_game for the app to cold-start
pub const COLD_START_WAIT: Duration = Duration::from_secs(20);
