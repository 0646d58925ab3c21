//! Default values for workflow step parameters and engine settings.

/// Default template-match confidence threshold
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.8;

/// Default polling interval for observation steps, in seconds
pub const DEFAULT_RETRY_INTERVAL: f64 = 1.0;

/// Default observation budget, in seconds
pub const DEFAULT_MAX_WAIT_SECONDS: f64 = 30.0;

/// Default color-poll interval, in seconds
pub const DEFAULT_CHECK_INTERVAL: f64 = 0.5;

/// Default per-channel color tolerance
pub const DEFAULT_COLOR_TOLERANCE: u8 = 10;

/// loop_click defaults
pub const DEFAULT_LOOP_MAX_ITERATIONS: u32 = 20;
pub const DEFAULT_NOT_FOUND_THRESHOLD: u32 = 3;
pub const DEFAULT_CLICK_DELAY: f64 = 0.5;
pub const DEFAULT_RETRY_DELAY: f64 = 1.0;

/// repeat_group default iteration bound
pub const DEFAULT_GROUP_MAX_ITERATIONS: u32 = 50;

/// Account files scanned from a batch folder
pub const DEFAULT_ACCOUNT_EXTENSION: &str = "xml";

/// Broadcast capacity of the status bus; lagged observers drop events
pub const STATUS_BUS_CAPACITY: usize = 256;
