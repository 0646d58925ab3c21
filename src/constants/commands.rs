//! Command names and adb argument vocabulary.

/// The adb binary name, resolved through PATH when no explicit path is set
pub const ADB: &str = "adb";

/// Flag selecting a device by serial
pub const SERIAL_FLAG: &str = "-s";

/// adb subcommands
pub const DEVICES: &str = "devices";
pub const SHELL: &str = "shell";
pub const EXEC_OUT: &str = "exec-out";
pub const PUSH: &str = "push";
pub const PULL: &str = "pull";

/// Shell commands issued on the device
pub const SCREENCAP: &str = "screencap";
pub const SCREENCAP_PNG_FLAG: &str = "-p";
pub const INPUT: &str = "input";
pub const INPUT_TAP: &str = "tap";
pub const INPUT_SWIPE: &str = "swipe";
pub const INPUT_KEYEVENT: &str = "keyevent";
pub const ACTIVITY_MANAGER: &str = "am";
pub const AM_START: &str = "start";
pub const AM_START_COMPONENT_FLAG: &str = "-n";
pub const AM_FORCE_STOP: &str = "force-stop";
pub const WINDOW_MANAGER: &str = "wm";
pub const WM_SIZE: &str = "size";
