//! Android-specific constants and identifiers.

/// Android emulator serial number prefix
pub const EMULATOR_SERIAL_PREFIX: &str = "emulator-";

/// ADB device state strings as printed by `adb devices`
pub const ADB_DEVICE_STATE: &str = "device";
pub const ADB_OFFLINE_STATE: &str = "offline";
pub const ADB_UNAUTHORIZED_STATE: &str = "unauthorized";

/// Android keyevent code for the BACK key
pub const KEYCODE_BACK: u32 = 4;

/// Default remote path the target game reads its account file from.
/// Confirm against the target app before shipping a new game profile.
pub const DEFAULT_ACCOUNT_REMOTE_PATH: &str =
    "/sdcard/Android/data/com.linecorp.LGRGS/files/account.xml";

/// Default target application package and launch activity
pub const DEFAULT_TARGET_PACKAGE: &str = "com.linecorp.LGRGS";
pub const DEFAULT_TARGET_ACTIVITY: &str = "com.linecorp.LGRGS.LineRangersActivity";
