//! Application-wide constants and configuration values.
//!
//! This module centralizes constant values used throughout the engine,
//! including adb command vocabulary, Android keycodes and paths, default
//! step parameters, file layout names, and timeout durations.

pub mod android;
pub mod commands;
pub mod defaults;
pub mod files;
pub mod timeouts;
