//! Shared utility functions and helpers.

pub mod logger;

pub use logger::setup_logger;
