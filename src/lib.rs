//! Droidflow - a multi-device Android automation engine.
//!
//! This library drives fleets of Android emulators through the debug
//! bridge, executing image-matching workflows against each device. The
//! flagship workload is the daily-login batch: account state files pushed
//! one by one into each device from a shared queue, the game launched and
//! rewards claimed via workflow, then the next account taken.
//!
//! # Architecture Overview
//!
//! - [`bridge`] - adb plumbing: command execution, per-device channels,
//!   fleet discovery
//! - [`imaging`] - screenshot decoding and template matching
//! - [`store`] - persistent workflow and template stores
//! - [`engine`] - the workflow interpreter, account queue, job
//!   coordinator, cancellation, and status events
//! - [`batch`] - duplicate finder and account exporter utilities
//! - [`models`] - core data structures and the engine error type
//! - [`constants`] - adb vocabulary, defaults, timeouts, file layout
//!
//! # Concurrency model
//!
//! One worker task per device, each internally sequential: the device
//! channel serializes commands so a screenshot always reflects the input
//! injected before it. Workers share an account queue with linearizable
//! claims and observe a common cancellation token at every sleep slice.

pub mod batch;
pub mod bridge;
pub mod config;
pub mod constants;
pub mod engine;
pub mod imaging;
pub mod models;
pub mod store;
pub mod utils;

pub use config::Config;
pub use engine::{JobCoordinator, StatusBus, WorkflowInterpreter};
pub use models::{EngineError, EngineResult};
