//! Android debug bridge plumbing: command execution, per-device channels,
//! and fleet discovery.

pub mod channel;
pub mod executor;
pub mod registry;

pub use channel::DeviceChannel;
pub use executor::{CommandExecutor, CommandRunner};
pub use registry::DeviceRegistry;
