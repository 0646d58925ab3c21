//! Batch utilities built on the device channel and the filesystem.

pub mod duplicates;
pub mod export;

pub use duplicates::{DuplicateFinder, DuplicatePair, DuplicateReport};
pub use export::{AccountExporter, ExportedAccount};
