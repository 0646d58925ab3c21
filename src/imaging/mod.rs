//! Screenshot decoding and template matching.

pub mod frame;
pub mod matcher;

pub use frame::Frame;
pub use matcher::{best_match, match_all, Match};
