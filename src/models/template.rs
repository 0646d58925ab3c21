//! Template metadata.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A named reference image authored at workflow resolution.
///
/// Templates are immutable once captured; replacing a name writes a new
/// file with a timestamp suffix and points the record at it. Old files are
/// retained on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub id: i64,
    /// Globally unique name used by workflow steps as `template_ref`
    pub name: String,
    /// PNG file location under the template content root
    pub file_path: PathBuf,
    pub width: u32,
    pub height: u32,
}
