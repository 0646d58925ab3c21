//! Persistent stores for workflows and templates.

pub mod templates;
pub mod workflows;

pub use templates::{CaptureRegion, TemplateStore};
pub use workflows::WorkflowRepo;
