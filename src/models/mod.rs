//! Core data structures and domain models.

pub mod account;
pub mod device;
pub mod error;
pub mod job;
pub mod template;
pub mod workflow;

pub use account::AccountTask;
pub use device::{AssignedTask, DeviceEntry, DeviceRuntime, DeviceStatus};
pub use error::{EngineError, EngineResult};
pub use job::{JobSettings, JobSnapshot, JobState};
pub use template::Template;
pub use workflow::{OnMatchAction, StepAction, Workflow, WorkflowStep};
