//! Error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Bridge command failed on {serial}: {reason}")]
    Bridge { serial: String, reason: String },

    #[error("Step {index} ({step_type}) failed: {reason}")]
    StepFailed {
        index: usize,
        step_type: String,
        reason: String,
    },

    #[error("Workflow '{name}' failed to load: {reason}")]
    WorkflowLoad { name: String, reason: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Device {serial} is busy")]
    DeviceBusy { serial: String },

    #[error("Device not found: {serial}")]
    DeviceNotFound { serial: String },

    #[error("Template not found: {name}")]
    TemplateNotFound { name: String },

    #[error("Workflow not found: {name}")]
    WorkflowNotFound { name: String },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Other error: {message}")]
    Other { message: String },
}

impl EngineError {
    pub fn bridge(serial: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Bridge {
            serial: serial.into(),
            reason: reason.into(),
        }
    }

    pub fn step_failed(
        index: usize,
        step_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StepFailed {
            index,
            step_type: step_type.into(),
            reason: reason.into(),
        }
    }

    pub fn workflow_load(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WorkflowLoad {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn device_busy(serial: impl Into<String>) -> Self {
        Self::DeviceBusy {
            serial: serial.into(),
        }
    }

    pub fn template_not_found(name: impl Into<String>) -> Self {
        Self::TemplateNotFound { name: name.into() }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Whether this error indicates the device channel itself is unusable,
    /// as opposed to a single step missing its observation budget.
    pub fn is_bridge(&self) -> bool {
        matches!(self, Self::Bridge { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
