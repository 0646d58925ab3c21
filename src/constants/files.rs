//! File and directory layout names.

/// Workflow repository file under the data dir
pub const WORKFLOWS_FILE: &str = "workflows.json";

/// Template content root under the data dir
pub const TEMPLATES_DIR: &str = "templates";

/// Template metadata file inside the template root
pub const TEMPLATES_FILE: &str = "templates.json";

/// Subfolder of the source folder that completed accounts move into
pub const DONE_DIR_NAME: &str = "done";

/// Prefix for local scratch files used by push/pull transfers
pub const TRANSFER_SCRATCH_PREFIX: &str = "droidflow-xfer";

/// Application data directory name
pub const APP_DIR_NAME: &str = "droidflow";
