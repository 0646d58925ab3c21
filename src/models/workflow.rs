//! Workflow and step definitions.
//!
//! A workflow is an ordered program of typed steps executed against one
//! device. Steps are a tagged sum (`step_type` discriminates) with
//! per-variant fields; the interpreter is a match over the tag.
//!
//! # Workflow JSON
//!
//! ```json
//! { "id": 3, "name": "daily-login", "description": "claim rewards",
//!   "screen_width": 1080, "screen_height": 1920,
//!   "is_master": true,
//!   "mode_name": "daily_login", "month_year": "2026-08",
//!   "steps": [
//!     { "order_index": 0, "step_type": "start_game" },
//!     { "order_index": 1, "step_type": "image_match",
//!       "template_ref": "login_button", "threshold": 0.8,
//!       "max_wait_seconds": 30, "retry_interval": 1.0,
//!       "skip_if_not_found": false, "on_match_action": "tap_center" }
//!   ] }
//! ```
//!
//! Rows persisted by older front-ends store some nested fields as strings
//! (`"expected_color": "[30, 144, 255]"`); those are parsed on load.

use crate::constants::defaults::{
    DEFAULT_CHECK_INTERVAL, DEFAULT_CLICK_DELAY, DEFAULT_COLOR_TOLERANCE,
    DEFAULT_GROUP_MAX_ITERATIONS, DEFAULT_LOOP_MAX_ITERATIONS, DEFAULT_MATCH_THRESHOLD,
    DEFAULT_MAX_WAIT_SECONDS, DEFAULT_NOT_FOUND_THRESHOLD, DEFAULT_RETRY_DELAY,
    DEFAULT_RETRY_INTERVAL,
};
use crate::models::error::{EngineError, EngineResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};

/// An ordered step program bound to a canonical screen resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Resolution the workflow (and its templates) were authored at
    pub screen_width: u32,
    pub screen_height: u32,
    /// At most one workflow in the repository is the master
    #[serde(default)]
    pub is_master: bool,
    #[serde(default)]
    pub mode_name: Option<String>,
    /// "YYYY-MM" the workflow applies to, for month-scoped modes
    #[serde(default)]
    pub month_year: Option<String>,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

/// One record in a workflow. Common fields plus the typed action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    pub order_index: usize,
    #[serde(default)]
    pub description: Option<String>,
    /// Group label; `repeat_group` steps drive steps sharing a label
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(flatten)]
    pub action: StepAction,
}

/// What to do when an `image_match` step finds its template.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnMatchAction {
    #[default]
    TapCenter,
    None,
}

/// The typed step sum. Coordinates are in workflow space; the interpreter
/// scales them to the device's native resolution before injection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "step_type", rename_all = "snake_case")]
pub enum StepAction {
    Click {
        x: i64,
        y: i64,
    },
    Swipe {
        x: i64,
        y: i64,
        end_x: i64,
        end_y: i64,
        swipe_duration_ms: u64,
    },
    Wait {
        wait_duration_ms: u64,
    },
    WaitForColor {
        x: i64,
        y: i64,
        /// Expected pixel in (B, G, R) channel order
        #[serde(deserialize_with = "bgr_from_value")]
        expected_color: [u8; 3],
        #[serde(default = "default_tolerance")]
        tolerance: u8,
        #[serde(default = "default_max_wait")]
        max_wait_seconds: f64,
        #[serde(default = "default_check_interval")]
        check_interval: f64,
    },
    ImageMatch {
        template_ref: String,
        #[serde(default = "default_threshold")]
        threshold: f32,
        #[serde(default = "default_max_wait")]
        max_wait_seconds: f64,
        #[serde(default)]
        max_retries: Option<u32>,
        #[serde(default = "default_retry_interval")]
        retry_interval: f64,
        #[serde(default)]
        skip_if_not_found: bool,
        #[serde(default)]
        on_match_action: OnMatchAction,
    },
    FindAllClick {
        template_ref: String,
        #[serde(default = "default_threshold")]
        threshold: f32,
        #[serde(default)]
        match_all: bool,
    },
    LoopClick {
        template_ref: String,
        #[serde(default = "default_threshold")]
        threshold: f32,
        #[serde(default = "default_loop_max_iterations")]
        max_iterations: u32,
        #[serde(default = "default_not_found_threshold")]
        not_found_threshold: u32,
        #[serde(default = "default_click_delay")]
        click_delay: f64,
        #[serde(default = "default_retry_delay")]
        retry_delay: f64,
    },
    RepeatGroup {
        loop_group_name: String,
        #[serde(default)]
        stop_template_ref: Option<String>,
        #[serde(default)]
        stop_on_not_found: bool,
        #[serde(default = "default_group_max_iterations")]
        loop_max_iterations: u32,
        #[serde(default = "default_threshold")]
        threshold: f32,
    },
    PressBack,
    StartGame,
    RestartGame,
}

impl StepAction {
    /// The `step_type` tag, for logs and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::Swipe { .. } => "swipe",
            Self::Wait { .. } => "wait",
            Self::WaitForColor { .. } => "wait_for_color",
            Self::ImageMatch { .. } => "image_match",
            Self::FindAllClick { .. } => "find_all_click",
            Self::LoopClick { .. } => "loop_click",
            Self::RepeatGroup { .. } => "repeat_group",
            Self::PressBack => "press_back",
            Self::StartGame => "start_game",
            Self::RestartGame => "restart_game",
        }
    }

    /// Template name this step observes, if any.
    pub fn template_ref(&self) -> Option<&str> {
        match self {
            Self::ImageMatch { template_ref, .. }
            | Self::FindAllClick { template_ref, .. }
            | Self::LoopClick { template_ref, .. } => Some(template_ref),
            Self::RepeatGroup {
                stop_template_ref, ..
            } => stop_template_ref.as_deref(),
            _ => None,
        }
    }
}

impl Workflow {
    /// Steps sorted by ascending `order_index`.
    pub fn ordered_steps(&self) -> Vec<&WorkflowStep> {
        let mut steps: Vec<&WorkflowStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order_index);
        steps
    }

    /// Members of a group, preserving their relative order.
    pub fn group_steps(&self, group: &str) -> Vec<&WorkflowStep> {
        self.ordered_steps()
            .into_iter()
            .filter(|s| s.group_name.as_deref() == Some(group))
            .collect()
    }

    /// Validates structural invariants before execution. Rejected workflows
    /// must not run.
    ///
    /// Checked here: contiguous `order_index` from 0, `repeat_group`
    /// referencing an existing group, and no cycle in the group-drive graph
    /// (a `repeat_group` must never reach its own containing group, directly
    /// or through nested groups). Template resolution is checked separately
    /// against the template store.
    pub fn validate(&self) -> EngineResult<()> {
        let mut indices: Vec<usize> = self.steps.iter().map(|s| s.order_index).collect();
        indices.sort_unstable();
        for (expected, actual) in indices.iter().enumerate() {
            if *actual != expected {
                return Err(EngineError::workflow_load(
                    &self.name,
                    format!("order_index not contiguous: expected {expected}, found {actual}"),
                ));
            }
        }

        let groups: HashSet<&str> = self
            .steps
            .iter()
            .filter_map(|s| s.group_name.as_deref())
            .collect();

        for step in &self.steps {
            if let StepAction::RepeatGroup {
                loop_group_name, ..
            } = &step.action
            {
                if !groups.contains(loop_group_name.as_str()) {
                    return Err(EngineError::workflow_load(
                        &self.name,
                        format!(
                            "step {} repeats unknown group '{}'",
                            step.order_index, loop_group_name
                        ),
                    ));
                }
                if step.group_name.as_deref() == Some(loop_group_name.as_str()) {
                    return Err(EngineError::workflow_load(
                        &self.name,
                        format!(
                            "step {} repeats its own containing group '{}'",
                            step.order_index, loop_group_name
                        ),
                    ));
                }
            }
        }

        self.check_group_cycles()?;
        Ok(())
    }

    /// Validates that every template reference resolves.
    pub fn validate_templates<F>(&self, mut resolves: F) -> EngineResult<()>
    where
        F: FnMut(&str) -> bool,
    {
        for step in &self.steps {
            if let Some(name) = step.action.template_ref() {
                if !resolves(name) {
                    return Err(EngineError::workflow_load(
                        &self.name,
                        format!(
                            "step {} references unknown template '{}'",
                            step.order_index, name
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Rejects cycles in the graph "group A contains a repeat_group driving
    /// group B". Nested repetition over disjoint groups is allowed; any
    /// cycle would recurse without bound.
    fn check_group_cycles(&self) -> EngineResult<()> {
        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in &self.steps {
            if let (Some(container), StepAction::RepeatGroup { loop_group_name, .. }) =
                (step.group_name.as_deref(), &step.action)
            {
                edges.entry(container).or_default().push(loop_group_name);
            }
        }

        // DFS from every group; a back edge to the active path is a cycle.
        let mut visited: HashSet<&str> = HashSet::new();
        for start in edges.keys().copied().collect::<Vec<_>>() {
            let mut on_path: HashSet<&str> = HashSet::new();
            self.dfs_groups(start, &edges, &mut visited, &mut on_path)?;
        }
        Ok(())
    }

    fn dfs_groups<'a>(
        &self,
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
        on_path: &mut HashSet<&'a str>,
    ) -> EngineResult<()> {
        if on_path.contains(node) {
            return Err(EngineError::workflow_load(
                &self.name,
                format!("group repetition cycle through '{node}'"),
            ));
        }
        if visited.contains(node) {
            return Ok(());
        }
        visited.insert(node);
        on_path.insert(node);
        if let Some(next) = edges.get(node) {
            for target in next {
                self.dfs_groups(target, edges, visited, on_path)?;
            }
        }
        on_path.remove(node);
        Ok(())
    }
}

/// Accepts `[30, 144, 255]` both as a JSON array and as its string form,
/// which some persisted rows carry.
fn bgr_from_value<'de, D>(deserializer: D) -> Result<[u8; 3], D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ColorRepr {
        Array([u8; 3]),
        Text(String),
    }

    match ColorRepr::deserialize(deserializer)? {
        ColorRepr::Array(bgr) => Ok(bgr),
        ColorRepr::Text(text) => serde_json::from_str(&text).map_err(serde::de::Error::custom),
    }
}

fn default_threshold() -> f32 {
    DEFAULT_MATCH_THRESHOLD
}
fn default_max_wait() -> f64 {
    DEFAULT_MAX_WAIT_SECONDS
}
fn default_retry_interval() -> f64 {
    DEFAULT_RETRY_INTERVAL
}
fn default_check_interval() -> f64 {
    DEFAULT_CHECK_INTERVAL
}
fn default_tolerance() -> u8 {
    DEFAULT_COLOR_TOLERANCE
}
fn default_loop_max_iterations() -> u32 {
    DEFAULT_LOOP_MAX_ITERATIONS
}
fn default_not_found_threshold() -> u32 {
    DEFAULT_NOT_FOUND_THRESHOLD
}
fn default_click_delay() -> f64 {
    DEFAULT_CLICK_DELAY
}
fn default_retry_delay() -> f64 {
    DEFAULT_RETRY_DELAY
}
fn default_group_max_iterations() -> u32 {
    DEFAULT_GROUP_MAX_ITERATIONS
}
