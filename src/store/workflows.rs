//! Workflow repository.
//!
//! CRUD over workflows with JSON-file persistence under the data dir.
//! Readers share the lock; mutations are exclusive and saved in one write,
//! so invariants like "at most one master" hold at every observable point.
//! Running jobs bind their workflow at start and never observe mid-run
//! mutations.

use crate::models::error::{EngineError, EngineResult};
use crate::models::workflow::Workflow;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepoInner {
    next_id: i64,
    workflows: Vec<Workflow>,
}

pub struct WorkflowRepo {
    path: PathBuf,
    inner: RwLock<RepoInner>,
}

impl WorkflowRepo {
    /// Opens the repository file, creating an empty one lazily.
    pub async fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();
        let inner = if path.exists() {
            let text = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&text)?
        } else {
            RepoInner {
                next_id: 1,
                workflows: Vec::new(),
            }
        };
        Ok(Self {
            path,
            inner: RwLock::new(inner),
        })
    }

    async fn save(&self, inner: &RepoInner) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(inner)?;
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Validates and stores a new workflow, allocating its id. A workflow
    /// arriving with `is_master` set steals the flag from any current
    /// master within the same save.
    pub async fn create(&self, mut workflow: Workflow) -> EngineResult<Workflow> {
        workflow.validate()?;
        let mut inner = self.inner.write().await;
        if inner.workflows.iter().any(|w| w.name == workflow.name) {
            return Err(EngineError::validation(format!(
                "workflow '{}' already exists",
                workflow.name
            )));
        }
        workflow.id = Some(inner.next_id);
        inner.next_id += 1;
        if workflow.is_master {
            for existing in &mut inner.workflows {
                existing.is_master = false;
            }
        }
        inner.workflows.push(workflow.clone());
        self.save(&inner).await?;
        Ok(workflow)
    }

    /// Replaces an existing workflow's content, keeping its id.
    pub async fn update(&self, id: i64, mut workflow: Workflow) -> EngineResult<Workflow> {
        workflow.validate()?;
        let mut inner = self.inner.write().await;
        if workflow.is_master {
            for existing in &mut inner.workflows {
                existing.is_master = false;
            }
        }
        let slot = inner
            .workflows
            .iter_mut()
            .find(|w| w.id == Some(id))
            .ok_or_else(|| EngineError::WorkflowNotFound {
                name: format!("id {id}"),
            })?;
        workflow.id = Some(id);
        *slot = workflow.clone();
        self.save(&inner).await?;
        Ok(workflow)
    }

    pub async fn delete(&self, id: i64) -> EngineResult<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.workflows.len();
        inner.workflows.retain(|w| w.id != Some(id));
        let removed = inner.workflows.len() != before;
        if removed {
            self.save(&inner).await?;
        }
        Ok(removed)
    }

    pub async fn get(&self, id: i64) -> Option<Workflow> {
        self.inner
            .read()
            .await
            .workflows
            .iter()
            .find(|w| w.id == Some(id))
            .cloned()
    }

    pub async fn get_by_name(&self, name: &str) -> Option<Workflow> {
        self.inner
            .read()
            .await
            .workflows
            .iter()
            .find(|w| w.name == name)
            .cloned()
    }

    pub async fn list(&self) -> Vec<Workflow> {
        self.inner.read().await.workflows.clone()
    }

    /// Atomically clears the current master and sets the target: one write
    /// lock, one save.
    pub async fn set_master(&self, id: i64) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.workflows.iter().any(|w| w.id == Some(id)) {
            return Err(EngineError::WorkflowNotFound {
                name: format!("id {id}"),
            });
        }
        for workflow in &mut inner.workflows {
            workflow.is_master = workflow.id == Some(id);
        }
        self.save(&inner).await?;
        Ok(())
    }

    pub async fn master(&self) -> Option<Workflow> {
        self.inner
            .read()
            .await
            .workflows
            .iter()
            .find(|w| w.is_master)
            .cloned()
    }

    /// Most recent workflow for a mode and month. `None` month means the
    /// current device-local calendar month.
    pub async fn find_by_mode(&self, mode_name: &str, month_year: Option<&str>) -> Option<Workflow> {
        let month = month_year
            .map(str::to_string)
            .unwrap_or_else(current_month_year);
        self.inner
            .read()
            .await
            .workflows
            .iter()
            .filter(|w| {
                w.mode_name.as_deref() == Some(mode_name)
                    && w.month_year.as_deref() == Some(month.as_str())
            })
            .max_by_key(|w| w.id)
            .cloned()
    }
}

/// "YYYY-MM" for the local calendar month.
pub fn current_month_year() -> String {
    Local::now().format("%Y-%m").to_string()
}
