//! Template store.
//!
//! Named reference images under a content root, with a JSON metadata file
//! and a decoded-frame cache. Capture grabs the device screen, rescales to
//! the workflow resolution, crops the requested region, and persists it.
//! Replacing a name writes a fresh file with a timestamp suffix; the old
//! file stays on disk.

use crate::bridge::channel::DeviceChannel;
use crate::constants::files::TEMPLATES_FILE;
use crate::imaging::Frame;
use crate::models::error::{EngineError, EngineResult};
use crate::models::template::Template;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// Rectangle to crop out of a workflow-resolution screenshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreInner {
    next_id: i64,
    templates: Vec<Template>,
}

pub struct TemplateStore {
    root: PathBuf,
    inner: RwLock<StoreInner>,
    cache: Mutex<HashMap<String, Arc<Frame>>>,
}

impl TemplateStore {
    /// Opens the store under `root`, creating the directory on first use.
    pub async fn open(root: impl Into<PathBuf>) -> EngineResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        let meta_path = root.join(TEMPLATES_FILE);
        let inner = if meta_path.exists() {
            let text = tokio::fs::read_to_string(&meta_path).await?;
            serde_json::from_str(&text)?
        } else {
            StoreInner {
                next_id: 1,
                templates: Vec::new(),
            }
        };
        Ok(Self {
            root,
            inner: RwLock::new(inner),
            cache: Mutex::new(HashMap::new()),
        })
    }

    async fn save(&self, inner: &StoreInner) -> EngineResult<()> {
        let meta_path = self.root.join(TEMPLATES_FILE);
        let tmp = meta_path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(inner)?;
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &meta_path).await?;
        Ok(())
    }

    pub async fn list(&self) -> Vec<Template> {
        self.inner.read().await.templates.clone()
    }

    pub async fn get(&self, name: &str) -> Option<Template> {
        self.inner
            .read()
            .await
            .templates
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }

    /// Known template names, for workflow validation.
    pub async fn names(&self) -> HashSet<String> {
        self.inner
            .read()
            .await
            .templates
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }

    /// Captures a region of the device screen as a named template.
    ///
    /// The screenshot is rescaled to the workflow resolution first, so the
    /// stored pixels match what the matcher will later compare against.
    pub async fn capture(
        &self,
        channel: &DeviceChannel,
        name: &str,
        region: CaptureRegion,
        workflow_resolution: (u32, u32),
    ) -> EngineResult<Template> {
        let screenshot = channel.screenshot().await?;
        let scaled = screenshot.resized(workflow_resolution.0, workflow_resolution.1);
        let cropped = scaled.crop(region.x, region.y, region.width, region.height)?;
        self.save_frame(name, &cropped).await
    }

    /// Persists an already-decoded frame under a name. Replacement writes a
    /// timestamp-suffixed file and repoints the record; old files remain.
    pub async fn save_frame(&self, name: &str, frame: &Frame) -> EngineResult<Template> {
        let bytes = frame.encode_png()?;
        let mut inner = self.inner.write().await;

        let replacing = inner.templates.iter().any(|t| t.name == name);
        let file_name = if replacing {
            format!("{name}_{}.png", Local::now().format("%Y%m%d%H%M%S"))
        } else {
            format!("{name}.png")
        };
        let file_path = self.root.join(&file_name);
        tokio::fs::write(&file_path, &bytes).await?;

        let template = if let Some(existing) = inner.templates.iter_mut().find(|t| t.name == name) {
            existing.file_path = file_path;
            existing.width = frame.width();
            existing.height = frame.height();
            existing.clone()
        } else {
            let template = Template {
                id: inner.next_id,
                name: name.to_string(),
                file_path,
                width: frame.width(),
                height: frame.height(),
            };
            inner.next_id += 1;
            inner.templates.push(template.clone());
            template
        };

        self.save(&inner).await?;
        self.cache.lock().unwrap().insert(name.to_string(), Arc::new(frame.clone()));
        Ok(template)
    }

    /// Loads a template's pixels, from cache when warm.
    pub async fn load(&self, name: &str) -> EngineResult<Arc<Frame>> {
        if let Some(frame) = self.cache.lock().unwrap().get(name) {
            return Ok(Arc::clone(frame));
        }
        let template = self
            .get(name)
            .await
            .ok_or_else(|| EngineError::template_not_found(name))?;
        let bytes = tokio::fs::read(&template.file_path).await?;
        let frame = Arc::new(Frame::decode_png(&bytes)?);
        self.cache
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::clone(&frame));
        Ok(frame)
    }
}
