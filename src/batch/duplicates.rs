//! Duplicate account finder.
//!
//! Hashes every matching file in a master folder A and a candidate folder
//! B with SHA-256 over raw bytes. Files in B whose content already exists
//! in A are reported as pairs, and deleted unless the run is a dry run.

use crate::models::error::EngineResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One duplicate pairing: a file in B matching a file in A by content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicatePair {
    pub file_b_name: String,
    pub matches_with_name: String,
}

/// Outcome of a duplicate scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DuplicateReport {
    pub duplicates: Vec<DuplicatePair>,
    /// Files actually deleted; zero on dry runs
    pub removed_count: usize,
}

pub struct DuplicateFinder {
    extension: String,
}

impl DuplicateFinder {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    /// Scans folders A (master) and B; reports B-files whose hash matches
    /// any A-file. With `dry_run` nothing is touched; otherwise the
    /// duplicated B-files are deleted.
    pub async fn run(
        &self,
        folder_a: &Path,
        folder_b: &Path,
        dry_run: bool,
    ) -> EngineResult<DuplicateReport> {
        let master = self.hash_folder(folder_a).await?;
        let candidates = self.hash_folder(folder_b).await?;

        let by_hash: HashMap<&[u8; 32], &str> = master
            .iter()
            .map(|(name, hash)| (hash, name.as_str()))
            .collect();

        let mut report = DuplicateReport::default();
        for (name, hash) in &candidates {
            if let Some(master_name) = by_hash.get(hash) {
                report.duplicates.push(DuplicatePair {
                    file_b_name: name.clone(),
                    matches_with_name: master_name.to_string(),
                });
                if !dry_run {
                    tokio::fs::remove_file(folder_b.join(name)).await?;
                    report.removed_count += 1;
                    log::info!("removed duplicate {name} (matches {master_name})");
                }
            }
        }
        report
            .duplicates
            .sort_by(|a, b| a.file_b_name.cmp(&b.file_b_name));
        Ok(report)
    }

    /// SHA-256 of every matching file in a folder, keyed by filename.
    async fn hash_folder(&self, folder: &Path) -> EngineResult<Vec<(String, [u8; 32])>> {
        let mut hashes = Vec::new();
        let mut dir = tokio::fs::read_dir(folder).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path: PathBuf = entry.path();
            if !path.is_file() {
                continue;
            }
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension));
            if !matches_ext {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let bytes = tokio::fs::read(&path).await?;
            let digest: [u8; 32] = Sha256::digest(&bytes).into();
            hashes.push((name.to_string(), digest));
        }
        hashes.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(hashes)
    }
}
