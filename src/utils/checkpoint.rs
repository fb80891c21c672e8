//! Checkpoint save/load utilities
//!
//! A checkpoint is a `model-<step>` directory holding the parameters of both
//! networks and a metadata file. The run directory's `checkpoint` state file
//! names the most recently saved one; only that one is kept.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Pix2PixError, Result};
use crate::model::Pix2Pix;
use crate::training::StepLosses;

pub const CHECKPOINT_PREFIX: &str = "model-";
pub const GENERATOR_FILE: &str = "generator.ot";
pub const DISCRIMINATOR_FILE: &str = "discriminator.ot";
pub const META_FILE: &str = "meta.json";
pub const STATE_FILE: &str = "checkpoint";

/// Checkpoints kept per run directory
const MAX_TO_KEEP: usize = 1;

/// Checkpoint metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Train steps applied when the checkpoint was taken
    pub global_step: i64,
    /// Smoothed losses at checkpoint
    pub losses: StepLosses,
    /// Timestamp of checkpoint
    pub timestamp: String,
}

/// Checkpoints of a run directory, newest last
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Directory name of the most recent save
    pub latest: String,
    /// Directory names of the retained saves, oldest first
    pub all: Vec<String>,
}

impl CheckpointState {
    pub fn read(root: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(root.join(STATE_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write(&self, root: &Path) -> Result<()> {
        std::fs::write(root.join(STATE_FILE), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Directory of the checkpoint for `global_step` under `root`
pub fn checkpoint_dir(root: &Path, global_step: i64) -> PathBuf {
    root.join(format!("{CHECKPOINT_PREFIX}{global_step:08}"))
}

/// Save a complete checkpoint (model + metadata)
///
/// # Arguments
///
/// * `model` - Model to save
/// * `losses` - Smoothed losses to record
/// * `root` - Run directory receiving `model-<step>`
///
/// # Returns
///
/// Path to saved checkpoint
pub fn save_checkpoint(model: &Pix2Pix, losses: StepLosses, root: &Path) -> Result<PathBuf> {
    let dir = checkpoint_dir(root, model.global_step());
    std::fs::create_dir_all(&dir)?;

    model.save(&dir.join(GENERATOR_FILE), &dir.join(DISCRIMINATOR_FILE))?;

    let meta = CheckpointMeta {
        global_step: model.global_step(),
        losses,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    std::fs::write(dir.join(META_FILE), serde_json::to_string_pretty(&meta)?)?;

    let name = dir_name(&dir);
    let mut state = CheckpointState::read(root).unwrap_or_default();
    state.all.retain(|kept| *kept != name);
    state.all.push(name.clone());
    let excess = state.all.len().saturating_sub(MAX_TO_KEEP);
    let stale: Vec<String> = state.all.drain(..excess).collect();
    state.latest = name;
    state.write(root)?;

    for stale in stale {
        let stale = root.join(stale);
        if stale.is_dir() {
            std::fs::remove_dir_all(&stale)?;
            tracing::debug!("Removed old checkpoint {}", stale.display());
        }
    }

    tracing::info!("Saved checkpoint to {}", dir.display());
    Ok(dir)
}

/// Load checkpoint metadata
pub fn load_checkpoint_meta(checkpoint_dir: &Path) -> Result<CheckpointMeta> {
    let content = std::fs::read_to_string(checkpoint_dir.join(META_FILE))?;
    Ok(serde_json::from_str(&content)?)
}

/// Resolve `path` to a checkpoint directory
///
/// Accepts either a checkpoint directory itself or a run directory, in which
/// case its newest checkpoint is used.
pub fn resolve_checkpoint(path: &Path) -> Result<PathBuf> {
    if path.join(GENERATOR_FILE).is_file() {
        return Ok(path.to_path_buf());
    }
    find_latest_checkpoint(path).ok_or_else(|| Pix2PixError::CheckpointNotFound(path.to_path_buf()))
}

/// Load a complete checkpoint and restore the global step
///
/// # Returns
///
/// The checkpoint metadata
pub fn load_checkpoint(model: &mut Pix2Pix, checkpoint: &Path) -> Result<CheckpointMeta> {
    let dir = resolve_checkpoint(checkpoint)?;
    model.load(&dir.join(GENERATOR_FILE), &dir.join(DISCRIMINATOR_FILE))?;

    let meta = load_checkpoint_meta(&dir)?;
    model.set_global_step(meta.global_step);

    tracing::info!(
        "Loaded checkpoint from {} (step {})",
        dir.display(),
        meta.global_step
    );
    Ok(meta)
}

/// Find the most recently saved checkpoint in a directory
///
/// Without a state file, falls back to the checkpoint with the highest step.
pub fn find_latest_checkpoint(dir: &Path) -> Option<PathBuf> {
    if let Some(state) = CheckpointState::read(dir) {
        let latest = dir.join(&state.latest);
        if latest.join(META_FILE).is_file() {
            return Some(latest);
        }
    }
    list_checkpoints(dir).pop().map(|(path, _)| path)
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// List all checkpoints in a directory, oldest first
pub fn list_checkpoints(dir: &Path) -> Vec<(PathBuf, CheckpointMeta)> {
    let mut checkpoints: Vec<_> = std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.starts_with(CHECKPOINT_PREFIX))
                .unwrap_or(false)
        })
        .filter_map(|e| {
            let path = e.path();
            load_checkpoint_meta(&path).ok().map(|meta| (path, meta))
        })
        .collect();

    checkpoints.sort_by_key(|(_, meta)| meta.global_step);
    checkpoints
}
