//! Step-tagged checkpoint directories under the logging root.
//!
//! ```text
//! {logging_dir}/
//!   checkpoint            <- name of the latest step directory
//!   {model_name}-{step}/
//!     model.mpk
//!     optimizer.mpk
//!     meta.json
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TrainError;
use crate::model::Model;

const POINTER_FILE: &str = "checkpoint";
const META_FILE: &str = "meta.json";

/// Metadata saved alongside each checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub model_name: String,
    pub step: usize,
    pub num_params: usize,
}

/// Writes checkpoints and remembers the last one that succeeded.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    logging_dir: PathBuf,
    model_name: String,
    last_saved: Option<PathBuf>,
}

impl Checkpointer {
    pub fn new(logging_dir: impl Into<PathBuf>, model_name: impl Into<String>) -> Self {
        Self {
            logging_dir: logging_dir.into(),
            model_name: model_name.into(),
            last_saved: None,
        }
    }

    /// Directory a checkpoint for `step` is written to.
    pub fn step_dir(&self, step: usize) -> PathBuf {
        self.logging_dir.join(format!("{}-{step}", self.model_name))
    }

    /// Most recent successful save of this run.
    pub fn last_saved(&self) -> Option<&Path> {
        self.last_saved.as_deref()
    }

    /// Save `model` at `step`.
    ///
    /// Saving the same step again overwrites the same files. Any write
    /// failure is returned as [`TrainError::Resource`] and aborts the run.
    pub fn save<M: Model + ?Sized>(&mut self, model: &M, step: usize) -> Result<PathBuf, TrainError> {
        let dir = self.step_dir(step);
        let resource = |path: &Path, reason: anyhow::Error| TrainError::Resource {
            path: path.to_path_buf(),
            reason,
        };

        std::fs::create_dir_all(&dir).map_err(|e| resource(&dir, e.into()))?;
        model.save(&dir).map_err(|e| resource(&dir, e))?;

        let meta = CheckpointMeta {
            model_name: self.model_name.clone(),
            step,
            num_params: model.num_params(),
        };
        let meta_path = dir.join(META_FILE);
        let json = serde_json::to_string_pretty(&meta).map_err(|e| resource(&meta_path, e.into()))?;
        std::fs::write(&meta_path, json).map_err(|e| resource(&meta_path, e.into()))?;

        let pointer = self.logging_dir.join(POINTER_FILE);
        std::fs::write(&pointer, format!("{}-{step}\n", self.model_name))
            .map_err(|e| resource(&pointer, e.into()))?;

        tracing::info!(step, path = %dir.display(), "Checkpoint saved (model + optimizer + meta)");
        self.last_saved = Some(dir.clone());
        Ok(dir)
    }
}

/// Resolve the latest checkpoint directory named by the pointer file.
pub fn latest_checkpoint(logging_dir: &Path) -> anyhow::Result<PathBuf> {
    let pointer = logging_dir.join(POINTER_FILE);
    let name = std::fs::read_to_string(&pointer)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", pointer.display()))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("{} is empty", pointer.display());
    }
    Ok(logging_dir.join(name))
}

/// Read `meta.json` from a checkpoint directory.
pub fn read_meta(dir: &Path) -> anyhow::Result<CheckpointMeta> {
    let meta_path = dir.join(META_FILE);
    let file = std::fs::File::open(&meta_path)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", meta_path.display()))?;
    serde_json::from_reader(file)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", meta_path.display()))
}
