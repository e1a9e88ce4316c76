//! Model persistence across restarts

use crate::models::MODEL_INPUT_NAMES;
use crate::predictor::TrainedModel;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Training samples kept in a persisted model
pub const PERSISTED_SAMPLES: usize = 100;

/// Loads and saves the predictor's trainable state
pub trait ModelStore: Send + Sync {
    /// `Ok(None)` when nothing usable has been stored
    fn load(&self) -> Result<Option<TrainedModel>>;

    fn save(&self, model: &TrainedModel) -> Result<()>;
}

/// On-disk envelope; the input names guard against feature layout changes
#[derive(Debug, Serialize, Deserialize)]
struct StoredModel {
    saved_at: i64,
    inputs: Vec<String>,
    model: TrainedModel,
}

/// JSON file store written atomically
#[derive(Debug, Clone)]
pub struct FileModelStore {
    path: PathBuf,
    keep: usize,
}

impl FileModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: PERSISTED_SAMPLES,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelStore for FileModelStore {
    fn load(&self) -> Result<Option<TrainedModel>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut data = Vec::new();
        File::open(&self.path)
            .with_context(|| format!("Failed to open model file {:?}", self.path))?
            .read_to_end(&mut data)
            .context("Failed to read model file")?;
        let stored: StoredModel =
            serde_json::from_slice(&data).context("Failed to deserialize model file")?;

        if stored.inputs.iter().map(String::as_str).ne(MODEL_INPUT_NAMES.iter().copied()) {
            warn!(path = %self.path.display(), "Persisted model uses a different feature layout, ignoring");
            return Ok(None);
        }

        info!(
            path = %self.path.display(),
            samples = stored.model.samples.len(),
            saved_at = stored.saved_at,
            "Loaded persisted model"
        );
        Ok(Some(stored.model))
    }

    fn save(&self, model: &TrainedModel) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let mut model = model.clone();
        let excess = model.samples.len().saturating_sub(self.keep);
        model.samples.drain(..excess);

        let stored = StoredModel {
            saved_at: chrono::Utc::now().timestamp(),
            inputs: MODEL_INPUT_NAMES.iter().map(|s| s.to_string()).collect(),
            model,
        };
        let json = serde_json::to_vec(&stored).context("Failed to serialize model")?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;
        file.write_all(&json).context("Failed to write model data")?;
        file.sync_all().context("Failed to sync model file")?;

        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, self.path))?;
        Ok(())
    }
}
