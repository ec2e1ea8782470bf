//! Model checkpoint persistence.
//!
//! A checkpoint is the JSON form of [`ModelState`]. Saves are atomic (temp
//! file alongside the target, then rename) so a crash mid-write never leaves
//! a torn checkpoint behind.

use std::path::Path;

use crate::ml_engine::clusterer::{ClusterModel, ModelState, MODEL_STATE_VERSION};
use crate::ml_engine::ModelError;

/// Save a model state to disk atomically.
pub fn save_to_disk(state: &ModelState, path: &Path) -> Result<(), ModelError> {
    let json = serde_json::to_vec_pretty(state)?;

    let tmp_path = path.with_extension("json.tmp");
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path)?;

    tracing::info!(path = %path.display(), k = state.k(), "Model checkpoint saved");
    Ok(())
}

/// Load and validate a checkpoint.
///
/// A missing or undecodable file is `Unavailable`; a file from another
/// format version is `SchemaMismatch`; a structurally broken state is
/// `InvalidState`.
pub fn load_from_disk(path: &Path) -> Result<ClusterModel, ModelError> {
    let data = std::fs::read(path)
        .map_err(|e| ModelError::Unavailable(format!("{}: {}", path.display(), e)))?;

    let state: ModelState = serde_json::from_slice(&data)
        .map_err(|e| ModelError::Unavailable(format!("{}: {}", path.display(), e)))?;

    if state.version != MODEL_STATE_VERSION {
        return Err(ModelError::SchemaMismatch(state.version, MODEL_STATE_VERSION));
    }

    let model = ClusterModel::new(state)?;
    tracing::info!(path = %path.display(), k = model.k(), "Model checkpoint loaded");
    Ok(model)
}
