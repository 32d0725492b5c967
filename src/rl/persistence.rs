//! Checkpoint files for trained algorithms
//!
//! A checkpoint is two files:
//! - `<path>` - the raw weight blob returned by `Algorithm::save`
//! - `<path>.meta.json` - [`CheckpointMetadata`] as JSON
//!
//! The metadata carries the init shapes so a fresh process can rebuild a
//! matching network before loading the weights.

use super::algorithm::{Algorithm, Lifecycle};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Metadata saved next to a weight blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// `Algorithm::name` of the writer
    pub algorithm: String,

    /// Observation shape passed to `init`
    pub obs_shape: Vec<usize>,

    /// Action count passed to `init`
    pub action_size: usize,

    /// Hyperparameters in effect when saving
    pub hyperparameters: serde_json::Value,

    /// Crate version that wrote the checkpoint
    pub version: String,
}

impl CheckpointMetadata {
    pub fn new<A: Algorithm + ?Sized>(algorithm: &A, obs_shape: &[usize], action_size: usize) -> Self {
        Self {
            algorithm: algorithm.name().to_string(),
            obs_shape: obs_shape.to_vec(),
            action_size,
            hyperparameters: algorithm.hyperparameters(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Path of the metadata file belonging to `path`
pub fn metadata_path(path: &Path) -> PathBuf {
    let mut file_name = path.as_os_str().to_owned();
    file_name.push(".meta.json");
    PathBuf::from(file_name)
}

/// Write the weight blob and metadata of an initialized algorithm
///
/// Creates parent directories if they don't exist.
pub fn save_checkpoint<A: Algorithm + ?Sized>(
    algorithm: &A,
    obs_shape: &[usize],
    action_size: usize,
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let bytes = algorithm.save().context("Failed to serialize weights")?;
    std::fs::write(path, &bytes)
        .with_context(|| format!("Failed to write weights to {:?}", path))?;

    let metadata = CheckpointMetadata::new(algorithm, obs_shape, action_size);
    let meta_path = metadata_path(path);
    let meta_json =
        serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?;
    std::fs::write(&meta_path, meta_json)
        .with_context(|| format!("Failed to write metadata to {:?}", meta_path))?;

    info!(path = %path.display(), algorithm = algorithm.name(), "checkpoint saved");
    Ok(())
}

/// Read only the metadata of a checkpoint
pub fn read_metadata(path: &Path) -> Result<CheckpointMetadata> {
    let meta_path = metadata_path(path);
    let meta_json = std::fs::read_to_string(&meta_path)
        .with_context(|| format!("Failed to read metadata from {:?}", meta_path))?;
    serde_json::from_str(&meta_json).context("Failed to deserialize metadata")
}

/// Restore a checkpoint into `algorithm`
///
/// An uninitialized or disposed algorithm is first initialized with the
/// shapes recorded in the metadata and `seed`. Fails when the checkpoint was
/// written by a different algorithm.
pub fn load_checkpoint<A: Algorithm + ?Sized>(
    algorithm: &mut A,
    path: &Path,
    seed: &str,
) -> Result<CheckpointMetadata> {
    let metadata = read_metadata(path)?;
    if metadata.algorithm != algorithm.name() {
        bail!(
            "checkpoint {:?} was written by {}, not {}",
            path,
            metadata.algorithm,
            algorithm.name()
        );
    }
    if metadata.version != env!("CARGO_PKG_VERSION") {
        warn!(
            saved = %metadata.version,
            current = env!("CARGO_PKG_VERSION"),
            "checkpoint written by another version"
        );
    }

    if matches!(
        algorithm.lifecycle(),
        Lifecycle::Uninitialized | Lifecycle::Disposed
    ) {
        algorithm
            .init(&metadata.obs_shape, metadata.action_size, seed)
            .context("Failed to initialize algorithm from checkpoint metadata")?;
    }

    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read weights from {:?}", path))?;
    algorithm
        .load(&bytes)
        .with_context(|| format!("Failed to load weights from {:?}", path))?;

    info!(path = %path.display(), algorithm = algorithm.name(), "checkpoint loaded");
    Ok(metadata)
}
