//! On-disk layout of one mirrored image.
//!
//! An [`AssetRecord`] is derived from an [`ImageItem`], its owning
//! [`InferenceGroup`] and the resolved model metadata (if any).  It
//! names three artifacts under the destination directory:
//!
//! - `{image_id}.png` -- the binary payload,
//! - `{image_id}_metadata.json` -- the image document enriched with the
//!   inference and model metadata,
//! - `{inference_id}_inference.json` -- the full inference group.
//!
//! Paths depend only on ids, so re-running against the same gallery
//! targets the same files.  Sidecars are write-once: an existing sidecar
//! is never rewritten, only re-stamped.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{AssetError, SchemaError};
use crate::fs::{atomic_write, is_safe_file_stem, set_file_times};
use crate::schema::{Document, ImageItem, InferenceGroup};

/// Model metadata fields copied into each image sidecar.
pub const MODEL_PROJECTION_KEYS: [&str; 6] = [
    "id",
    "name",
    "activeVersionId",
    "author",
    "externalId",
    "modelProvider",
];

/// Sidecar key holding the inference group (without its images).
pub const INFERENCE_PREFETCH_KEY: &str = "inference_prefetch";

/// Sidecar key holding the projected model metadata.
pub const MODEL_PREFETCH_KEY: &str = "model_prefetch";

/// Which sidecars a [`AssetRecord::persist_metadata`] call created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SidecarWrites {
    pub inference: bool,
    pub image: bool,
}

#[derive(Debug)]
pub struct AssetRecord<'a> {
    image: &'a ImageItem,
    group: &'a InferenceGroup,
    model: Option<&'a Document>,
    output_time: DateTime<Utc>,
    binary_path: PathBuf,
    image_meta_path: PathBuf,
    inference_meta_path: PathBuf,
}

impl<'a> AssetRecord<'a> {
    pub fn new(
        image: &'a ImageItem,
        group: &'a InferenceGroup,
        model: Option<&'a Document>,
        dest_dir: &Path,
    ) -> Result<Self, SchemaError> {
        ensure_file_safe("image id", &image.id)?;
        ensure_file_safe("inference id", &group.id)?;
        let output_time = image.created_at_utc()?;

        Ok(Self {
            image,
            group,
            model,
            output_time,
            binary_path: dest_dir.join(format!("{}.png", image.id)),
            image_meta_path: dest_dir.join(format!("{}_metadata.json", image.id)),
            inference_meta_path: dest_dir.join(format!("{}_inference.json", group.id)),
        })
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    pub fn image_meta_path(&self) -> &Path {
        &self.image_meta_path
    }

    pub fn inference_meta_path(&self) -> &Path {
        &self.inference_meta_path
    }

    /// When the image was produced (`createdAt`, UTC).
    pub fn output_time(&self) -> DateTime<Utc> {
        self.output_time
    }

    /// When the prompt was submitted.
    ///
    /// Upstream's inference `createdAt` is not trustworthy (large runs of
    /// jobs share one value), so this is the output time.
    pub fn prompt_time(&self) -> DateTime<Utc> {
        self.output_time()
    }

    pub fn binary_exists(&self) -> bool {
        self.binary_path.exists()
    }

    /// Write the downloaded payload atomically.
    pub fn write_binary(&self, bytes: &[u8]) -> Result<(), AssetError> {
        atomic_write(&self.binary_path, bytes).map_err(|source| AssetError::Io {
            path: self.binary_path.clone(),
            source,
        })
    }

    /// Stamp the binary and write (or re-stamp) both sidecars.
    ///
    /// The binary must already exist.  Times: binary mtime = prompt
    /// time and atime = output time; inference sidecar both = prompt
    /// time; image sidecar both = output time.
    pub fn persist_metadata(&self) -> Result<SidecarWrites, AssetError> {
        let prompt_time = self.prompt_time();
        let output_time = self.output_time();
        let mut writes = SidecarWrites::default();

        stamp(&self.binary_path, output_time, prompt_time)?;

        if self.inference_meta_path.exists() {
            tracing::debug!(path = %self.inference_meta_path.display(), "Inference sidecar already exists");
        } else {
            write_json(&self.inference_meta_path, self.group.document())?;
            writes.inference = true;
        }
        stamp(&self.inference_meta_path, prompt_time, prompt_time)?;

        if self.image_meta_path.exists() {
            tracing::debug!(path = %self.image_meta_path.display(), "Image sidecar already exists");
        } else {
            write_json(&self.image_meta_path, &self.image_sidecar())?;
            writes.image = true;
        }
        stamp(&self.image_meta_path, output_time, output_time)?;

        Ok(writes)
    }

    /// Image document merged with the inference group (minus images)
    /// and the projected model metadata.
    pub fn image_sidecar(&self) -> Document {
        let mut sidecar = self.image.document().clone();
        sidecar.insert(
            INFERENCE_PREFETCH_KEY.to_string(),
            Value::Object(self.group.document_without_images()),
        );
        sidecar.insert(
            MODEL_PREFETCH_KEY.to_string(),
            Value::Object(self.model.map(project_model).unwrap_or_default()),
        );
        sidecar
    }
}

/// Keep only [`MODEL_PROJECTION_KEYS`]; keys missing upstream are omitted.
pub fn project_model(model: &Document) -> Document {
    MODEL_PROJECTION_KEYS
        .iter()
        .filter_map(|key| model.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect()
}

fn ensure_file_safe(field: &'static str, value: &str) -> Result<(), SchemaError> {
    if !is_safe_file_stem(value) {
        return Err(SchemaError::UnsafeId {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn write_json(path: &Path, document: &Document) -> Result<(), AssetError> {
    let bytes = serde_json::to_vec(document).map_err(|source| AssetError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, &bytes).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn stamp(path: &Path, accessed: DateTime<Utc>, modified: DateTime<Utc>) -> Result<(), AssetError> {
    set_file_times(path, accessed, modified).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })
}
