//! Artifact store: where every stage output lives.
//!
//! Each stage writes its output to a path derived only from the stage and
//! the name of the image it consumed:
//!
//! ```text
//! <root>/<stage directory>/<stage prefix>_<source file name>
//! ```
//!
//! The same path is then the locator the next stage reads from, so the store
//! doubles as a cache of intermediate results. Re-running a stage on the same
//! source overwrites the previous artifact; nothing accumulates.
//!
//! ## Concurrency
//!
//! There is no locking across writers. Two runs that target the same derived
//! path race and the last write to complete wins.

use crate::error::OcrPrepError;
use image::DynamicImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Directory and file-name prefix for one kind of artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageDir {
    /// Subdirectory under the image root.
    pub directory: &'static str,
    /// Prefix joined to the source file name with `_`.
    pub prefix: &'static str,
}

impl StageDir {
    pub const GRAYSCALE: StageDir = StageDir::new("grayscale", "gray");
    pub const THRESHOLDING: StageDir = StageDir::new("thresholding", "thresh");
    pub const NO_NOISE: StageDir = StageDir::new("no_noise", "no_noise");
    pub const MORPHOLOGY: StageDir = StageDir::new("morphology", "morph");
    pub const DESKEW: StageDir = StageDir::new("deskew", "deskewed");
    pub const EDGE_DETECTION: StageDir = StageDir::new("edge_detection", "edges");
    pub const CONTOURS: StageDir = StageDir::new("contours", "contours");
    pub const INVERTED: StageDir = StageDir::new("inverted", "inverted");
    pub const EQUALIZED: StageDir = StageDir::new("equalized", "equalized");
    pub const PROCESSED: StageDir = StageDir::new("processed", "autocontrast");
    pub const PREPROCESSED: StageDir = StageDir::new("preprocessed", "upscaled");
    pub const BOUNDING: StageDir = StageDir::new("bounding", "bounding_boxes");

    /// Every artifact directory, in the order they are created by
    /// [`FsArtifactStore::ensure_layout`].
    pub const ALL: [StageDir; 12] = [
        StageDir::PREPROCESSED,
        StageDir::BOUNDING,
        StageDir::GRAYSCALE,
        StageDir::THRESHOLDING,
        StageDir::NO_NOISE,
        StageDir::MORPHOLOGY,
        StageDir::DESKEW,
        StageDir::EDGE_DETECTION,
        StageDir::CONTOURS,
        StageDir::INVERTED,
        StageDir::EQUALIZED,
        StageDir::PROCESSED,
    ];

    pub const fn new(directory: &'static str, prefix: &'static str) -> Self {
        Self { directory, prefix }
    }

    /// Derived artifact path for `source_name` under `root`.
    pub fn artifact_path(&self, root: &Path, source_name: &str) -> PathBuf {
        root.join(self.directory)
            .join(format!("{}_{}", self.prefix, source_name))
    }
}

/// Storage seam for stage artifacts.
///
/// Implementations must be deterministic in [`ArtifactStore::path_for`]:
/// the same `(stage, source name)` always yields the same path.
pub trait ArtifactStore: Send + Sync {
    /// Root every artifact path is derived from.
    fn root(&self) -> &Path;

    /// Path an artifact for `source_name` would be stored at.
    fn path_for(&self, stage: &StageDir, source_name: &str) -> PathBuf {
        stage.artifact_path(self.root(), source_name)
    }

    /// Persist `image` as the `stage` artifact of `source_name`, overwriting
    /// any previous artifact at the same path.
    fn put(
        &self,
        stage: &StageDir,
        source_name: &str,
        image: &DynamicImage,
    ) -> Result<PathBuf, OcrPrepError>;

    /// Load the image stored at `path`.
    fn get(&self, path: &Path) -> Result<DynamicImage, OcrPrepError>;

    /// Whether an image exists at `path`.
    fn contains(&self, path: &Path) -> bool;
}

// ── Filesystem store ─────────────────────────────────────────────────────

/// Store backed by per-stage directories under an image root.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Create every stage directory. Idempotent.
    pub fn ensure_layout(&self) -> Result<(), OcrPrepError> {
        for stage in StageDir::ALL {
            let dir = self.root.join(stage.directory);
            std::fs::create_dir_all(&dir).map_err(|e| OcrPrepError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn put(
        &self,
        stage: &StageDir,
        source_name: &str,
        image: &DynamicImage,
    ) -> Result<PathBuf, OcrPrepError> {
        let dir = self.root.join(stage.directory);
        std::fs::create_dir_all(&dir).map_err(|e| OcrPrepError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let path = self.path_for(stage, source_name);
        image.save(&path).map_err(|e| OcrPrepError::Encode {
            path: path.clone(),
            source: e,
        })?;

        debug!(
            "Stored {}x{} artifact → {}",
            image.width(),
            image.height(),
            path.display()
        );
        Ok(path)
    }

    fn get(&self, path: &Path) -> Result<DynamicImage, OcrPrepError> {
        if !path.is_file() {
            return Err(OcrPrepError::NotFound {
                path: path.to_path_buf(),
            });
        }
        image::open(path).map_err(|e| OcrPrepError::Decode {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn contains(&self, path: &Path) -> bool {
        path.is_file()
    }
}

// ── In-memory store ──────────────────────────────────────────────────────

/// Store that keeps artifacts in a map keyed by their derived path.
///
/// Paths are still computed from the root exactly as on disk, so tests can
/// assert on them without any filesystem access.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    root: PathBuf,
    images: Mutex<HashMap<PathBuf, DynamicImage>>,
}

impl MemoryArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            images: Mutex::new(HashMap::new()),
        }
    }

    /// Seed a source image at an arbitrary path.
    pub fn insert(&self, path: impl Into<PathBuf>, image: DynamicImage) {
        self.lock().insert(path.into(), image);
    }

    /// Number of images held, sources included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, DynamicImage>> {
        // A panic while holding the lock cannot leave the map half-updated,
        // so a poisoned guard is still usable.
        self.images
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn put(
        &self,
        stage: &StageDir,
        source_name: &str,
        image: &DynamicImage,
    ) -> Result<PathBuf, OcrPrepError> {
        let path = self.path_for(stage, source_name);
        self.lock().insert(path.clone(), image.clone());
        Ok(path)
    }

    fn get(&self, path: &Path) -> Result<DynamicImage, OcrPrepError> {
        self.lock()
            .get(path)
            .cloned()
            .ok_or_else(|| OcrPrepError::NotFound {
                path: path.to_path_buf(),
            })
    }

    fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }
}
