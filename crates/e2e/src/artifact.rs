//! Screenshot evidence storage keyed by category and case id

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// Content type attached to every screenshot
pub const SCREENSHOT_CONTENT_TYPE: &str = "image/png";

const SCREENSHOT_DIR: &str = "screenshots";

/// A written screenshot, as attached to a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Attachment name (the case id)
    pub name: String,

    /// Path the bytes were written to
    pub path: PathBuf,

    pub content_type: String,

    /// SHA256 of the written bytes
    pub sha256: String,

    pub size_bytes: u64,
}

/// Writes screenshots to `<root>/screenshots/<category>/<id>.png`
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path relative to the store root. Deterministic for a given category/id.
    pub fn relative_path(category: &str, id: &str) -> PathBuf {
        Path::new(SCREENSHOT_DIR)
            .join(category)
            .join(format!("{}.png", id))
    }

    pub fn path_for(&self, category: &str, id: &str) -> PathBuf {
        self.root.join(Self::relative_path(category, id))
    }

    /// Write one screenshot, creating missing parent directories.
    ///
    /// Directory creation tolerates directories that already exist, including
    /// ones created concurrently by a sibling case of the same category.
    pub fn save(&self, category: &str, id: &str, image: &[u8]) -> E2eResult<ArtifactRecord> {
        let path = self.path_for(category, id);
        let write_error = |source| E2eError::ArtifactWrite {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        std::fs::write(&path, image).map_err(write_error)?;

        let sha256 = hex::encode(Sha256::digest(image));
        debug!("Wrote {} ({} bytes)", path.display(), image.len());

        Ok(ArtifactRecord {
            name: id.to_string(),
            path,
            content_type: SCREENSHOT_CONTENT_TYPE.to_string(),
            sha256,
            size_bytes: image.len() as u64,
        })
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new(".")
    }
}
