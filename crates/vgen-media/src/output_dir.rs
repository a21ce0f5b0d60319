//! The output directory shared by the renderer and the sweeper.
//!
//! The directory is the only resource the two components share. Access goes
//! through two declared accessors:
//! - [`ArtifactWriter`] (renderer): checks writability, allocates paths,
//!   discards partial output.
//! - [`ArtifactReader`] (sweeper): lists artifacts and deletes them.
//!
//! No locking is involved. File names are unique per request, and the reader
//! treats files that appear or vanish between listing and deletion as normal.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use vgen_models::ArtifactName;

use crate::error::{MediaError, MediaResult};

/// Prefix of the throwaway files used to test writability.
const WRITE_PROBE_PREFIX: &str = ".vgen-write-probe-";

/// Output directory plus the URL prefix it is served under.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: Arc<PathBuf>,
    public_path: Arc<str>,
}

impl OutputDir {
    pub fn new(root: impl Into<PathBuf>, public_path: &str) -> Self {
        let public_path = format!("/{}", public_path.trim_matches('/'));
        Self {
            root: Arc::new(root.into()),
            public_path: public_path.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// URL prefix, always with a leading and no trailing slash.
    pub fn public_path(&self) -> &str {
        &self.public_path
    }

    /// Create the directory if missing.
    pub async fn ensure_exists(&self) -> MediaResult<()> {
        fs::create_dir_all(self.root()).await.map_err(|source| MediaError::OutputDirUnusable {
            path: self.root().to_path_buf(),
            source,
        })
    }

    /// Accessor for the renderer.
    pub fn writer(&self) -> ArtifactWriter {
        ArtifactWriter { dir: self.clone() }
    }

    /// Accessor for the sweeper.
    pub fn reader(&self) -> ArtifactReader {
        ArtifactReader { dir: self.clone() }
    }
}

/// Write side of the output directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: OutputDir,
}

impl ArtifactWriter {
    pub fn root(&self) -> &Path {
        self.dir.root()
    }

    /// Verify the directory exists and accepts new files.
    pub async fn check_writable(&self) -> MediaResult<()> {
        let root = self.dir.root();
        let unusable = |source| MediaError::OutputDirUnusable {
            path: root.to_path_buf(),
            source,
        };

        let meta = fs::metadata(root).await.map_err(unusable)?;
        if !meta.is_dir() {
            return Err(MediaError::NotADirectory(root.to_path_buf()));
        }

        let probe = root.join(format!("{}{}", WRITE_PROBE_PREFIX, Uuid::new_v4().simple()));
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&probe)
            .await
            .map_err(unusable)?;

        if let Err(e) = fs::remove_file(&probe).await {
            warn!(path = %probe.display(), "Failed to remove write probe: {}", e);
        }
        Ok(())
    }

    /// Absolute path for an artifact.
    pub fn path_for(&self, name: &ArtifactName) -> PathBuf {
        self.dir.root().join(name.file_name())
    }

    /// Public URL for an artifact.
    pub fn public_url(&self, name: &ArtifactName) -> String {
        format!("{}/{}", self.dir.public_path(), name.file_name())
    }

    /// Best-effort removal of a failed render's output.
    pub async fn discard(&self, path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "Removed partial output"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %path.display(),
                "Failed to remove partial output, leaving it for the sweeper: {}", e
            ),
        }
    }
}

/// An artifact found on disk.
#[derive(Debug, Clone)]
pub struct ArtifactEntry {
    pub path: PathBuf,
    pub name: ArtifactName,
    /// Modification time, when the filesystem reports one
    pub modified: Option<SystemTime>,
}

/// Result of listing the directory.
#[derive(Debug, Default)]
pub struct Listing {
    pub artifacts: Vec<ArtifactEntry>,
    /// Entries seen, artifacts or not
    pub scanned: usize,
}

/// Outcome of a delete attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// Someone else removed it first.
    AlreadyGone,
}

/// Read/delete side of the output directory.
#[derive(Debug, Clone)]
pub struct ArtifactReader {
    dir: OutputDir,
}

impl ArtifactReader {
    pub fn root(&self) -> &Path {
        self.dir.root()
    }

    /// List regular files whose names follow the artifact convention.
    ///
    /// Fails only when the directory itself cannot be read; unreadable
    /// entries are logged and skipped.
    pub async fn list(&self) -> MediaResult<Listing> {
        let mut entries = fs::read_dir(self.dir.root()).await?;
        let mut listing = Listing::default();

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %self.dir.root().display(), "Failed to read directory entry: {}", e);
                    break;
                }
            };
            listing.scanned += 1;

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(ArtifactName::parse) else {
                continue;
            };

            match entry.file_type().await {
                Ok(ft) if ft.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    debug!(file = %name, "Skipping entry with unreadable type: {}", e);
                    continue;
                }
            }

            let modified = entry
                .metadata()
                .await
                .ok()
                .and_then(|m| m.modified().ok());

            listing.artifacts.push(ArtifactEntry {
                path: entry.path(),
                name,
                modified,
            });
        }

        Ok(listing)
    }

    /// Delete an artifact. A file that is already gone is not an error.
    pub async fn remove(&self, entry: &ArtifactEntry) -> MediaResult<RemoveOutcome> {
        match fs::remove_file(&entry.path).await {
            Ok(()) => Ok(RemoveOutcome::Removed),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(RemoveOutcome::AlreadyGone),
            Err(e) => Err(e.into()),
        }
    }
}
