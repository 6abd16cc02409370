use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use humansize::{format_size, BINARY};
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogError, VideoCatalog};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("nothing to publish: {transcoded} is gone and {destination} was never written")]
    NothingToPublish {
        transcoded: PathBuf,
        destination: PathBuf,
    },
    #[error("io error at {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("catalog was updated but {filename} still is not in the library after {attempts} checks")]
    VerifyTimeout { filename: String, attempts: u32 },
}

pub type PublishResult<T> = Result<T, PublishError>;

/// What a pipeline run actually did. Stages that were already complete from
/// an earlier, interrupted run show up as `false` here.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub uploaded: bool,
    pub refreshed: bool,
    pub removed_transcoded: bool,
    pub removed_raw: bool,
}

/// Outcome of the upload probe. Derived purely from the two stat results so
/// the rule stays testable without touching a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UploadDecision {
    /// Destination missing, or its size disagrees with the source.
    Upload,
    /// Both files present with matching sizes.
    AlreadyUploaded,
    /// Destination present and the source is gone: a prior run finished the
    /// upload and got at least as far as cleanup.
    SourceGone,
    /// Neither file exists; there is no artifact left to reason about.
    NothingToPublish,
}

pub(crate) fn decide_upload(destination: Option<u64>, source: Option<u64>) -> UploadDecision {
    match (destination, source) {
        (None, Some(_)) => UploadDecision::Upload,
        (Some(dest), Some(src)) if dest != src => UploadDecision::Upload,
        (Some(_), Some(_)) => UploadDecision::AlreadyUploaded,
        (Some(_), None) => UploadDecision::SourceGone,
        (None, None) => UploadDecision::NothingToPublish,
    }
}

/// Moves a finished transcode into the published share, makes sure the
/// catalog can see it, then removes the working copies. Every stage probes
/// before it acts, so the pipeline can be re-run from scratch after a crash
/// at any point and will only perform the steps still outstanding. No state
/// is persisted between runs: the filesystem and the catalog are the
/// checkpoint.
pub struct Publisher {
    catalog: Arc<dyn VideoCatalog>,
    transcoded_path: PathBuf,
    upload_path: PathBuf,
    path_suffix: PathBuf,
    raw_path: PathBuf,
    verify_attempts: u32,
    verify_delay: Duration,
}

impl Publisher {
    pub fn new(
        catalog: Arc<dyn VideoCatalog>,
        share: &Path,
        path_suffix: &Path,
        transcoded_path: PathBuf,
        raw_path: PathBuf,
    ) -> Self {
        Self {
            catalog,
            upload_path: share.join(path_suffix),
            path_suffix: path_suffix.to_path_buf(),
            transcoded_path,
            raw_path,
            verify_attempts: 3,
            verify_delay: Duration::from_secs(1),
        }
    }

    pub fn with_verify_attempts(mut self, attempts: u32) -> Self {
        self.verify_attempts = attempts;
        self
    }

    pub fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = delay;
        self
    }

    pub async fn run(&self) -> PublishResult<PublishReport> {
        let started_at = Utc::now();

        let destination = probe_size(&self.upload_path).await?;
        let source = probe_size(&self.transcoded_path).await?;
        let uploaded = match decide_upload(destination, source) {
            UploadDecision::Upload => {
                match (destination, source) {
                    (Some(dest), Some(src)) => info!(
                        destination = %format_size(dest, BINARY),
                        source = %format_size(src, BINARY),
                        "existing file on the share differs in size, re-uploading"
                    ),
                    _ => info!(
                        path = %self.upload_path.display(),
                        "the video is not on the share and must be uploaded"
                    ),
                }
                self.upload().await?;
                true
            }
            UploadDecision::AlreadyUploaded => {
                info!("an identical file is already on the share, skipping upload");
                false
            }
            UploadDecision::SourceGone => {
                info!("the transcoded file is gone and the video is on the share, skipping upload");
                false
            }
            UploadDecision::NothingToPublish => {
                return Err(PublishError::NothingToPublish {
                    transcoded: self.transcoded_path.clone(),
                    destination: self.upload_path.clone(),
                })
            }
        };

        let (directory, filename) = logical_path(&self.path_suffix);
        let needs_refresh = if uploaded {
            // The catalog cannot know about a file written moments ago, no
            // matter what a stale index claims.
            true
        } else {
            debug!("checking for the video in the catalog");
            !self.catalog.has_video(&directory, &filename).await?
        };
        let refreshed = if needs_refresh {
            info!("updating the catalog index");
            self.catalog.update().await?;
            self.verify_indexed(&directory, &filename).await?;
            true
        } else {
            info!("the video is already in the catalog, skipping update");
            false
        };

        let removed_transcoded = remove_if_present(&self.transcoded_path).await?;
        let removed_raw = remove_if_present(&self.raw_path).await?;

        Ok(PublishReport {
            started_at,
            finished_at: Utc::now(),
            uploaded,
            refreshed,
            removed_transcoded,
            removed_raw,
        })
    }

    async fn upload(&self) -> PublishResult<()> {
        if let Some(parent) = self.upload_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| PublishError::Io {
                    source,
                    path: parent.to_path_buf(),
                })?;
        }
        fs::copy(&self.transcoded_path, &self.upload_path)
            .await
            .map_err(|source| PublishError::Io {
                source,
                path: self.upload_path.clone(),
            })?;
        Ok(())
    }

    /// Polls the catalog until the entry shows up. The index request already
    /// succeeded, so a transient query failure here is logged and retried
    /// rather than aborting; only exhausting the budget is fatal.
    async fn verify_indexed(&self, directory: &str, filename: &str) -> PublishResult<()> {
        debug!("checking that the video is now in the catalog");
        for attempt in 1..=self.verify_attempts {
            sleep(self.verify_delay).await;
            match self.catalog.has_video(directory, filename).await {
                Ok(true) => return Ok(()),
                Ok(false) => debug!(attempt, "video not indexed yet"),
                Err(err) => warn!(attempt, error = %err, "catalog query failed, retrying"),
            }
        }
        Err(PublishError::VerifyTimeout {
            filename: filename.to_string(),
            attempts: self.verify_attempts,
        })
    }
}

/// The entry the catalog is expected to index for a destination suffix:
/// the name of its containing directory plus the base filename.
fn logical_path(suffix: &Path) -> (String, String) {
    let filename = suffix
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let directory = suffix
        .parent()
        .and_then(|parent| parent.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    (directory, filename)
}

async fn probe_size(path: &Path) -> PublishResult<Option<u64>> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta.len())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PublishError::Io {
            source,
            path: path.to_path_buf(),
        }),
    }
}

async fn remove_if_present(path: &Path) -> PublishResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => {
            info!(path = %path.display(), "removed");
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(PublishError::Io {
            source,
            path: path.to_path_buf(),
        }),
    }
}
