//! Audio staging
//!
//! Every accepted upload is written twice: a permanent copy under a
//! generated name in the upload directory, and a transient working copy
//! handed to the model and removed afterwards.

use echotext_common::{EchoTextError, Result};
use echotext_stt::audio;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};
use uuid::Uuid;

/// Writes uploads to the upload and work directories
#[derive(Debug, Clone)]
pub struct AudioStager {
    upload_dir: PathBuf,
    work_dir: PathBuf,
}

/// Result of staging one upload
#[derive(Debug)]
pub struct StagedAudio {
    /// Transient copy for the model
    pub working: WorkingCopy,

    /// Permanent copy, kept after the request
    pub permanent_path: PathBuf,

    /// File name of the permanent copy (`{permanent_id}.{ext}`)
    pub permanent_name: String,

    pub permanent_id: Uuid,
}

/// Transient working copy, deleted on `release` or drop
#[derive(Debug)]
pub struct WorkingCopy(TempPath);

impl WorkingCopy {
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Remove the working copy now, logging instead of failing
    pub fn release(self) {
        let path = self.0.to_path_buf();
        match self.0.close() {
            Ok(()) => debug!("Released working copy {}", path.display()),
            Err(e) => warn!("Failed to remove working copy {}: {}", path.display(), e),
        }
    }
}

impl AudioStager {
    pub fn new(upload_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            work_dir: work_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Validate the extension, then write the working and permanent copies.
    ///
    /// Both writes complete before this returns. If either fails, the working
    /// copy is removed and no permanent copy is left half-written.
    pub async fn stage(&self, bytes: &[u8], original_filename: &str) -> Result<StagedAudio> {
        if !audio::is_accepted(original_filename) {
            return Err(EchoTextError::invalid_input("Invalid file type."));
        }
        let ext = audio::extension_of(original_filename)
            .ok_or_else(|| EchoTextError::invalid_input("Invalid file type."))?;

        let working = tempfile::Builder::new()
            .prefix("echotext-")
            .suffix(&format!(".{}", ext))
            .tempfile_in(&self.work_dir)
            .map_err(|e| {
                EchoTextError::storage(format!(
                    "Failed to create working copy in {}: {}",
                    self.work_dir.display(),
                    e
                ))
            })?
            .into_temp_path();
        let working = WorkingCopy(working);

        tokio::fs::write(working.path(), bytes).await.map_err(|e| {
            EchoTextError::storage(format!("Failed to write working copy: {}", e))
        })?;

        let permanent_id = Uuid::new_v4();
        let permanent_name = format!("{}.{}", permanent_id, ext);
        let permanent_path = self.upload_dir.join(&permanent_name);

        if let Err(e) = tokio::fs::write(&permanent_path, bytes).await {
            let _ = tokio::fs::remove_file(&permanent_path).await;
            return Err(EchoTextError::storage(format!(
                "Failed to write {}: {}",
                permanent_path.display(),
                e
            )));
        }

        debug!(
            "Staged {} ({} bytes) as {} with working copy {}",
            original_filename,
            bytes.len(),
            permanent_name,
            working.path().display()
        );

        Ok(StagedAudio {
            working,
            permanent_path,
            permanent_name,
            permanent_id,
        })
    }
}
