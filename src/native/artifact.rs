use std::path::{Path, PathBuf};

use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::{constants::ARTIFACT_SUFFIX, core::traits::runner::RunError};

/// Input file owned by exactly one execution.
///
/// Call [`TransientArtifact::release`] when the process is done; if the
/// owner is dropped first (cancelled request, panic) the file is removed
/// synchronously on drop instead.
#[derive(Debug)]
pub struct TransientArtifact {
    path: PathBuf,
    released: bool,
}

impl TransientArtifact {
    #[tracing::instrument(skip(payload), fields(bytes = payload.len()))]
    pub async fn create(dir: &Path, payload: &[u8]) -> Result<Self, RunError> {
        let path = dir.join(format!("{}.{}", Uuid::new_v4(), ARTIFACT_SUFFIX));
        let write_err = |e: std::io::Error| RunError::ArtifactWrite {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        fs::create_dir_all(dir).await.map_err(write_err)?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(write_err)?;

        // From here on the file exists, so failures must not leak it.
        let artifact = Self {
            path: path.clone(),
            released: false,
        };

        file.write_all(payload).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;
        drop(file);

        tracing::debug!(path = %artifact.path.display(), "Artifact written");
        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn release(mut self) {
        self.released = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Artifact removed"),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove artifact"
            ),
        }
    }
}

impl Drop for TransientArtifact {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove artifact on drop"
            );
        }
    }
}
