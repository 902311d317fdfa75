//! Content verification of a copied tree

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::transfer::pool::{run_bounded, FirstFailure};
use crate::transfer::{VerifyFailure, VerifyOutcome};
use crate::utils::hex;

/// Compares source and destination trees by SHA-256 digest
#[derive(Debug, Clone, Default)]
pub struct ContentVerifier;

impl ContentVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Check that every file under `source` exists under `destination` with
    /// identical contents. Extra files in `destination` are ignored.
    ///
    /// Hashing stops being scheduled once the first failure is recorded;
    /// that first failure is the one reported.
    pub async fn verify(
        &self,
        source: &Path,
        destination: &Path,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<VerifyOutcome, DeployError> {
        let files = Dir::new(source).walk_files().await?;
        info!(
            "Verifying {} files in {} against {}",
            files.len(),
            destination.display(),
            source.display()
        );

        let failure = Arc::new(FirstFailure::<VerifyFailure>::new());
        let source_root = source.to_path_buf();
        let destination_root = destination.to_path_buf();

        let files_checked = run_bounded(
            files,
            concurrency,
            cancel,
            failure.clone(),
            |_| {},
            move |relative: PathBuf| {
                let expected = File::new(source_root.join(&relative));
                let actual = File::new(destination_root.join(&relative));
                async move { compare(relative, expected, actual).await }
            },
        )
        .await?;

        let failure = failure.cloned();
        match &failure {
            Some(f) => error!("Verification failed: {}", f),
            None => info!("Verified {} files", files_checked),
        }

        Ok(VerifyOutcome {
            files_checked,
            failure,
        })
    }
}

async fn compare(relative: PathBuf, expected: File, actual: File) -> Result<(), VerifyFailure> {
    if !actual.exists().await {
        return Err(VerifyFailure::Missing(relative));
    }

    let unreadable = |relative: &PathBuf, e: DeployError| VerifyFailure::Unreadable {
        path: relative.clone(),
        reason: e.to_string(),
    };
    let source_digest = expected.sha256().await.map_err(|e| unreadable(&relative, e))?;
    let destination_digest = actual.sha256().await.map_err(|e| unreadable(&relative, e))?;

    if source_digest != destination_digest {
        error!(
            "Digest mismatch for {}: source {} destination {}",
            relative.display(),
            hex::encode(source_digest),
            hex::encode(destination_digest)
        );
        return Err(VerifyFailure::Mismatch(relative));
    }

    debug!("Verified {}", relative.display());
    Ok(())
}
