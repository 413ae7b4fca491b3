//! Archival collaborator: packaging a completed batch directory.
//!
//! The batch writer hands over a working directory containing the batch CSV
//! and its staged files; the archiver produces a single artifact at the
//! destination path. Not part of the transformation logic, so it lives
//! behind a trait and tests mock it.

use std::path::Path;
use std::process::Command;

use async_trait::async_trait;
use tracing::info;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

pub type ArchiveError = Box<dyn std::error::Error + Send + Sync>;

/// Packages one completed batch directory into an artifact at `dest`.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(&self, batch_dir: &Path, dest: &Path) -> Result<(), ArchiveError>;
}

/// Production archiver: zips the batch directory contents with the system
/// `zip` tool, writing the artifact directly at its destination.
pub struct ZipArchiver;

#[async_trait]
impl Archiver for ZipArchiver {
    async fn archive(&self, batch_dir: &Path, dest: &Path) -> Result<(), ArchiveError> {
        let dest_absolute = if dest.is_absolute() {
            dest.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| -> ArchiveError { format!("cannot resolve cwd: {e}").into() })?
                .join(dest)
        };
        let status = Command::new("zip")
            .arg("-q")
            .arg("-r")
            .arg(&dest_absolute)
            .arg(".")
            .current_dir(batch_dir)
            .status()
            .map_err(|e| -> ArchiveError { format!("failed to launch zip: {e}").into() })?;
        if !status.success() {
            return Err(format!("zip exited with {status} for {}", batch_dir.display()).into());
        }
        info!(dest = %dest_absolute.display(), "Created batch archive");
        Ok(())
    }
}

/// Archiver that records the requested paths and writes nothing. Useful for
/// dry runs and for tests that only exercise the batching logic.
#[derive(Default)]
pub struct NoopArchiver;

#[async_trait]
impl Archiver for NoopArchiver {
    async fn archive(&self, batch_dir: &Path, dest: &Path) -> Result<(), ArchiveError> {
        info!(
            batch_dir = %batch_dir.display(),
            dest = %dest.display(),
            "Skipping archive creation (noop archiver)"
        );
        Ok(())
    }
}
