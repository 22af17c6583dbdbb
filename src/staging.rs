//! Local staging directory for attachments awaiting OCR.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::StagingError;

/// Staging directory handle.
#[derive(Debug, Clone)]
pub struct Staging {
    base_path: PathBuf,
}

impl Staging {
    /// Create a staging handle rooted at `base_path`. Nothing is touched on disk.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    /// Create the staging directory (and parents) if absent.
    pub async fn ensure_dir(&self) -> Result<(), StagingError> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o777);
        builder.create(&self.base_path).await?;
        Ok(())
    }

    /// Resolve an attachment name to its staging path.
    ///
    /// Names are taken as declared; no deduplication. A name that could
    /// land outside the staging directory is refused.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StagingError> {
        let mut components = Path::new(name).components();
        let single_normal = matches!(components.next(), Some(Component::Normal(_)))
            && components.next().is_none();
        if !single_normal || name.contains(['/', '\\']) {
            warn!(name, "Attachment name escapes staging directory");
            return Err(StagingError::UnsafeName(name.to_string()));
        }
        Ok(self.base_path.join(name))
    }

    /// Write an attachment, overwriting any file of the same name.
    pub async fn write(&self, name: &str, content: &[u8]) -> Result<PathBuf, StagingError> {
        let path = self.resolve(name)?;
        self.ensure_dir().await?;

        let write_err = |source| StagingError::Write {
            path: path.clone(),
            source,
        };
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o777);
        let mut file = options.open(&path).await.map_err(write_err)?;
        tokio::io::AsyncWriteExt::write_all(&mut file, content)
            .await
            .map_err(write_err)?;
        tokio::io::AsyncWriteExt::flush(&mut file)
            .await
            .map_err(write_err)?;
        Ok(path)
    }

    /// Every non-directory entry under the staging directory whose name ends
    /// in exactly `.pdf`, in file-name order. Symlinks are listed, not
    /// followed, and a bare `.pdf` counts. A missing directory yields nothing.
    pub fn list_pdfs(&self) -> Result<Vec<PathBuf>, StagingError> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.base_path)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }
            if has_pdf_extension(entry.file_name()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

/// Text after the last `.` is exactly `pdf`.
fn has_pdf_extension(name: &OsStr) -> bool {
    name.to_string_lossy()
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext == "pdf")
}
