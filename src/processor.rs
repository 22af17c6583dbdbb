//! Document processor: OCR every staged PDF and relocate the result.
//!
//! Flow, per file and strictly sequential:
//! 1. OCR `<stem>.pdf` into `<stem>_ocr.pdf` next to it
//! 2. Move `<stem>_ocr.pdf` into the destination directory
//! 3. Remove the staged original
//!
//! The first error stops the run. Files already moved stay moved; files not
//! yet reached stay staged. There is no rollback.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use crate::error::{Error, Result};
use crate::ocr::OcrEngine;
use crate::staging::Staging;

/// Suffix replacing the `.pdf` extension on OCR output.
pub const OCR_SUFFIX: &str = "_ocr.pdf";

/// Output path for an OCR run: extension replaced by `_ocr.pdf`.
pub fn ocr_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{OCR_SUFFIX}"))
}

/// OCR every PDF under `staging` and move the results into `destination`.
///
/// Returns the destination paths written, in processing order.
pub async fn process_staged(
    staging: &Staging,
    engine: &dyn OcrEngine,
    destination: &Path,
) -> Result<Vec<PathBuf>> {
    let files = staging.list_pdfs()?;
    info!(count = files.len(), "Found staged PDFs");

    let mut produced = Vec::with_capacity(files.len());
    for file in files {
        produced.push(process_one(&file, engine, destination).await?);
    }
    Ok(produced)
}

async fn process_one(
    file: &Path,
    engine: &dyn OcrEngine,
    destination: &Path,
) -> Result<PathBuf> {
    let ocr_file = ocr_output_path(file);
    engine.run(file, &ocr_file).await?;
    info!("OCR ready for {}", file.display());

    let target = match ocr_file.file_name() {
        Some(name) => destination.join(name),
        None => destination.to_path_buf(),
    };
    relocate(&ocr_file, &target).await?;
    info!("File moved to {}", target.display());

    fs::remove_file(file).await.map_err(|source| Error::Remove {
        path: file.to_path_buf(),
        source,
    })?;
    info!("File removed {}", file.display());

    Ok(target)
}

/// Rename `from` to `to`, copying across filesystems when a plain rename
/// cannot.
async fn relocate(from: &Path, to: &Path) -> Result<()> {
    let relocate_err = |source| Error::Relocate {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            fs::copy(from, to).await.map_err(relocate_err)?;
            fs::remove_file(from).await.map_err(relocate_err)?;
            Ok(())
        }
        Err(e) => Err(relocate_err(e)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::OcrError;

    /// Copies input to output and records every call.
    #[derive(Default)]
    struct CopyEngine {
        calls: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl OcrEngine for CopyEngine {
        async fn run(&self, input: &Path, output: &Path) -> std::result::Result<(), OcrError> {
            self.calls.lock().unwrap().push(input.to_path_buf());
            std::fs::copy(input, output).unwrap();
            Ok(())
        }
    }

    #[test]
    fn output_path_replaces_extension() {
        assert_eq!(
            ocr_output_path(Path::new("tmp/invoice.pdf")),
            PathBuf::from("tmp/invoice_ocr.pdf")
        );
        assert_eq!(
            ocr_output_path(Path::new("tmp/a.b.pdf")),
            PathBuf::from("tmp/a.b_ocr.pdf")
        );
    }

    #[tokio::test]
    async fn processes_in_walk_order() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Staging::new(dir.path().join("tmp"));
        let dest = dir.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        staging.write("b.pdf", b"b").await.unwrap();
        staging.write("a.pdf", b"a").await.unwrap();

        let engine = CopyEngine::default();
        let produced = process_staged(&staging, &engine, &dest).await.unwrap();

        assert_eq!(produced, vec![dest.join("a_ocr.pdf"), dest.join("b_ocr.pdf")]);
        let calls = engine.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![staging.path().join("a.pdf"), staging.path().join("b.pdf")]
        );
        assert!(staging.list_pdfs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_staging_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Staging::new(dir.path().join("missing"));
        let produced = process_staged(&staging, &CopyEngine::default(), dir.path())
            .await
            .unwrap();
        assert!(produced.is_empty());
    }

    #[tokio::test]
    async fn missing_destination_is_relocate_error() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Staging::new(dir.path().join("tmp"));
        staging.write("a.pdf", b"a").await.unwrap();

        let err = process_staged(&staging, &CopyEngine::default(), &dir.path().join("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Relocate { .. }));
        // The staged original is only removed after a successful move.
        assert!(staging.path().join("a.pdf").exists());
    }
}
