//! External OCR invocation.
//!
//! The OCR tool is a black box: `<program> <input> <output>`. A spawn
//! failure or a non-zero exit is fatal to the run.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::DEFAULT_OCR_COMMAND;
use crate::error::OcrError;

/// Maximum stderr kept in an error (4KB).
const MAX_STDERR_SIZE: usize = 4 * 1024;

/// Something that turns a scanned PDF into a searchable one.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Read `input`, write the searchable result to `output`.
    async fn run(&self, input: &Path, output: &Path) -> Result<(), OcrError>;
}

/// `ocrmypdf` subprocess.
#[derive(Debug, Clone)]
pub struct OcrMyPdf {
    program: String,
}

impl OcrMyPdf {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for OcrMyPdf {
    fn default() -> Self {
        Self::new(DEFAULT_OCR_COMMAND)
    }
}

#[async_trait]
impl OcrEngine for OcrMyPdf {
    async fn run(&self, input: &Path, output: &Path) -> Result<(), OcrError> {
        debug!(program = %self.program, input = %input.display(), "Running OCR");

        let result = Command::new(&self.program)
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| OcrError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if result.status.success() {
            return Ok(());
        }

        Err(OcrError::Failed {
            program: self.program.clone(),
            input: input.to_path_buf(),
            code: result.status.code(),
            stderr: truncate_stderr(&String::from_utf8_lossy(&result.stderr)),
        })
    }
}

/// Keep the tail of stderr, where tools put the actual error (UTF-8 safe).
fn truncate_stderr(s: &str) -> String {
    let s = s.trim();
    if s.len() <= MAX_STDERR_SIZE {
        return s.to_string();
    }
    let mut start = s.len() - MAX_STDERR_SIZE;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("[truncated {} bytes] ...{}", start, &s[start..])
}
