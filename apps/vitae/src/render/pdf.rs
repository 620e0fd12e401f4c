//! HTML → PDF conversion through a headless browser.
//!
//! One browser process per conversion, printing into a scratch directory that
//! is removed when the call returns. No session is kept between builds.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::BuildError;

const CONVERSION_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait PdfConverter: Send + Sync {
    async fn convert(&self, html_path: &Path) -> Result<Vec<u8>, BuildError>;
}

/// Chromium-family `--print-to-pdf` converter.
pub struct BrowserPdfConverter {
    browser: PathBuf,
    timeout: Duration,
}

impl BrowserPdfConverter {
    pub fn new(browser: impl Into<PathBuf>) -> Self {
        Self {
            browser: browser.into(),
            timeout: CONVERSION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl PdfConverter for BrowserPdfConverter {
    async fn convert(&self, html_path: &Path) -> Result<Vec<u8>, BuildError> {
        let html_abs = std::fs::canonicalize(html_path).map_err(|e| {
            BuildError::Conversion(format!("HTML artifact {} unavailable: {e}", html_path.display()))
        })?;
        let scratch = tempfile::tempdir()
            .map_err(|e| BuildError::Conversion(format!("cannot create scratch dir: {e}")))?;
        let pdf_path = scratch.path().join("out.pdf");

        debug!(
            "Converting {} with {}",
            html_abs.display(),
            self.browser.display()
        );

        let child = Command::new(&self.browser)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-pdf-header-footer")
            .arg(format!("--print-to-pdf={}", pdf_path.display()))
            .arg(format!("file://{}", html_abs.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BuildError::Conversion(format!("cannot start {}: {e}", self.browser.display()))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                BuildError::Conversion(format!(
                    "browser did not finish within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| BuildError::Conversion(format!("browser process failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Browser exited with {}: {}", output.status, stderr.trim());
            return Err(BuildError::Conversion(format!(
                "browser exited with {}",
                output.status
            )));
        }

        let bytes = tokio::fs::read(&pdf_path)
            .await
            .map_err(|e| BuildError::Conversion(format!("browser produced no PDF: {e}")))?;
        if bytes.is_empty() {
            return Err(BuildError::Conversion("browser produced an empty PDF".to_string()));
        }

        Ok(bytes)
    }
}
