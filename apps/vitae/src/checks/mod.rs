//! Quality checks — advisory findings about a freshly built profile.
//!
//! Checks never fail a build. A check that cannot run (network down, PDF
//! unreadable, dictionary missing) is reported as a Warning finding instead.

pub mod content;
pub mod html;
pub mod pdf;
pub mod prompts;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::BuildError;
use crate::models::ProfileData;
use crate::store::ProfileId;

pub use content::ContentCritique;
pub use html::HtmlCheck;
pub use pdf::{DictionarySource, PdfCheck, DEFAULT_MAX_PDF_BYTES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindingSource {
    Html,
    Pdf,
    Content,
}

impl fmt::Display for FindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingSource::Html => f.write_str("HTML"),
            FindingSource::Pdf => f.write_str("PDF"),
            FindingSource::Content => f.write_str("Content"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
    pub source: FindingSource,
}

impl Finding {
    pub fn warning(source: FindingSource, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            source,
        }
    }

    pub fn info(source: FindingSource, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            source,
        }
    }
}

/// What a check gets to look at. Artifact paths are only set when the file exists.
pub struct CheckInput<'a> {
    pub id: &'a ProfileId,
    pub data: Option<&'a ProfileData>,
    pub html_path: Option<&'a Path>,
    pub pdf_path: Option<&'a Path>,
}

#[async_trait]
pub trait QualityCheck: Send + Sync {
    fn name(&self) -> &str;

    fn source(&self) -> FindingSource;

    async fn check(&self, input: &CheckInput<'_>) -> Result<Vec<Finding>, BuildError>;
}

/// Ordered set of checks; converts check failures into Warning findings.
#[derive(Clone, Default)]
pub struct CheckSuite {
    checks: Vec<Arc<dyn QualityCheck>>,
}

impl CheckSuite {
    pub fn new(checks: Vec<Arc<dyn QualityCheck>>) -> Self {
        Self { checks }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub async fn run(&self, input: &CheckInput<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for check in &self.checks {
            debug!("Running {} check for '{}'", check.name(), input.id);
            match check.check(input).await {
                Ok(found) => findings.extend(found),
                Err(e) => {
                    warn!("{} check failed for '{}': {e}", check.name(), input.id);
                    let message = match e {
                        BuildError::CheckUnavailable { .. } => e.to_string(),
                        other => format!("{} check unavailable: {other}", check.name()),
                    };
                    findings.push(Finding::warning(check.source(), message));
                }
            }
        }
        findings
    }
}
