use std::fmt::Write;

use super::{BuildResult, BuildStatus};
use crate::checks::Severity;

/// Results of one orchestrator invocation, one entry per profile.
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub results: Vec<BuildResult>,
}

impl BuildSummary {
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.status == BuildStatus::Failed)
    }

    pub fn count(&self, status: BuildStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn get(&self, id: &str) -> Option<&BuildResult> {
        self.results.iter().find(|r| r.id.as_str() == id)
    }

    /// Human-readable report: one line per profile, then each error and finding once.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            let _ = writeln!(
                out,
                "[{}] {:?} (html: {:?}, pdf: {:?})",
                result.id, result.status, result.html, result.pdf
            );
            for err in result.html_error.iter().chain(result.pdf_error.iter()) {
                let _ = writeln!(out, "  error {}: {err}", err.code());
            }
            for finding in &result.findings {
                let level = match finding.severity {
                    Severity::Info => "info",
                    Severity::Warning => "warning",
                };
                let _ = writeln!(out, "  {level} [{}] {}", finding.source, finding.message);
            }
        }
        let _ = write!(
            out,
            "{} generated, {} skipped, {} failed",
            self.count(BuildStatus::Generated),
            self.count(BuildStatus::Skipped),
            self.count(BuildStatus::Failed)
        );
        out
    }
}
