use std::collections::BTreeSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::{CheckInput, Finding, FindingSource, QualityCheck};
use crate::errors::BuildError;

static LEFTOVER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{[^{}]*\}\}").expect("static regex"));
static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body[^>]*>(.*)</body>").expect("static regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

/// Flags unresolved template placeholders and documents with no visible text.
pub struct HtmlCheck;

pub fn inspect_html(html: &str) -> Vec<Finding> {
    let mut findings = Vec::new();

    let leftovers: BTreeSet<&str> = LEFTOVER_RE.find_iter(html).map(|m| m.as_str()).collect();
    for placeholder in leftovers {
        findings.push(Finding::warning(
            FindingSource::Html,
            format!("Unresolved placeholder {placeholder}"),
        ));
    }

    let body = BODY_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(html);
    if TAG_RE.replace_all(body, "").trim().is_empty() {
        findings.push(Finding::warning(FindingSource::Html, "HTML output has no visible text"));
    }

    findings
}

#[async_trait]
impl QualityCheck for HtmlCheck {
    fn name(&self) -> &str {
        "HTML"
    }

    fn source(&self) -> FindingSource {
        FindingSource::Html
    }

    async fn check(&self, input: &CheckInput<'_>) -> Result<Vec<Finding>, BuildError> {
        let Some(path) = input.html_path else {
            return Ok(Vec::new());
        };
        let html = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BuildError::io(path, e))?;
        Ok(inspect_html(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_html_has_no_findings() {
        assert!(inspect_html("<html><body><h1>Jane</h1></body></html>").is_empty());
    }

    #[test]
    fn test_leftover_placeholders_reported_once_each() {
        let findings = inspect_html("<body>{{SIGNATURE}} {{SIGNATURE}} {{ FOO }}</body>");
        let messages: Vec<_> = findings.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["Unresolved placeholder {{ FOO }}", "Unresolved placeholder {{SIGNATURE}}"]
        );
    }

    #[test]
    fn test_empty_body_is_flagged() {
        let findings = inspect_html("<html><head><title>x</title></head><body><div> </div></body></html>");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "HTML output has no visible text");
    }
}
