//! Build Orchestrator — drives the per-profile pipeline and aggregates results.
//!
//! Flow per profile: staleness check → load data → render HTML → write HTML →
//! convert PDF → write PDF → quality checks.
//!
//! Profiles build one after another. Each profile's pipeline runs in its own
//! task so that an error, or even a panic in a collaborator, ends up in that
//! profile's `BuildResult` and never reaches its siblings.

pub mod summary;
pub mod writer;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::checks::{CheckInput, CheckSuite, Finding};
use crate::errors::BuildError;
use crate::render::{PdfConverter, Renderer};
use crate::resolver::{ArtifactKind, DependencyResolver};
use crate::store::{ProfileId, ProfileStore};

pub use summary::BuildSummary;
pub use writer::write_atomic;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Rebuild regardless of staleness.
    pub force: bool,
    pub skip_pdf: bool,
    pub skip_checks: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    Skipped,
    Generated,
    Failed,
}

/// Outcome of a single stage (HTML or PDF) for one profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    /// The stage was not attempted in this run.
    NotRun,
    /// The artifact was up to date.
    Skipped,
    Generated,
    Failed,
}

#[derive(Debug, Clone)]
pub struct BuildResult {
    pub id: ProfileId,
    pub status: BuildStatus,
    pub html: StageOutcome,
    pub pdf: StageOutcome,
    pub html_error: Option<BuildError>,
    pub pdf_error: Option<BuildError>,
    pub findings: Vec<Finding>,
}

impl BuildResult {
    fn new(id: ProfileId) -> Self {
        Self {
            id,
            status: BuildStatus::Skipped,
            html: StageOutcome::NotRun,
            pdf: StageOutcome::NotRun,
            html_error: None,
            pdf_error: None,
            findings: Vec::new(),
        }
    }

    fn generated_anything(&self) -> bool {
        self.html == StageOutcome::Generated || self.pdf == StageOutcome::Generated
    }

    fn finish(mut self) -> Self {
        self.status = if self.html == StageOutcome::Failed || self.pdf == StageOutcome::Failed {
            BuildStatus::Failed
        } else if self.generated_anything() {
            BuildStatus::Generated
        } else {
            BuildStatus::Skipped
        };
        self
    }
}

fn record(outcome: Result<StageOutcome, BuildError>) -> (StageOutcome, Option<BuildError>) {
    match outcome {
        Ok(stage) => (stage, None),
        Err(e) => (StageOutcome::Failed, Some(e)),
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    resolver: Arc<DependencyResolver>,
    renderer: Arc<dyn Renderer>,
    converter: Arc<dyn PdfConverter>,
    checks: CheckSuite,
}

impl Orchestrator {
    pub fn new(
        resolver: Arc<DependencyResolver>,
        renderer: Arc<dyn Renderer>,
        converter: Arc<dyn PdfConverter>,
        checks: CheckSuite,
    ) -> Self {
        Self {
            resolver,
            renderer,
            converter,
            checks,
        }
    }

    pub fn resolver(&self) -> &Arc<DependencyResolver> {
        &self.resolver
    }

    pub fn store(&self) -> &Arc<ProfileStore> {
        self.resolver.store()
    }

    /// Renders and writes the HTML artifact if it is stale (or `force`).
    /// On failure the previous artifact is left untouched.
    pub async fn build_html(&self, id: &ProfileId, force: bool) -> Result<StageOutcome, BuildError> {
        if !force && !self.resolver.is_stale_html(id)? {
            debug!("[{id}] HTML up to date");
            return Ok(StageOutcome::Skipped);
        }

        let data = self.store().get(id)?;
        let template_tree = self.resolver.template_path(data.template_selector());
        info!("[{id}] Generating HTML with template '{}'...", data.template_selector());

        let markup = self.renderer.render(&template_tree, &data).await?;
        let path = self.resolver.artifact_path(id, ArtifactKind::Html);
        write_atomic(&path, markup.as_bytes())?;

        info!("[{id}] Wrote {}", path.display());
        Ok(StageOutcome::Generated)
    }

    /// Converts whatever HTML artifact is on disk into the PDF artifact.
    /// Unconditional: the caller decides whether a PDF build is wanted.
    pub async fn build_pdf(&self, id: &ProfileId) -> Result<StageOutcome, BuildError> {
        let html_path = self.resolver.artifact_path(id, ArtifactKind::Html);
        if !html_path.is_file() {
            return Err(BuildError::Conversion(format!(
                "no HTML artifact at {}",
                html_path.display()
            )));
        }

        info!("[{id}] Converting to PDF...");
        let bytes = self.converter.convert(&html_path).await?;
        let path = self.resolver.artifact_path(id, ArtifactKind::Pdf);
        write_atomic(&path, &bytes)?;

        info!("[{id}] Wrote {}", path.display());
        Ok(StageOutcome::Generated)
    }

    fn should_build_pdf(&self, id: &ProfileId, html: StageOutcome, force: bool) -> bool {
        if html == StageOutcome::Generated || force {
            return true;
        }
        let html_on_disk = self.resolver.artifact_state(id, ArtifactKind::Html).exists;
        if !html_on_disk {
            return false;
        }
        match self.resolver.is_stale_pdf(id) {
            Ok(stale) => stale,
            Err(e) => {
                warn!("[{id}] Cannot determine PDF staleness: {e}");
                false
            }
        }
    }

    async fn run_checks(&self, id: &ProfileId) -> Vec<Finding> {
        let data = self.store().get(id).ok();
        let html_path = self.resolver.artifact_path(id, ArtifactKind::Html);
        let pdf_path = self.resolver.artifact_path(id, ArtifactKind::Pdf);
        let input = CheckInput {
            id,
            data: data.as_deref(),
            html_path: Some(html_path.as_path()).filter(|p| p.is_file()),
            pdf_path: Some(pdf_path.as_path()).filter(|p| p.is_file()),
        };
        self.checks.run(&input).await
    }

    /// Full pipeline for one profile. Never returns an error: every failure is
    /// captured in the result.
    pub async fn build_profile(&self, id: &ProfileId, options: BuildOptions) -> BuildResult {
        let mut result = BuildResult::new(id.clone());

        let (html, html_error) = record(self.build_html(id, options.force).await);
        result.html = html;
        result.html_error = html_error;
        if let Some(e) = &result.html_error {
            error!("[{id}] HTML generation failed: {e}");
        }

        if options.skip_pdf {
            result.pdf = StageOutcome::NotRun;
        } else if self.should_build_pdf(id, result.html, options.force) {
            let (pdf, pdf_error) = record(self.build_pdf(id).await);
            result.pdf = pdf;
            result.pdf_error = pdf_error;
            if let Some(e) = &result.pdf_error {
                error!("[{id}] PDF generation failed: {e}");
            }
        } else if result.html == StageOutcome::Failed {
            result.pdf = StageOutcome::NotRun;
        } else {
            result.pdf = StageOutcome::Skipped;
        }

        if !options.skip_checks && !self.checks.is_empty() && result.generated_anything() {
            info!("[{id}] Testing...");
            result.findings = self.run_checks(id).await;
        }

        result.finish()
    }

    /// Profiles to build: explicit ids (deduplicated, all must exist) or every
    /// discoverable profile.
    fn targets(&self, ids: Option<&[ProfileId]>) -> Result<Vec<ProfileId>, BuildError> {
        match ids {
            Some(ids) => {
                let mut seen = HashSet::new();
                let mut targets = Vec::new();
                for id in ids {
                    if !self.store().contains(id) {
                        return Err(BuildError::NotFound(id.clone()));
                    }
                    if seen.insert(id.clone()) {
                        targets.push(id.clone());
                    }
                }
                Ok(targets)
            }
            None => Ok(self.store().list_profiles()?.into_iter().collect()),
        }
    }

    /// Builds every targeted profile in turn. Only an unknown explicitly
    /// requested id (or an unreadable input directory) fails the invocation.
    pub async fn build_all(
        &self,
        ids: Option<&[ProfileId]>,
        options: BuildOptions,
    ) -> Result<BuildSummary, BuildError> {
        let targets = self.targets(ids)?;
        let mut summary = BuildSummary::default();

        for id in targets {
            let this = self.clone();
            let task_id = id.clone();
            let handle =
                tokio::spawn(async move { this.build_profile(&task_id, options).await });

            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!("[{id}] Build pipeline aborted: {e}");
                    let mut result = BuildResult::new(id.clone());
                    result.html = StageOutcome::Failed;
                    result.html_error = Some(BuildError::Render(format!("build pipeline aborted: {e}")));
                    result.finish()
                }
            };
            summary.results.push(result);
        }

        Ok(summary)
    }

    /// True if any targeted profile has a stale artifact of one of `kinds`.
    /// Side-effect free apart from refreshing the profile cache.
    pub fn needs_update_for(
        &self,
        ids: Option<&[ProfileId]>,
        kinds: &[ArtifactKind],
    ) -> Result<bool, BuildError> {
        for id in self.targets(ids)? {
            for &kind in kinds {
                match self.resolver.is_stale_kind(&id, kind) {
                    Ok(true) => return Ok(true),
                    Ok(false) => {}
                    // Vanished since listing; let the build report it.
                    Err(BuildError::NotFound(_)) if ids.is_none() => return Ok(true),
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(false)
    }

    pub fn needs_update(&self, ids: Option<&[ProfileId]>) -> Result<bool, BuildError> {
        self.needs_update_for(ids, &ArtifactKind::ALL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{FindingSource, QualityCheck, Severity};
    use crate::clock::testing::{at, write_with_mtime};
    use crate::clock::{self};
    use crate::models::ProfileData;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    // ── fakes ──────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct FakeRenderer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, template_tree: &Path, data: &ProfileData) -> Result<String, BuildError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if data.name == "Explode" {
                return Err(BuildError::Render("template blew up".to_string()));
            }
            if data.name == "Panic" {
                panic!("renderer bug");
            }
            Ok(format!(
                "<html><body>{} via {}</body></html>",
                data.name,
                template_tree.file_name().unwrap().to_string_lossy()
            ))
        }
    }

    #[derive(Default)]
    struct FakeConverter {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PdfConverter for FakeConverter {
        async fn convert(&self, html_path: &Path) -> Result<Vec<u8>, BuildError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BuildError::Conversion("browser crashed".to_string()));
            }
            let html = std::fs::read_to_string(html_path).unwrap();
            Ok(format!("%PDF {html}").into_bytes())
        }
    }

    struct UnreachableCheck;

    #[async_trait]
    impl QualityCheck for UnreachableCheck {
        fn name(&self) -> &str {
            "Content"
        }
        fn source(&self) -> FindingSource {
            FindingSource::Content
        }
        async fn check(&self, _input: &CheckInput<'_>) -> Result<Vec<Finding>, BuildError> {
            Err(BuildError::CheckUnavailable {
                check: "Content".to_string(),
                reason: "network unreachable".to_string(),
            })
        }
    }

    struct Harness {
        _dir: TempDir,
        input: PathBuf,
        templates: PathBuf,
        output: PathBuf,
        renderer: Arc<FakeRenderer>,
        converter: Arc<FakeConverter>,
        orchestrator: Orchestrator,
    }

    fn harness_with(converter: FakeConverter, checks: CheckSuite) -> Harness {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input");
        let templates = dir.path().join("templates");
        let output = dir.path().join("output");
        std::fs::create_dir_all(&input).unwrap();

        let store = Arc::new(ProfileStore::json(&input));
        let resolver = Arc::new(DependencyResolver::new(store, &templates, &output));
        let renderer = Arc::new(FakeRenderer::default());
        let converter = Arc::new(converter);
        let orchestrator =
            Orchestrator::new(resolver, renderer.clone(), converter.clone(), checks);
        Harness {
            _dir: dir,
            input,
            templates,
            output,
            renderer,
            converter,
            orchestrator,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeConverter::default(), CheckSuite::empty())
    }

    impl Harness {
        fn profile(&self, id: &str, name: &str, offset: i64) {
            let body = format!(r#"{{"name":"{name}"}}"#);
            write_with_mtime(&self.input.join(format!("{id}.json")), &body, at(offset));
        }

        fn raw_profile(&self, id: &str, body: &str, offset: i64) {
            write_with_mtime(&self.input.join(format!("{id}.json")), body, at(offset));
        }

        fn template(&self, offset: i64) {
            write_with_mtime(&self.templates.join("default/index.html"), "<html/>", at(offset));
        }

        fn html(&self, id: &str) -> PathBuf {
            self.output.join(format!("{id}.html"))
        }

        fn pdf(&self, id: &str) -> PathBuf {
            self.output.join(format!("{id}.pdf"))
        }

        fn ids(&self, ids: &[&str]) -> Vec<ProfileId> {
            ids.iter().map(|id| ProfileId::from(*id)).collect()
        }
    }

    // ── tests ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_end_to_end_then_idempotent_rerun() {
        let h = harness();
        h.profile("alice", "Alice", 0);
        h.template(-1);
        let ids = h.ids(&["alice"]);

        assert!(h.orchestrator.needs_update(Some(&ids)).unwrap());
        let first = h
            .orchestrator
            .build_all(Some(&ids), BuildOptions::default())
            .await
            .unwrap();
        let alice = first.get("alice").unwrap();
        assert_eq!(alice.status, BuildStatus::Generated);
        assert_eq!(alice.html, StageOutcome::Generated);
        assert_eq!(alice.pdf, StageOutcome::Generated);

        let html_mtime = clock::mtime(&h.html("alice")).unwrap();
        let pdf_mtime = clock::mtime(&h.pdf("alice")).unwrap();
        assert!(html_mtime > at(0));
        assert!(pdf_mtime >= html_mtime);
        assert_eq!(
            std::fs::read_to_string(h.html("alice")).unwrap(),
            "<html><body>Alice via default</body></html>"
        );

        assert!(!h.orchestrator.needs_update(Some(&ids)).unwrap());
        let second = h
            .orchestrator
            .build_all(Some(&ids), BuildOptions::default())
            .await
            .unwrap();
        let alice = second.get("alice").unwrap();
        assert_eq!(alice.status, BuildStatus::Skipped);
        assert_eq!(alice.html, StageOutcome::Skipped);
        assert_eq!(alice.pdf, StageOutcome::Skipped);
        assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.converter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_rebuilds_fresh_profile() {
        let h = harness();
        h.profile("alice", "Alice", 0);
        let ids = h.ids(&["alice"]);
        h.orchestrator.build_all(Some(&ids), BuildOptions::default()).await.unwrap();

        let forced = BuildOptions {
            force: true,
            ..BuildOptions::default()
        };
        let summary = h.orchestrator.build_all(Some(&ids), forced).await.unwrap();
        assert_eq!(summary.get("alice").unwrap().status, BuildStatus::Generated);
        assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.converter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_profile_isolated_from_valid_one() {
        let h = harness();
        h.profile("alice", "Alice", 0);
        h.raw_profile("bob", r#"{"name":"Bob"}"#, 0);

        // Cache a good version of bob, then break it.
        h.orchestrator.store().get(&ProfileId::from("bob")).unwrap();
        h.raw_profile("bob", "{ not json", 10);

        let summary = h
            .orchestrator
            .build_all(None, BuildOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.get("alice").unwrap().status, BuildStatus::Generated);
        let bob = summary.get("bob").unwrap();
        assert_eq!(bob.status, BuildStatus::Failed);
        assert!(matches!(bob.html_error, Some(BuildError::Load { .. })));
        // no HTML on disk for bob, so no PDF attempt
        assert_eq!(bob.pdf, StageOutcome::NotRun);
        assert!(!h.html("bob").exists());

        let last_good = h.orchestrator.store().last_good(&ProfileId::from("bob")).unwrap();
        assert_eq!(last_good.name, "Bob");
        assert!(summary.has_failures());
    }

    #[tokio::test]
    async fn test_render_failure_leaves_previous_artifact() {
        let h = harness();
        h.profile("alice", "Alice", 0);
        let ids = h.ids(&["alice"]);
        h.orchestrator.build_all(Some(&ids), BuildOptions::default()).await.unwrap();
        let before = std::fs::read(h.html("alice")).unwrap();

        // Far-future mtime so the edit is newer than the artifacts.
        h.profile("alice", "Explode", 1_000_000_000);
        let summary = h.orchestrator.build_all(Some(&ids), BuildOptions::default()).await.unwrap();
        let alice = summary.get("alice").unwrap();

        assert_eq!(alice.html, StageOutcome::Failed);
        assert!(matches!(alice.html_error, Some(BuildError::Render(_))));
        assert_eq!(std::fs::read(h.html("alice")).unwrap(), before);
        // PDF is independently stale (source changed) and HTML exists: converted again.
        assert_eq!(alice.pdf, StageOutcome::Generated);
        assert_eq!(alice.status, BuildStatus::Failed);
    }

    #[tokio::test]
    async fn test_conversion_failure_recorded() {
        let h = harness_with(
            FakeConverter {
                fail: true,
                ..FakeConverter::default()
            },
            CheckSuite::empty(),
        );
        h.profile("alice", "Alice", 0);
        let summary = h.orchestrator.build_all(None, BuildOptions::default()).await.unwrap();
        let alice = summary.get("alice").unwrap();

        assert_eq!(alice.html, StageOutcome::Generated);
        assert_eq!(alice.pdf, StageOutcome::Failed);
        assert!(matches!(alice.pdf_error, Some(BuildError::Conversion(_))));
        assert!(!h.pdf("alice").exists());
        assert_eq!(alice.status, BuildStatus::Failed);
    }

    #[tokio::test]
    async fn test_panicking_renderer_does_not_stop_siblings() {
        let h = harness();
        h.profile("a-panics", "Panic", 0);
        h.profile("b-fine", "Fine", 0);

        let summary = h.orchestrator.build_all(None, BuildOptions::default()).await.unwrap();
        assert_eq!(summary.results.len(), 2);
        assert_eq!(summary.get("a-panics").unwrap().status, BuildStatus::Failed);
        assert_eq!(summary.get("b-fine").unwrap().status, BuildStatus::Generated);
    }

    #[tokio::test]
    async fn test_check_failure_is_warning_not_failure() {
        let h = harness_with(
            FakeConverter::default(),
            CheckSuite::new(vec![Arc::new(UnreachableCheck)]),
        );
        h.profile("alice", "Alice", 0);
        let summary = h.orchestrator.build_all(None, BuildOptions::default()).await.unwrap();
        let alice = summary.get("alice").unwrap();

        assert_eq!(alice.status, BuildStatus::Generated);
        assert_eq!(alice.findings.len(), 1);
        assert_eq!(alice.findings[0].severity, Severity::Warning);
        assert_eq!(
            alice.findings[0].message,
            "Content check unavailable: network unreachable"
        );
    }

    #[tokio::test]
    async fn test_checks_skipped_when_nothing_generated() {
        let h = harness_with(
            FakeConverter::default(),
            CheckSuite::new(vec![Arc::new(UnreachableCheck)]),
        );
        h.profile("alice", "Alice", 0);
        h.orchestrator.build_all(None, BuildOptions::default()).await.unwrap();
        let again = h.orchestrator.build_all(None, BuildOptions::default()).await.unwrap();
        assert!(again.get("alice").unwrap().findings.is_empty());
    }

    #[tokio::test]
    async fn test_skip_pdf_option() {
        let h = harness();
        h.profile("alice", "Alice", 0);
        let options = BuildOptions {
            skip_pdf: true,
            ..BuildOptions::default()
        };
        let summary = h.orchestrator.build_all(None, options).await.unwrap();
        let alice = summary.get("alice").unwrap();
        assert_eq!(alice.pdf, StageOutcome::NotRun);
        assert!(!h.pdf("alice").exists());
        assert!(!h
            .orchestrator
            .needs_update_for(None, &[ArtifactKind::Html])
            .unwrap());
        assert!(h.orchestrator.needs_update(None).unwrap());
    }

    #[tokio::test]
    async fn test_stale_pdf_rebuilt_when_html_fresh() {
        let h = harness();
        h.profile("alice", "Alice", 0);
        h.orchestrator.build_all(None, BuildOptions::default()).await.unwrap();
        std::fs::remove_file(h.pdf("alice")).unwrap();

        let summary = h.orchestrator.build_all(None, BuildOptions::default()).await.unwrap();
        let alice = summary.get("alice").unwrap();
        assert_eq!(alice.html, StageOutcome::Skipped);
        assert_eq!(alice.pdf, StageOutcome::Generated);
        assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_explicit_id_is_hard_failure() {
        let h = harness();
        h.profile("alice", "Alice", 0);
        let ids = h.ids(&["alice", "ghost"]);

        let err = h
            .orchestrator
            .build_all(Some(&ids), BuildOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::NotFound(ref id) if id.as_str() == "ghost"));
        // nothing was built before the error surfaced
        assert!(!h.html("alice").exists());
        assert!(h.orchestrator.needs_update(Some(&ids)).is_err());
    }

    #[tokio::test]
    async fn test_duplicate_ids_build_once() {
        let h = harness();
        h.profile("alice", "Alice", 0);
        let ids = h.ids(&["alice", "alice"]);
        let summary = h.orchestrator.build_all(Some(&ids), BuildOptions::default()).await.unwrap();
        assert_eq!(summary.results.len(), 1);
    }

    #[tokio::test]
    async fn test_build_pdf_without_html_is_conversion_error() {
        let h = harness();
        h.profile("alice", "Alice", 0);
        let err = h.orchestrator.build_pdf(&ProfileId::from("alice")).await.unwrap_err();
        assert!(matches!(err, BuildError::Conversion(_)));
    }
}
