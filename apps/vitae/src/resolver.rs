//! Dependency Resolver — decides whether a profile's artifacts are stale.
//!
//! Dependency chain:
//!   data source ─┐
//!                ├─> HTML ──> PDF
//!   template tree┘
//!
//! An artifact is stale if it does not exist, or any of its inputs has a
//! strictly newer mtime. Equal timestamps are fresh. An absent template tree
//! contributes nothing (a missing template is a data error, not a reason to
//! rebuild forever).

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::{self, Timestamp};
use crate::errors::BuildError;
use crate::store::{ProfileId, ProfileStore};

/// Files the renderer reads from a template tree: markup and stylesheets.
/// Anything else in the tree (previews, notes) does not count.
pub const TEMPLATE_SUFFIXES: &[&str] = &[".html", ".css"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    Html,
    Pdf,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Html, ArtifactKind::Pdf];

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Html => "html",
            ArtifactKind::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Html => f.write_str("HTML"),
            ArtifactKind::Pdf => f.write_str("PDF"),
        }
    }
}

/// Derived on demand from the filesystem; never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactState {
    pub exists: bool,
    pub mtime: Timestamp,
}

/// Why an artifact needs regeneration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Staleness {
    Fresh,
    Missing,
    SourceChanged,
    TemplateChanged,
    HtmlChanged,
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        !matches!(self, Staleness::Fresh)
    }
}

/// Maps profiles to artifact paths and template trees, and answers staleness queries.
pub struct DependencyResolver {
    store: Arc<ProfileStore>,
    templates_dir: PathBuf,
    output_dir: PathBuf,
}

impl DependencyResolver {
    pub fn new(
        store: Arc<ProfileStore>,
        templates_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            templates_dir: templates_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn store(&self) -> &Arc<ProfileStore> {
        &self.store
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    /// `<output>/<id>.<ext>`
    pub fn artifact_path(&self, id: &ProfileId, kind: ArtifactKind) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", id.as_str(), kind.extension()))
    }

    pub fn artifact_state(&self, id: &ProfileId, kind: ArtifactKind) -> ArtifactState {
        let mtime = clock::mtime(&self.artifact_path(id, kind));
        ArtifactState {
            exists: mtime.is_some(),
            mtime,
        }
    }

    pub fn template_path(&self, template: &str) -> PathBuf {
        self.templates_dir.join(template)
    }

    /// Name of the template tree containing `path`, if it lies under the templates root.
    pub fn template_for_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.templates_dir).ok()?;
        relative
            .components()
            .next()
            .and_then(|c| c.as_os_str().to_str())
            .map(str::to_string)
    }

    pub fn template_max_mtime(&self, template: &str) -> Timestamp {
        clock::max_mtime(&self.template_path(template), TEMPLATE_SUFFIXES)
    }

    fn template_mtime_of(&self, id: &ProfileId) -> Result<Timestamp, BuildError> {
        Ok(self
            .store
            .template_of(id)?
            .and_then(|template| self.template_max_mtime(&template)))
    }

    /// Staleness of one artifact kind, with the reason.
    pub fn staleness(&self, id: &ProfileId, kind: ArtifactKind) -> Result<Staleness, BuildError> {
        if !self.store.contains(id) {
            return Err(BuildError::NotFound(id.clone()));
        }

        let artifact = self.artifact_state(id, kind);
        if !artifact.exists {
            return Ok(Staleness::Missing);
        }
        if clock::is_newer(self.store.source_mtime(id), artifact.mtime) {
            return Ok(Staleness::SourceChanged);
        }
        if clock::is_newer(self.template_mtime_of(id)?, artifact.mtime) {
            return Ok(Staleness::TemplateChanged);
        }
        if kind == ArtifactKind::Pdf {
            let html = self.artifact_state(id, ArtifactKind::Html);
            if clock::is_newer(html.mtime, artifact.mtime) {
                return Ok(Staleness::HtmlChanged);
            }
        }
        Ok(Staleness::Fresh)
    }

    pub fn is_stale_kind(&self, id: &ProfileId, kind: ArtifactKind) -> Result<bool, BuildError> {
        Ok(self.staleness(id, kind)?.is_stale())
    }

    pub fn is_stale_html(&self, id: &ProfileId) -> Result<bool, BuildError> {
        self.is_stale_kind(id, ArtifactKind::Html)
    }

    pub fn is_stale_pdf(&self, id: &ProfileId) -> Result<bool, BuildError> {
        self.is_stale_kind(id, ArtifactKind::Pdf)
    }

    /// True if any artifact kind of `id` is stale.
    pub fn is_stale(&self, id: &ProfileId) -> Result<bool, BuildError> {
        for kind in ArtifactKind::ALL {
            if self.is_stale_kind(id, kind)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::{at, set_mtime, write_with_mtime};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        input: PathBuf,
        templates: PathBuf,
        output: PathBuf,
        resolver: DependencyResolver,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input");
        let templates = dir.path().join("templates");
        let output = dir.path().join("output");
        std::fs::create_dir_all(&input).unwrap();
        let store = Arc::new(ProfileStore::json(&input));
        let resolver = DependencyResolver::new(store, &templates, &output);
        Fixture {
            _dir: dir,
            input,
            templates,
            output,
            resolver,
        }
    }

    fn alice() -> ProfileId {
        ProfileId::from("alice")
    }

    impl Fixture {
        fn profile(&self, template: &str, offset: i64) {
            let body = format!(r#"{{"name":"Alice","template":"{template}"}}"#);
            write_with_mtime(&self.input.join("alice.json"), &body, at(offset));
        }

        fn template_file(&self, template: &str, file: &str, offset: i64) {
            write_with_mtime(&self.templates.join(template).join(file), "<html/>", at(offset));
        }

        fn artifact(&self, ext: &str, offset: i64) {
            write_with_mtime(&self.output.join(format!("alice.{ext}")), "x", at(offset));
        }
    }

    #[test]
    fn test_no_artifacts_means_both_stale() {
        let f = fixture();
        f.profile("default", 0);
        assert_eq!(f.resolver.staleness(&alice(), ArtifactKind::Html).unwrap(), Staleness::Missing);
        assert!(f.resolver.is_stale_html(&alice()).unwrap());
        assert!(f.resolver.is_stale_pdf(&alice()).unwrap());
    }

    #[test]
    fn test_unknown_profile_is_not_found() {
        let f = fixture();
        let err = f.resolver.is_stale(&ProfileId::from("ghost")).unwrap_err();
        assert!(matches!(err, BuildError::NotFound(_)));
    }

    #[test]
    fn test_source_newer_than_html_is_stale_equal_is_fresh() {
        let f = fixture();
        f.profile("default", 10);
        f.artifact("html", 5);
        assert_eq!(
            f.resolver.staleness(&alice(), ArtifactKind::Html).unwrap(),
            Staleness::SourceChanged
        );

        set_mtime(&f.input.join("alice.json"), at(5));
        assert!(!f.resolver.is_stale_html(&alice()).unwrap());
    }

    #[test]
    fn test_template_newer_than_html_is_stale() {
        let f = fixture();
        f.profile("modern", 0);
        f.template_file("modern", "index.html", 20);
        f.template_file("modern", "preview.png", 100);
        f.artifact("html", 10);
        assert_eq!(
            f.resolver.staleness(&alice(), ArtifactKind::Html).unwrap(),
            Staleness::TemplateChanged
        );

        set_mtime(&f.templates.join("modern/index.html"), at(10));
        // files the renderer never reads do not count
        assert!(!f.resolver.is_stale_html(&alice()).unwrap());
    }

    #[test]
    fn test_stylesheet_edit_makes_html_and_pdf_stale() {
        let f = fixture();
        f.profile("modern", 0);
        f.template_file("modern", "index.html", 0);
        f.template_file("modern", "style.css", 0);
        f.artifact("html", 10);
        f.artifact("pdf", 10);
        assert!(!f.resolver.is_stale(&alice()).unwrap());

        set_mtime(&f.templates.join("modern/style.css"), at(20));
        assert_eq!(
            f.resolver.staleness(&alice(), ArtifactKind::Html).unwrap(),
            Staleness::TemplateChanged
        );
        assert!(f.resolver.is_stale_pdf(&alice()).unwrap());
    }

    #[test]
    fn test_missing_template_tree_contributes_nothing() {
        let f = fixture();
        f.profile("does-not-exist", 0);
        f.artifact("html", 10);
        assert!(!f.resolver.is_stale_html(&alice()).unwrap());
    }

    #[test]
    fn test_pdf_chained_on_html() {
        let f = fixture();
        f.profile("default", 0);
        f.artifact("html", 20);
        f.artifact("pdf", 10);
        assert!(!f.resolver.is_stale_html(&alice()).unwrap());
        assert_eq!(
            f.resolver.staleness(&alice(), ArtifactKind::Pdf).unwrap(),
            Staleness::HtmlChanged
        );
        assert!(f.resolver.is_stale(&alice()).unwrap());

        set_mtime(&f.output.join("alice.pdf"), at(20));
        assert!(!f.resolver.is_stale(&alice()).unwrap());
    }

    #[test]
    fn test_broken_profile_uses_last_good_template() {
        let f = fixture();
        f.profile("modern", 0);
        f.template_file("modern", "index.html", 0);
        f.artifact("html", 10);
        assert!(!f.resolver.is_stale_html(&alice()).unwrap());

        write_with_mtime(&f.input.join("alice.json"), "{ nope", at(5));
        // source older than artifact, template from the cached record
        assert!(!f.resolver.is_stale_html(&alice()).unwrap());
        set_mtime(&f.templates.join("modern/index.html"), at(30));
        assert!(f.resolver.is_stale_html(&alice()).unwrap());
    }

    #[test]
    fn test_paths() {
        let f = fixture();
        assert_eq!(
            f.resolver.artifact_path(&alice(), ArtifactKind::Pdf),
            f.output.join("alice.pdf")
        );
        assert_eq!(
            f.resolver.template_for_path(&f.templates.join("modern/parts/job.html")),
            Some("modern".to_string())
        );
        assert_eq!(f.resolver.template_for_path(&f.input.join("alice.json")), None);
    }
}
