//! Rendering collaborators: profile → HTML markup, HTML → PDF bytes.
//!
//! The orchestrator only sees the [`Renderer`] and [`pdf::PdfConverter`]
//! traits. `PlaceholderRenderer` is the built-in template engine: a template
//! tree is a directory holding `index.html` (and optionally `style.css`)
//! with `{{PLACEHOLDER}}` markers.

pub mod html;
pub mod markdown;
pub mod pdf;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::{Captures, Regex};
use tracing::debug;

use crate::errors::BuildError;
use crate::models::ProfileData;

pub use pdf::{BrowserPdfConverter, PdfConverter};

pub const TEMPLATE_ENTRY: &str = "index.html";
pub const TEMPLATE_STYLESHEET: &str = "style.css";

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Z][A-Z0-9_]*)\s*\}\}").expect("static regex"));

/// Turns a template tree plus profile data into HTML markup.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, template_tree: &Path, data: &ProfileData) -> Result<String, BuildError>;
}

/// Substitutes `{{NAME}}`, `{{FIRST_NAME}}`, `{{LAST_NAME}}`, `{{TITLE}}`,
/// `{{CONTACT}}`, `{{PHOTO}}`, `{{STYLE}}`, `{{SECTIONS}}` and `{{COLUMN_<n>}}`.
/// Unknown placeholders are left in place.
pub struct PlaceholderRenderer {
    /// Directory `photo_file` is resolved against.
    assets_dir: PathBuf,
}

impl PlaceholderRenderer {
    pub fn new(assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
        }
    }

    fn style(&self, template_tree: &Path, data: &ProfileData) -> Result<String, BuildError> {
        let mut css = format!(
            ":root {{ --base-color: {}; --accent-color: {}; --text-color: {}; }}\n",
            data.base_color, data.accent_color, data.text_color
        );
        let stylesheet = template_tree.join(TEMPLATE_STYLESHEET);
        if stylesheet.is_file() {
            let sheet = std::fs::read_to_string(&stylesheet)
                .map_err(|e| BuildError::Render(format!("{}: {e}", stylesheet.display())))?;
            css.push_str(&sheet);
            css.push('\n');
        }
        if let Some(custom) = &data.custom_css {
            css.push_str(custom);
            css.push('\n');
        }
        Ok(css)
    }

    fn photo(&self, data: &ProfileData) -> String {
        let Some(file) = &data.photo_file else {
            return String::new();
        };
        let path = self.assets_dir.join(file);
        match std::fs::canonicalize(&path) {
            Ok(abs) => format!(
                "<img class=\"photo\" src=\"file://{}\" alt=\"{}\">",
                html::escape_html(&abs.to_string_lossy()),
                html::escape_html(&data.name)
            ),
            Err(_) => {
                debug!("Photo {} not found; omitting", path.display());
                String::new()
            }
        }
    }

    fn values(&self, template_tree: &Path, data: &ProfileData) -> Result<HashMap<String, String>, BuildError> {
        let mut values = HashMap::new();
        values.insert("NAME".to_string(), html::escape_html(&data.name));
        values.insert("FIRST_NAME".to_string(), html::escape_html(data.first_name()));
        values.insert("LAST_NAME".to_string(), html::escape_html(&data.last_name()));
        values.insert(
            "TITLE".to_string(),
            html::escape_html(data.title.as_deref().unwrap_or("")),
        );
        values.insert("CONTACT".to_string(), html::render_contact(data));
        values.insert("PHOTO".to_string(), self.photo(data));
        values.insert("STYLE".to_string(), self.style(template_tree, data)?);
        values.insert("SECTIONS".to_string(), html::render_sections(&data.sections));
        for (column, sections) in data.sections_by_column() {
            values.insert(
                format!("COLUMN_{column}"),
                html::render_sections(sections.into_iter()),
            );
        }
        Ok(values)
    }
}

#[async_trait]
impl Renderer for PlaceholderRenderer {
    async fn render(&self, template_tree: &Path, data: &ProfileData) -> Result<String, BuildError> {
        let entry = template_tree.join(TEMPLATE_ENTRY);
        let template = std::fs::read_to_string(&entry).map_err(|e| {
            BuildError::Render(format!("cannot read template {}: {e}", entry.display()))
        })?;

        let values = self.values(template_tree, data)?;
        let rendered = PLACEHOLDER_RE.replace_all(&template, |caps: &Captures<'_>| {
            let key = &caps[1];
            match values.get(key) {
                Some(value) => value.clone(),
                // Empty columns render as nothing.
                None if key.starts_with("COLUMN_") => String::new(),
                None => caps[0].to_string(),
            }
        });

        Ok(rendered.into_owned())
    }
}
