//! Profile data schema — the structured résumé a profile source file describes.
//!
//! Sections are a tagged union keyed by `"type"`. Each entry kind implements
//! [`Entry`], which supplies its canonical ordering key and structured export,
//! so exporting never inspects fields at runtime.

use std::cmp::Reverse;
use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

// ────────────────────────────────────────────────────────────────────────────
// Dates
// ────────────────────────────────────────────────────────────────────────────

/// A partial calendar date: a year, a month, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Date {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
}

impl Date {
    /// Abbreviated month name ("Jan"), or empty if the month is unset or invalid.
    pub fn month_name(&self) -> String {
        self.month
            .and_then(|m| NaiveDate::from_ymd_opt(2000, m, 1))
            .map(|d| d.format("%b").to_string())
            .unwrap_or_default()
    }

    fn sort_key(&self) -> Option<(i32, u32)> {
        self.year.map(|y| (y, self.month.unwrap_or(0)))
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.year, self.month) {
            (Some(year), Some(month)) => write!(f, "{month:02}/{year}"),
            (Some(year), None) => write!(f, "{year}"),
            (None, Some(_)) => write!(f, "{}", self.month_name()),
            (None, None) => Ok(()),
        }
    }
}

/// Either a structured [`Date`] or free text such as `"Present"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateValue {
    Date(Date),
    Text(String),
}

impl DateValue {
    fn sort_key(&self) -> Option<(i32, u32)> {
        match self {
            DateValue::Date(d) => d.sort_key(),
            DateValue::Text(_) => None,
        }
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateValue::Date(d) => fmt::Display::fmt(d, f),
            DateValue::Text(t) => f.write_str(t),
        }
    }
}

/// Formats a start/end pair: "A - B", "Since A", "Until B", or "".
pub fn date_range(start: Option<&DateValue>, end: Option<&DateValue>) -> String {
    let start = start.map(|d| d.to_string()).filter(|s| !s.is_empty());
    let end = end.map(|d| d.to_string()).filter(|s| !s.is_empty());
    match (start, end) {
        (Some(s), Some(e)) => format!("{s} - {e}"),
        (Some(s), None) => format!("Since {s}"),
        (None, Some(e)) => format!("Until {e}"),
        (None, None) => String::new(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Entries
// ────────────────────────────────────────────────────────────────────────────

/// Canonical ordering position of an entry. Dated entries sort newest first;
/// undated entries sort after them in authoring order (the sort is stable).
pub type OrderingKey = Reverse<Option<(i32, u32)>>;

/// Export contract every entry kind implements.
pub trait Entry: Serialize {
    fn ordering_key(&self) -> OrderingKey {
        Reverse(None)
    }

    /// Structured export: unset fields omitted, whitespace runs collapsed.
    fn export(&self) -> Value {
        serde_json::to_value(self)
            .map(collapse_whitespace)
            .unwrap_or(Value::Null)
    }
}

fn period_key(start: Option<&DateValue>, end: Option<&DateValue>) -> OrderingKey {
    Reverse(
        start
            .and_then(DateValue::sort_key)
            .or_else(|| end.and_then(DateValue::sort_key)),
    )
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bullets: Vec<String>,
}

impl Entry for TextEntry {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bullets: Vec<String>,
}

impl JobEntry {
    pub fn date_range(&self) -> String {
        date_range(self.start_date.as_ref(), self.end_date.as_ref())
    }
}

impl Entry for JobEntry {
    fn ordering_key(&self) -> OrderingKey {
        period_key(self.start_date.as_ref(), self.end_date.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EducationEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bullets: Vec<String>,
}

impl EducationEntry {
    pub fn date_range(&self) -> String {
        date_range(self.start_date.as_ref(), self.end_date.as_ref())
    }
}

impl Entry for EducationEntry {
    fn ordering_key(&self) -> OrderingKey {
        period_key(self.start_date.as_ref(), self.end_date.as_ref())
    }
}

/// A titled group of skills, e.g. "Languages: Rust, Go".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillsGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
}

impl Entry for SkillsGroup {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bullets: Vec<String>,
}

impl ProjectEntry {
    pub fn date_range(&self) -> String {
        date_range(self.start_date.as_ref(), self.end_date.as_ref())
    }
}

impl Entry for ProjectEntry {
    fn ordering_key(&self) -> OrderingKey {
        period_key(self.start_date.as_ref(), self.end_date.as_ref())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sections
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionBody<E> {
    pub title: String,
    #[serde(default)]
    pub column: u32,
    #[serde(default = "Vec::new", alias = "groups")]
    pub entries: Vec<E>,
}

impl<E: Entry> SectionBody<E> {
    /// Entries in canonical order.
    pub fn ordered(&self) -> Vec<&E> {
        let mut entries: Vec<&E> = self.entries.iter().collect();
        entries.sort_by_key(|e| e.ordering_key());
        entries
    }

    fn export(&self, kind: &str) -> Value {
        serde_json::json!({
            "type": kind,
            "title": collapse_text(&self.title),
            "column": self.column,
            "entries": self.ordered().into_iter().map(|e| e.export()).collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Section {
    Text(SectionBody<TextEntry>),
    Job(SectionBody<JobEntry>),
    Education(SectionBody<EducationEntry>),
    Skills(SectionBody<SkillsGroup>),
    Project(SectionBody<ProjectEntry>),
}

impl Section {
    pub fn kind(&self) -> &'static str {
        match self {
            Section::Text(_) => "text",
            Section::Job(_) => "job",
            Section::Education(_) => "education",
            Section::Skills(_) => "skills",
            Section::Project(_) => "project",
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Section::Text(b) => &b.title,
            Section::Job(b) => &b.title,
            Section::Education(b) => &b.title,
            Section::Skills(b) => &b.title,
            Section::Project(b) => &b.title,
        }
    }

    pub fn column(&self) -> u32 {
        match self {
            Section::Text(b) => b.column,
            Section::Job(b) => b.column,
            Section::Education(b) => b.column,
            Section::Skills(b) => b.column,
            Section::Project(b) => b.column,
        }
    }

    pub fn export(&self) -> Value {
        let kind = self.kind();
        match self {
            Section::Text(b) => b.export(kind),
            Section::Job(b) => b.export(kind),
            Section::Education(b) => b.export(kind),
            Section::Skills(b) => b.export(kind),
            Section::Project(b) => b.export(kind),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Profile
// ────────────────────────────────────────────────────────────────────────────

fn default_template() -> String {
    "default".to_string()
}

fn default_base_color() -> String {
    "rgb(0, 43, 127)".to_string()
}

fn default_accent_color() -> String {
    "rgb(86, 172, 242)".to_string()
}

fn default_text_color() -> String {
    "rgb(61, 58, 58)".to_string()
}

/// A person's résumé data as authored in `<input>/<id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileData {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Name of the template tree under the templates root.
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default)]
    pub custom_css: Option<String>,
    #[serde(default = "default_base_color")]
    pub base_color: String,
    #[serde(default = "default_accent_color")]
    pub accent_color: String,
    #[serde(default = "default_text_color")]
    pub text_color: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub birthdate: Option<Date>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub photo_file: Option<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl ProfileData {
    /// Which template tree this profile renders with.
    pub fn template_selector(&self) -> &str {
        &self.template
    }

    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }

    pub fn last_name(&self) -> String {
        self.name.split_whitespace().skip(1).collect::<Vec<_>>().join(" ")
    }

    /// Sections grouped by layout column, ascending; authoring order within a column.
    pub fn sections_by_column(&self) -> Vec<(u32, Vec<&Section>)> {
        let mut columns: Vec<(u32, Vec<&Section>)> = Vec::new();
        for section in &self.sections {
            match columns.iter_mut().find(|(c, _)| *c == section.column()) {
                Some((_, group)) => group.push(section),
                None => columns.push((section.column(), vec![section])),
            }
        }
        columns.sort_by_key(|(c, _)| *c);
        columns
    }

    /// Content-only export used by text critique: name, title and sections.
    pub fn export(&self) -> Value {
        let mut out = serde_json::Map::new();
        out.insert("name".into(), Value::String(collapse_text(&self.name)));
        if let Some(title) = &self.title {
            out.insert("title".into(), Value::String(collapse_text(title)));
        }
        out.insert(
            "sections".into(),
            Value::Array(self.sections.iter().map(Section::export).collect()),
        );
        Value::Object(out)
    }
}

fn collapse_text(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").into_owned()
}

fn collapse_whitespace(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(collapse_text(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(collapse_whitespace).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, collapse_whitespace(v)))
                .collect(),
        ),
        other => other,
    }
}
