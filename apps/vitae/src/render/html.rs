//! HTML fragments for profile sections and the contact block.

use std::fmt::Write;

use crate::models::profile::{
    EducationEntry, JobEntry, ProfileData, ProjectEntry, Section, SectionBody, SkillsGroup,
    TextEntry,
};

use super::markdown::render_inline;

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn push_opt(out: &mut String, class: &str, text: Option<&str>) {
    if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
        let _ = write!(out, "<span class=\"{class}\">{}</span>", render_inline(text));
    }
}

fn push_bullets(out: &mut String, bullets: &[String]) {
    if bullets.is_empty() {
        return;
    }
    out.push_str("<ul class=\"bullets\">");
    for bullet in bullets {
        let _ = write!(out, "<li>{}</li>", render_inline(bullet));
    }
    out.push_str("</ul>");
}

fn push_description(out: &mut String, text: Option<&str>) {
    if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
        let _ = write!(out, "<p class=\"description\">{}</p>", render_inline(text));
    }
}

fn push_header(out: &mut String, title: Option<&str>, subtitle: Option<&str>, meta: &[&str]) {
    out.push_str("<div class=\"entry-header\">");
    push_opt(out, "entry-title", title);
    push_opt(out, "entry-subtitle", subtitle);
    let meta: Vec<&str> = meta.iter().copied().filter(|m| !m.is_empty()).collect();
    if !meta.is_empty() {
        let _ = write!(
            out,
            "<span class=\"entry-meta\">{}</span>",
            escape_html(&meta.join(" | "))
        );
    }
    out.push_str("</div>");
}

fn text_entry(out: &mut String, e: &TextEntry) {
    push_description(out, e.text.as_deref());
    push_bullets(out, &e.bullets);
}

fn job_entry(out: &mut String, e: &JobEntry) {
    let range = e.date_range();
    let location = e.location.as_deref().unwrap_or("");
    push_header(out, e.title.as_deref(), e.company.as_deref(), &[&range, location]);
    push_opt(out, "entry-link", e.link.as_deref());
    push_description(out, e.description.as_deref());
    push_bullets(out, &e.bullets);
}

fn education_entry(out: &mut String, e: &EducationEntry) {
    let range = e.date_range();
    let location = e.location.as_deref().unwrap_or("");
    let grade = e.grade.as_deref().unwrap_or("");
    push_header(out, e.field.as_deref(), e.school.as_deref(), &[&range, location, grade]);
    push_bullets(out, &e.bullets);
}

fn skills_group(out: &mut String, e: &SkillsGroup) {
    push_opt(out, "skills-title", e.title.as_deref());
    if !e.skills.is_empty() {
        out.push_str("<ul class=\"skills\">");
        for skill in &e.skills {
            let _ = write!(out, "<li>{}</li>", render_inline(skill));
        }
        out.push_str("</ul>");
    }
}

fn project_entry(out: &mut String, e: &ProjectEntry) {
    let range = e.date_range();
    push_header(out, e.title.as_deref(), None, &[&range]);
    push_opt(out, "entry-link", e.link.as_deref());
    push_description(out, e.description.as_deref());
    push_bullets(out, &e.bullets);
}

fn section_body<E: crate::models::profile::Entry>(
    out: &mut String,
    kind: &str,
    body: &SectionBody<E>,
    entry: fn(&mut String, &E),
) {
    let _ = write!(
        out,
        "<section class=\"section section-{kind}\"><h2>{}</h2>",
        escape_html(&body.title)
    );
    for e in body.ordered() {
        out.push_str("<div class=\"entry\">");
        entry(out, e);
        out.push_str("</div>");
    }
    out.push_str("</section>\n");
}

pub fn render_section(section: &Section) -> String {
    let mut out = String::new();
    let kind = section.kind();
    match section {
        Section::Text(b) => section_body(&mut out, kind, b, text_entry),
        Section::Job(b) => section_body(&mut out, kind, b, job_entry),
        Section::Education(b) => section_body(&mut out, kind, b, education_entry),
        Section::Skills(b) => section_body(&mut out, kind, b, skills_group),
        Section::Project(b) => section_body(&mut out, kind, b, project_entry),
    }
    out
}

pub fn render_sections<'a>(sections: impl IntoIterator<Item = &'a Section>) -> String {
    sections.into_iter().map(render_section).collect()
}

pub fn render_contact(profile: &ProfileData) -> String {
    let birthdate = profile.birthdate.map(|d| d.to_string());
    let items = [
        ("phone", profile.phone.as_deref()),
        ("email", profile.email.as_deref()),
        ("location", profile.location.as_deref()),
        ("link", profile.link.as_deref()),
        ("birthdate", birthdate.as_deref()),
    ];

    let mut out = String::from("<ul class=\"contact\">");
    for (class, value) in items {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            let _ = write!(out, "<li class=\"{class}\">{}</li>", render_inline(value));
        }
    }
    out.push_str("</ul>");
    out
}
