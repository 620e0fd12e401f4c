//! Inline markdown for free-text profile fields.
//!
//! Handles `[text](url)`, `**bold**`, `*italic*`, `__underline__`, bare URLs,
//! e-mail addresses and phone numbers, and collapses whitespace runs. Input is
//! HTML-escaped first, so profile text can never inject markup.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::html::escape_html;

type Transform = fn(&Captures<'_>) -> String;

struct Rule {
    pattern: Regex,
    transform: Transform,
}

fn rule(pattern: &str, transform: Transform) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("static regex"),
        transform,
    }
}

// Earlier rules win when two matches start at the same position.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"\[([^\]]+)\]\(([^)\s]+)\)", md_link),
        rule(r"\*\*([^*]+)\*\*", |c| format!("<strong>{}</strong>", &c[1])),
        rule(r"\*([^*]+)\*", |c| format!("<em>{}</em>", &c[1])),
        rule(r"__([^_]+)__", |c| format!("<u>{}</u>", &c[1])),
        rule(r"(?:https?://|www\.)[^\s<]+", bare_link),
        rule(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}", |c| {
            format!("<a href=\"mailto:{0}\">{0}</a>", &c[0])
        }),
        rule(r"\+?(?:\d[ ]?){10,}\d", phone_link),
        rule(r"\s+", |_| " ".to_string()),
    ]
});

fn md_link(c: &Captures<'_>) -> String {
    format!("<a href=\"{}\" target=\"_blank\">{}</a>", &c[2], &c[1])
}

fn bare_link(c: &Captures<'_>) -> String {
    let url = &c[0];
    let (href, text) = match url.find("://") {
        Some(idx) => (url.to_string(), &url[idx + 3..]),
        None => (format!("https://{url}"), url),
    };
    let text = text.strip_suffix('/').unwrap_or(text);
    format!("<a href=\"{href}\" target=\"_blank\">{text}</a>")
}

fn phone_link(c: &Captures<'_>) -> String {
    let shown = &c[0];
    let number: String = shown.chars().filter(|ch| !ch.is_whitespace()).collect();
    format!("<a href=\"tel:{number}\">{shown}</a>")
}

/// Renders one free-text field to inline HTML.
pub fn render_inline(text: &str) -> String {
    let escaped = escape_html(text);
    let mut rest = escaped.as_str();
    let mut out = String::with_capacity(rest.len());

    while !rest.is_empty() {
        let earliest = RULES
            .iter()
            .filter_map(|r| r.pattern.captures(rest).map(|c| (r, c)))
            .min_by_key(|(_, c)| c.get(0).map(|m| m.start()).unwrap_or(usize::MAX));

        let Some((rule, caps)) = earliest else {
            out.push_str(rest);
            break;
        };
        let Some(whole) = caps.get(0) else {
            break;
        };
        out.push_str(&rest[..whole.start()]);
        out.push_str(&(rule.transform)(&caps));
        rest = &rest[whole.end()..];
    }

    out
}
