use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::checks::DEFAULT_MAX_PDF_BYTES;

/// Application configuration loaded from environment variables.
/// Every variable has a default; CLI flags override the directories.
#[derive(Debug, Clone)]
pub struct Config {
    pub input_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub output_dir: PathBuf,
    pub browser: PathBuf,
    pub pdf_timeout: Duration,
    pub poll_interval: Duration,
    pub dictionary: Option<PathBuf>,
    pub known_words: PathBuf,
    pub max_pdf_bytes: u64,
    pub anthropic_api_key: Option<String>,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Config {
            input_dir: var("VITAE_INPUT_DIR", "input").into(),
            templates_dir: var("VITAE_TEMPLATES_DIR", "templates").into(),
            output_dir: var("VITAE_OUTPUT_DIR", "output").into(),
            browser: var("VITAE_BROWSER", "chromium").into(),
            pdf_timeout: Duration::from_secs(parse_env(
                "VITAE_PDF_TIMEOUT_SECS",
                &var("VITAE_PDF_TIMEOUT_SECS", "60"),
            )?),
            poll_interval: Duration::from_millis(parse_env(
                "VITAE_POLL_INTERVAL_MS",
                &var("VITAE_POLL_INTERVAL_MS", "500"),
            )?),
            dictionary: optional("VITAE_DICTIONARY").map(PathBuf::from),
            known_words: var("VITAE_KNOWN_WORDS", "known_words.txt").into(),
            max_pdf_bytes: match optional("VITAE_MAX_PDF_KIB") {
                Some(kib) => parse_env::<u64>("VITAE_MAX_PDF_KIB", &kib)? * 1024,
                None => DEFAULT_MAX_PDF_BYTES,
            },
            anthropic_api_key: optional("ANTHROPIC_API_KEY"),
            rust_log: var("RUST_LOG", "info"),
        })
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("{key} must be a non-negative integer, got '{value}'"))
}
