mod build;
mod checks;
mod clock;
mod config;
mod errors;
mod llm_client;
mod models;
mod render;
mod resolver;
mod store;
mod watch;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::build::{BuildOptions, Orchestrator};
use crate::checks::{CheckSuite, ContentCritique, DictionarySource, HtmlCheck, PdfCheck, QualityCheck};
use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::render::{BrowserPdfConverter, PlaceholderRenderer};
use crate::resolver::DependencyResolver;
use crate::store::{ProfileId, ProfileStore};
use crate::watch::WatchController;

#[derive(Parser, Debug)]
#[command(name = "vitae")]
#[command(about = "Incrementally builds CV profiles into HTML and PDF.", long_about = None)]
struct Cli {
    /// Profile id to build; repeatable. "all" (the default) builds every profile.
    #[arg(long = "profile", value_name = "ID")]
    profiles: Vec<String>,

    /// Keep running and rebuild affected profiles on every change.
    #[arg(long, visible_alias = "watch")]
    continuous: bool,

    /// Rebuild regardless of staleness.
    #[arg(long)]
    force: bool,

    #[arg(long)]
    no_pdf: bool,

    #[arg(long)]
    no_checks: bool,

    #[arg(long, value_name = "DIR")]
    input: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    templates: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
}

impl Cli {
    /// `None` means every discoverable profile.
    fn targets(&self) -> Option<Vec<ProfileId>> {
        if self.profiles.is_empty() || self.profiles.iter().any(|p| p == "all") {
            return None;
        }
        Some(self.profiles.iter().map(|p| ProfileId::new(p.as_str())).collect())
    }

    fn options(&self) -> BuildOptions {
        BuildOptions {
            force: self.force,
            skip_pdf: self.no_pdf,
            skip_checks: self.no_checks,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(dir) = &cli.input {
        config.input_dir = dir.clone();
    }
    if let Some(dir) = &cli.templates {
        config.templates_dir = dir.clone();
    }
    if let Some(dir) = &cli.output {
        config.output_dir = dir.clone();
    }

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting vitae v{}", env!("CARGO_PKG_VERSION"));

    let orchestrator = build_orchestrator(&config)?;
    let targets = cli.targets();
    let options = cli.options();

    if cli.continuous {
        let controller = WatchController::new(orchestrator, options, config.poll_interval)
            .with_targets(targets);
        let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                let _ = stop_tx.send(true);
            }
        });
        controller.run(stop_rx).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let kinds: &[resolver::ArtifactKind] = if options.skip_pdf {
        &[resolver::ArtifactKind::Html]
    } else {
        &resolver::ArtifactKind::ALL
    };
    if !options.force && !orchestrator.needs_update_for(targets.as_deref(), kinds)? {
        println!("No changes detected");
        return Ok(ExitCode::SUCCESS);
    }

    let summary = orchestrator.build_all(targets.as_deref(), options).await?;
    println!("{}", summary.render());

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let store = Arc::new(ProfileStore::json(&config.input_dir));
    let resolver = Arc::new(DependencyResolver::new(
        store,
        &config.templates_dir,
        &config.output_dir,
    ));
    let renderer = Arc::new(PlaceholderRenderer::new(&config.input_dir));
    let converter =
        Arc::new(BrowserPdfConverter::new(&config.browser).with_timeout(config.pdf_timeout));

    Ok(Orchestrator::new(resolver, renderer, converter, build_checks(config)?))
}

/// Content critique (only with an API key), then HTML, then PDF checks.
fn build_checks(config: &Config) -> Result<CheckSuite> {
    let mut checks: Vec<Arc<dyn QualityCheck>> = Vec::new();

    match &config.anthropic_api_key {
        Some(key) => {
            let llm = LlmClient::new(key.clone())?;
            info!("Content critique enabled (model: {})", llm_client::MODEL);
            checks.push(Arc::new(ContentCritique::new(llm)));
        }
        None => warn!("ANTHROPIC_API_KEY not set; content critique disabled"),
    }

    checks.push(Arc::new(HtmlCheck));

    let dictionary = config.dictionary.as_ref().map(|words| DictionarySource {
        words: words.clone(),
        known_words: Some(config.known_words.clone()),
    });
    checks.push(Arc::new(PdfCheck::new(config.max_pdf_bytes, dictionary)));

    Ok(CheckSuite::new(checks))
}
