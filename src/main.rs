//! # Inbox Digest
//!
//! Logs into a newsletter platform with a real browser, scrapes the personal
//! inbox feed, extracts each article's text and summarizes it with an
//! OpenAI-compatible model. Summaries are cached per article for the life of
//! the process.
//!
//! ## Usage
//!
//! ```sh
//! chromedriver --port=9515 &
//! OPENAI_API_KEY=sk-... inbox_digest refresh --limit 3 --length 2
//! ```
//!
//! ## Architecture
//!
//! 1. **Credentials**: the API key is validated before any browser starts
//! 2. **Login**: the authenticated marker is probed; scripted login falls back
//!    to a manual-login window
//! 3. **Inbox**: one DOM snapshot, run through the configured selector cascade
//! 4. **Articles**: each entry's page is opened and its content landmark read
//! 5. **Summaries**: length-tiered, input-bounded, cached by URL
//! 6. **Output**: JSON on stdout or in `--json-output`

use clap::Parser;
use serde::Serialize;
use std::error::Error;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod auth;
mod browser;
mod cache;
mod cli;
mod config;
mod diagnostics;
mod error;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod session;
mod summarizer;
#[cfg(test)]
mod testing;
mod utils;

use api::OpenAiFactory;
use browser::webdriver::WebDriverLauncher;
use cli::{Cli, Command};
use config::AppConfig;
use diagnostics::{FailureObserver, NoopObserver, ScreenshotObserver};
use models::{ErrorPayload, InboxScrape, RefreshReport, SummaryResult};
use outputs::json;
use pipeline::AppContext;
use utils::ensure_writable_dir;

#[derive(Serialize)]
#[serde(untagged)]
enum Output {
    Refresh(RefreshReport),
    Inbox(InboxScrape),
    Summary(SummaryResult),
    Error(ErrorPayload),
}

async fn emit(output: &Output, path: Option<&Path>) -> Result<(), Box<dyn Error>> {
    match path {
        Some(path) => json::write_json(output, path).await,
        None => {
            println!("{}", json::to_pretty(output)?);
            Ok(())
        }
    }
}

#[tokio::main]
#[instrument]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    // --- Tracing init (stderr; stdout carries the JSON result) ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("inbox_digest starting up");

    let args = Cli::parse();
    let command = args.command();
    debug!(?command, config = ?args.config, json_output = ?args.json_output, "Parsed CLI arguments");

    let config = AppConfig::load(args.config.as_deref())?;

    let observer: Arc<dyn FailureObserver> = if config.diagnostics.screenshots {
        let dir = &config.diagnostics.screenshot_dir;
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Screenshot directory is not writable (fix perms or choose a different path)"
            );
            return Err(e.into());
        }
        Arc::new(ScreenshotObserver::new(dir.clone()))
    } else {
        Arc::new(NoopObserver)
    };

    let launcher = Arc::new(WebDriverLauncher::new(config.browser.webdriver_url.clone()));
    let provider = Arc::new(OpenAiFactory::new(
        config.summarizer.base_url.clone(),
        config.summarizer.request_timeout(),
    )?);
    let default_limit = config.inbox.default_limit;
    let ctx = AppContext::new(config, launcher, provider, observer);

    // ---- Credentials: rejected before any browser is launched ----
    if let Err(e) = pipeline::authenticate(
        &ctx,
        args.email.as_deref(),
        args.password.as_deref(),
        args.api_key.as_deref().unwrap_or_default(),
    )
    .await
    {
        error!(error = %e, "Credentials rejected");
        let payload = Output::Error(ErrorPayload::from(&e));
        emit(&payload, args.json_output.as_deref()).await?;
        return Ok(ExitCode::from(2));
    }

    let tier = command.tier();
    let result = match command {
        Command::Refresh { limit, .. } => pipeline::refresh(&ctx, limit.unwrap_or(default_limit), tier)
            .await
            .map(Output::Refresh),
        Command::Inbox { limit } => pipeline::fetch_inbox_articles(&ctx, limit.unwrap_or(default_limit))
            .await
            .map(Output::Inbox),
        Command::Summarize { url, .. } => pipeline::summarize_article(&ctx, &url, tier)
            .await
            .map(Output::Summary),
    };

    let (output, code) = match result {
        Ok(output) => (output, ExitCode::SUCCESS),
        Err(e) => {
            error!(error = %e, kind = e.kind(), "Run failed");
            (Output::Error(ErrorPayload::from(&e)), ExitCode::FAILURE)
        }
    };
    emit(&output, args.json_output.as_deref()).await?;
    pipeline::clear_session(&ctx);

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(code)
}
