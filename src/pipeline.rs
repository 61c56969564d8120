//! Request-level operations.
//!
//! Everything the outer layer calls lives here, each taking an explicit
//! [`AppContext`] instead of process-wide state:
//!
//! - [`authenticate`]: validate and store credentials
//! - [`fetch_inbox_articles`]: log in and scrape the feed
//! - [`summarize_article`]: cached summary for one article
//! - [`refresh`]: scrape and summarize the feed in one browser session
//! - [`clear_session`]: forget credentials, summaries and scraped metadata
//!
//! # Browser lifetime
//!
//! Every operation that needs a browser launches a fresh one and closes it
//! before returning, on success and on every error path. Steps inside one
//! request run strictly in order. Two concurrent requests get independent
//! browsers and race benignly on the cache.

use crate::api::ProviderFactory;
use crate::auth::Authenticator;
use crate::browser::{Browser, BrowserLauncher, Page};
use crate::cache::{ArticleCatalog, SummaryCache};
use crate::config::AppConfig;
use crate::diagnostics::{FailureObserver, labels};
use crate::error::{CredentialError, PipelineError};
use crate::models::{
    ArticleContent, ArticleFailure, ArticleRef, ErrorPayload, InboxScrape, RefreshReport, SummaryResult,
};
use crate::scrapers::article::ContentFetcher;
use crate::scrapers::inbox::{InboxScraper, canonical_url};
use crate::session::{CredentialStore, LoginCredentials, MemorySessionStore};
use crate::summarizer::{LengthTier, Summarizer};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Everything a request needs, injected rather than global.
pub struct AppContext {
    pub config: AppConfig,
    pub credentials: CredentialStore,
    pub cache: SummaryCache,
    pub catalog: ArticleCatalog,
    pub launcher: Arc<dyn BrowserLauncher>,
    pub provider: Arc<dyn ProviderFactory>,
    pub observer: Arc<dyn FailureObserver>,
}

impl AppContext {
    /// Context with an empty session, cache and catalog.
    ///
    /// # Arguments
    ///
    /// * `config` - loaded application config
    /// * `launcher` - starts one browser per request
    /// * `provider` - builds API clients from the session's key
    /// * `observer` - receives failure captures
    pub fn new(
        config: AppConfig,
        launcher: Arc<dyn BrowserLauncher>,
        provider: Arc<dyn ProviderFactory>,
        observer: Arc<dyn FailureObserver>,
    ) -> Self {
        Self {
            config,
            credentials: CredentialStore::new(Arc::new(MemorySessionStore::new()), provider.clone()),
            cache: SummaryCache::new(),
            catalog: ArticleCatalog::new(),
            launcher,
            provider,
            observer,
        }
    }
}

/// Credentials a browser request runs with.
struct ActiveSession {
    api_key: String,
    login: Option<LoginCredentials>,
}

fn active_session(ctx: &AppContext) -> Result<ActiveSession, PipelineError> {
    let session = ctx.credentials.current();
    if !session.authenticated {
        return Err(PipelineError::SessionExpired("no authenticated session"));
    }
    let login = session.login_credentials();
    let api_key = session
        .api_key
        .ok_or(PipelineError::SessionExpired("no API key in session"))?;
    Ok(ActiveSession { api_key, login })
}

async fn open_page(ctx: &AppContext) -> Result<(Box<dyn Browser>, Box<dyn Page>), PipelineError> {
    let browser = ctx.launcher.launch(&ctx.config.browser.launch_options()).await?;
    match browser.new_page().await {
        Ok(page) => Ok((browser, page)),
        Err(e) => {
            release(browser.as_ref()).await;
            Err(e.into())
        }
    }
}

async fn release(browser: &dyn Browser) {
    if let Err(e) = browser.close().await {
        warn!(error = %e, "Failed to close browser");
    }
}

/// Login failures already carry their own capture.
async fn report_failure(ctx: &AppContext, page: &dyn Page, err: &PipelineError) {
    error!(error = %err, kind = err.kind(), "Request failed");
    if !matches!(err, PipelineError::Authentication(_)) {
        ctx.observer.on_failure(page, labels::REQUEST_ERROR).await;
    }
}

fn cached(ctx: &AppContext, url: &str, tier: LengthTier) -> Option<SummaryResult> {
    ctx.cache.get(url).filter(|hit| hit.length_tier == tier)
}

async fn summarize_text(
    ctx: &AppContext,
    api_key: &str,
    article: &ArticleRef,
    text: &str,
    tier: LengthTier,
) -> Result<SummaryResult, PipelineError> {
    let client = ctx.provider.connect(api_key);
    let summary = Summarizer::new(client.as_ref(), &ctx.config.summarizer)
        .summarize(text, tier)
        .await?;
    let result = SummaryResult::new(article, summary, tier);
    ctx.cache.put(&article.url, result.clone());
    Ok(result)
}

/// Validate `api_key` with the provider and store the session.
///
/// Email and password are optional but must come together. Empty strings
/// count as absent.
///
/// # Errors
///
/// Returns a [`CredentialError`] when the key is blank or rejected, or when
/// only one of email and password is given. No browser is launched either way.
pub async fn authenticate(
    ctx: &AppContext,
    email: Option<&str>,
    password: Option<&str>,
    api_key: &str,
) -> Result<(), CredentialError> {
    ctx.credentials.save(email, password, api_key).await
}

/// Log in and return up to `limit` feed entries.
///
/// The entries are remembered so later summaries carry their metadata.
///
/// # Arguments
///
/// * `ctx` - request context holding the session
/// * `limit` - maximum number of entries; `0` returns at once without a browser
///
/// # Returns
///
/// The scrape, which is empty (with no strategy) when no selector matched.
/// Authentication, browser and config failures are returned as [`PipelineError`].
#[instrument(level = "info", skip_all, fields(limit = limit))]
pub async fn fetch_inbox_articles(ctx: &AppContext, limit: usize) -> Result<InboxScrape, PipelineError> {
    let session = active_session(ctx)?;
    if limit == 0 {
        return Ok(InboxScrape::empty());
    }

    let (browser, page) = open_page(ctx).await?;
    let result: Result<InboxScrape, PipelineError> = async {
        Authenticator::new(&ctx.config.site, ctx.observer.as_ref())
            .ensure_authenticated(page.as_ref(), session.login.as_ref())
            .await?;
        InboxScraper::new(&ctx.config.inbox, &ctx.config.site.inbox_url, ctx.observer.as_ref())
            .fetch(page.as_ref(), limit)
            .await
    }
    .await;
    if let Err(e) = &result {
        report_failure(ctx, page.as_ref(), e).await;
    }
    release(browser.as_ref()).await;

    let scrape = result?;
    ctx.catalog.record(&scrape.articles);
    Ok(scrape)
}

/// Summary of the article at `url` at `tier`.
///
/// A cached summary at the same tier is returned without launching a browser
/// or calling the provider. A cached summary at another tier is replaced.
///
/// # Arguments
///
/// * `ctx` - request context holding the session and cache
/// * `url` - article URL; query and fragment are ignored
/// * `tier` - requested summary length
///
/// # Returns
///
/// The [`SummaryResult`], carrying feed metadata when the URL came from an
/// earlier scrape. Extraction and summarization failures are not cached.
#[instrument(level = "info", skip_all, fields(url = %url, tier = u8::from(tier)))]
pub async fn summarize_article(
    ctx: &AppContext,
    url: &str,
    tier: LengthTier,
) -> Result<SummaryResult, PipelineError> {
    let session = active_session(ctx)?;
    let url = canonical_url(None, url).unwrap_or_else(|| url.to_string());
    if let Some(hit) = cached(ctx, &url, tier) {
        info!("Serving cached summary");
        return Ok(hit);
    }
    let article = ctx.catalog.get(&url).unwrap_or_else(|| ArticleRef::bare(&url));

    let (browser, page) = open_page(ctx).await?;
    let result: Result<ArticleContent, PipelineError> = async {
        Authenticator::new(&ctx.config.site, ctx.observer.as_ref())
            .ensure_authenticated(page.as_ref(), session.login.as_ref())
            .await?;
        Ok(ContentFetcher::new(&ctx.config.article.content_landmark)
            .fetch(page.as_ref(), &url)
            .await?)
    }
    .await;
    if let Err(e) = &result {
        report_failure(ctx, page.as_ref(), e).await;
    }
    release(browser.as_ref()).await;

    let content = result?;
    summarize_text(ctx, &session.api_key, &article, &content.text, tier).await
}

/// Scrape the feed and summarize each entry in one browser session.
///
/// Articles are processed in feed order. A failure on one article is recorded
/// in [`RefreshReport::failures`] and the rest still run.
///
/// # Arguments
///
/// * `ctx` - request context
/// * `limit` - maximum number of feed entries to process
/// * `tier` - summary length for every article
///
/// # Returns
///
/// The report, or an error when login, the inbox scrape or the browser
/// itself fails.
#[instrument(level = "info", skip_all, fields(limit = limit, tier = u8::from(tier)))]
pub async fn refresh(
    ctx: &AppContext,
    limit: usize,
    tier: LengthTier,
) -> Result<RefreshReport, PipelineError> {
    let session = active_session(ctx)?;
    if limit == 0 {
        return Ok(RefreshReport::default());
    }
    let t0 = Instant::now();

    let (browser, page) = open_page(ctx).await?;
    let result = refresh_in(ctx, page.as_ref(), &session, limit, tier).await;
    if let Err(e) = &result {
        report_failure(ctx, page.as_ref(), e).await;
    }
    release(browser.as_ref()).await;

    let report = result?;
    info!(
        summarized = report.articles.len(),
        failed = report.failures.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Refresh finished"
    );
    Ok(report)
}

async fn refresh_in(
    ctx: &AppContext,
    page: &dyn Page,
    session: &ActiveSession,
    limit: usize,
    tier: LengthTier,
) -> Result<RefreshReport, PipelineError> {
    Authenticator::new(&ctx.config.site, ctx.observer.as_ref())
        .ensure_authenticated(page, session.login.as_ref())
        .await?;
    let scrape = InboxScraper::new(&ctx.config.inbox, &ctx.config.site.inbox_url, ctx.observer.as_ref())
        .fetch(page, limit)
        .await?;
    ctx.catalog.record(&scrape.articles);

    let fetcher = ContentFetcher::new(&ctx.config.article.content_landmark);
    let mut report = RefreshReport {
        strategy: scrape.strategy,
        ..RefreshReport::default()
    };
    for article in scrape.articles {
        if let Some(hit) = cached(ctx, &article.url, tier) {
            info!(url = %article.url, "Using cached summary");
            report.articles.push(hit);
            continue;
        }

        let outcome = match fetcher.fetch(page, &article.url).await {
            Ok(content) => summarize_text(ctx, &session.api_key, &article, &content.text, tier).await,
            Err(e) => Err(e.into()),
        };
        match outcome {
            Ok(result) => report.articles.push(result),
            Err(e) => {
                warn!(url = %article.url, error = %e, "Skipping article");
                report.failures.push(ArticleFailure {
                    url: article.url.clone(),
                    title: article.title.clone(),
                    error: ErrorPayload::from(&e),
                });
            }
        }
    }
    Ok(report)
}

/// Forget credentials, cached summaries and scraped metadata.
pub fn clear_session(ctx: &AppContext) {
    ctx.credentials.clear();
    if !ctx.cache.is_empty() {
        info!(summaries = ctx.cache.len(), "Dropping cached summaries");
    }
    ctx.cache.clear();
    ctx.catalog.clear();
}
