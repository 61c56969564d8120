//! Inbox scraper.
//!
//! Opens the feed, waits for client-side rendering to settle, and takes one
//! `outerHTML` snapshot of the page. Everything after that is a pure function
//! of the snapshot: the selector cascade, container resolution and metadata
//! extraction all run on a parsed [`Html`] tree, so a page with a hundred
//! links costs the same single round trip as a page with three.
//!
//! # Selector cascade
//!
//! The configured selectors are tried in order. The first one that yields at
//! least one usable entry wins and no later selector is consulted; entries
//! are never merged across selectors. A selector whose links all lack a
//! metadata container or a title does not count as a hit.
//!
//! # Entries
//!
//! For each matched link, the nearest ancestor (or the link itself) matching
//! the metadata container selector holds the fields. A container yields at
//! most one entry: its blog-name link is never used as the article URL, and
//! the link holding the title is preferred over other links. Links without a
//! container, or whose container has no title, are skipped and do not count
//! toward the limit. URLs are resolved against the inbox URL and stripped of
//! query and fragment; the first occurrence of a URL wins.

use crate::browser::{Locator, Page};
use crate::config::{InboxConfig, MetadataSelectors};
use crate::diagnostics::{FailureObserver, labels};
use crate::error::{BrowserError, ConfigError, PipelineError};
use crate::models::{ArticleRef, InboxScrape, UNKNOWN_BLOG};
use crate::utils::collapse_whitespace;
use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Returns the rendered document, scripts and client-side updates included.
pub const SNAPSHOT_SCRIPT: &str = "return document.documentElement.outerHTML;";

/// Compiled [`MetadataSelectors`].
#[derive(Debug)]
pub struct FeedLayout {
    container: Selector,
    blog_name: Selector,
    blog_thumbnail: Selector,
    title: Selector,
    subtitle: Selector,
    article_thumbnail: Selector,
    published_at: Selector,
    author_meta: Selector,
}

impl FeedLayout {
    /// Parse every metadata selector.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first field whose CSS does
    /// not parse.
    pub fn compile(selectors: &MetadataSelectors) -> Result<Self, ConfigError> {
        let parse = |name: &str, css: &str| {
            Selector::parse(css)
                .map_err(|e| ConfigError::Invalid(format!("inbox.metadata.{name} `{css}`: {e}")))
        };
        Ok(Self {
            container: parse("container", &selectors.container)?,
            blog_name: parse("blog_name", &selectors.blog_name)?,
            blog_thumbnail: parse("blog_thumbnail", &selectors.blog_thumbnail)?,
            title: parse("title", &selectors.title)?,
            subtitle: parse("subtitle", &selectors.subtitle)?,
            article_thumbnail: parse("article_thumbnail", &selectors.article_thumbnail)?,
            published_at: parse("published_at", &selectors.published_at)?,
            author_meta: parse("author_meta", &selectors.author_meta)?,
        })
    }
}

fn text_of(container: ElementRef<'_>, selector: &Selector) -> Option<String> {
    container
        .select(selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty())
}

fn image_of(container: ElementRef<'_>, selector: &Selector, base: Option<&Url>) -> Option<String> {
    let src = container.select(selector).next()?.value().attr("src")?;
    resolve(base, src).map(|url| url.to_string())
}

fn resolve(base: Option<&Url>, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match base {
        Some(base) => base.join(href).ok(),
        None => Url::parse(href).ok(),
    }
}

/// Absolute http(s) URL without query or fragment.
pub fn canonical_url(base: Option<&Url>, href: &str) -> Option<String> {
    let mut url = resolve(base, href)?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

/// Nearest element matching the container selector, starting at the link.
fn container_of<'a>(link: ElementRef<'a>, layout: &FeedLayout) -> Option<ElementRef<'a>> {
    std::iter::once(link)
        .chain(link.ancestors().filter_map(ElementRef::wrap))
        .find(|el| layout.container.matches(el))
}

/// The link is the blog-name link, or sits inside it, below `container`.
fn is_blog_link(link: ElementRef<'_>, container: ElementRef<'_>, layout: &FeedLayout) -> bool {
    std::iter::once(link)
        .chain(link.ancestors().filter_map(ElementRef::wrap))
        .take_while(|el| el.id() != container.id())
        .any(|el| layout.blog_name.matches(&el))
}

fn holds_title(link: ElementRef<'_>, layout: &FeedLayout) -> bool {
    layout.title.matches(&link) || link.select(&layout.title).next().is_some()
}

/// Build an [`ArticleRef`] for `container`, taking the URL from `link`.
///
/// # Arguments
///
/// * `link` - the anchor whose `href` becomes the article URL
/// * `container` - the metadata container enclosing `link`
/// * `layout` - compiled field selectors
/// * `base` - URL relative hrefs and image sources are resolved against
///
/// # Returns
///
/// `None` if the link has no usable http(s) href or the container has no title.
pub fn extract_entry(
    link: ElementRef<'_>,
    container: ElementRef<'_>,
    layout: &FeedLayout,
    base: Option<&Url>,
) -> Option<ArticleRef> {
    let url = canonical_url(base, link.value().attr("href")?)?;
    let title = text_of(container, &layout.title)?;

    Some(ArticleRef {
        url,
        title,
        subtitle: text_of(container, &layout.subtitle),
        blog_name: text_of(container, &layout.blog_name).unwrap_or_else(|| UNKNOWN_BLOG.to_string()),
        blog_thumbnail_url: image_of(container, &layout.blog_thumbnail, base),
        article_thumbnail_url: image_of(container, &layout.article_thumbnail, base),
        published_at: text_of(container, &layout.published_at).unwrap_or_default(),
        author_meta: text_of(container, &layout.author_meta).unwrap_or_default(),
    })
}

/// One entry per container, in DOM order.
///
/// Blog-name links are never the article link. Among the remaining links of a
/// container, the first one holding the title wins, else the first one.
fn entries_from_links(links: Vec<ElementRef<'_>>, layout: &FeedLayout, base: Option<&Url>) -> Vec<ArticleRef> {
    let candidates: Vec<(ElementRef<'_>, ElementRef<'_>)> = links
        .into_iter()
        .filter_map(|link| Some((container_of(link, layout)?, link)))
        .filter(|(container, link)| !is_blog_link(*link, *container, layout))
        .collect();

    candidates
        .iter()
        .map(|(container, _)| *container)
        .unique_by(|container| container.id())
        .filter_map(|container| {
            let mut links = candidates
                .iter()
                .filter(|(c, _)| c.id() == container.id())
                .map(|(_, link)| *link);
            let first = links.next()?;
            let link = std::iter::once(first)
                .chain(links)
                .find(|link| holds_title(*link, layout))
                .unwrap_or(first);
            extract_entry(link, container, layout, base)
        })
        .unique_by(|article| article.url.clone())
        .collect()
}

/// Run the selector cascade over a snapshot.
///
/// # Arguments
///
/// * `document` - the parsed feed snapshot
/// * `strategies` - selectors tried in order, most specific first
/// * `layout` - compiled metadata selectors
/// * `base` - the inbox URL, for resolving relative links
/// * `limit` - maximum number of entries returned
///
/// # Returns
///
/// The entries of the first selector that yields any, tagged with that
/// selector, or an empty [`InboxScrape`] when none does.
pub fn run_cascade(
    document: &Html,
    strategies: &[Locator],
    layout: &FeedLayout,
    base: Option<&Url>,
    limit: usize,
) -> InboxScrape {
    for strategy in strategies {
        let links = match strategy.select_in(document) {
            Ok(links) => links,
            Err(e) => {
                warn!(selector = %strategy, error = %e, "Skipping unparsable selector");
                continue;
            }
        };
        debug!(selector = %strategy, links = links.len(), "Tried selector");
        if links.is_empty() {
            continue;
        }

        let articles: Vec<ArticleRef> = entries_from_links(links, layout, base)
            .into_iter()
            .take(limit)
            .collect();
        if articles.is_empty() {
            debug!(selector = %strategy, "Links matched but none had usable metadata");
            continue;
        }

        info!(selector = %strategy, count = articles.len(), "Selector produced entries");
        return InboxScrape {
            strategy: Some(strategy.to_string()),
            articles,
        };
    }
    InboxScrape::empty()
}

/// Scrapes the feed view of an authenticated page.
pub struct InboxScraper<'a> {
    config: &'a InboxConfig,
    inbox_url: &'a str,
    observer: &'a dyn FailureObserver,
}

impl<'a> InboxScraper<'a> {
    /// # Arguments
    ///
    /// * `config` - settle delay, idle time, selector cascade and metadata selectors
    /// * `inbox_url` - the feed view; also the base for relative links
    /// * `observer` - receives the `debug_screenshot` capture on an empty result
    pub fn new(config: &'a InboxConfig, inbox_url: &'a str, observer: &'a dyn FailureObserver) -> Self {
        Self {
            config,
            inbox_url,
            observer,
        }
    }

    /// Scrape up to `limit` entries from the feed. The page must be logged in.
    ///
    /// An empty result is returned as an empty [`InboxScrape`], after a debug
    /// capture and a short idle so the browser window can be inspected.
    #[instrument(level = "info", skip_all, fields(limit = limit))]
    pub async fn fetch(&self, page: &dyn Page, limit: usize) -> Result<InboxScrape, PipelineError> {
        let layout = FeedLayout::compile(&self.config.metadata)?;
        let base = Url::parse(self.inbox_url).ok();

        info!(url = %self.inbox_url, "Navigating to inbox");
        page.goto(self.inbox_url).await?;
        sleep(self.config.settle_delay()).await;

        let snapshot = page.evaluate(SNAPSHOT_SCRIPT, Vec::new()).await?;
        let snapshot = snapshot
            .as_str()
            .ok_or_else(|| BrowserError::Protocol(format!("snapshot script returned {snapshot}")))?;

        let scrape = {
            let document = Html::parse_document(snapshot);
            run_cascade(&document, &self.config.selectors, &layout, base.as_ref(), limit)
        };

        if scrape.is_empty() {
            warn!("No selector produced inbox entries");
            self.observer.on_failure(page, labels::EMPTY_INBOX).await;
            sleep(self.config.empty_result_idle()).await;
        }
        Ok(scrape)
    }
}
