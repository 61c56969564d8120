//! Data models shared across the pipeline.
//!
//! - [`ArticleRef`]: one inbox entry as scraped from the feed
//! - [`ArticleContent`]: extracted article text, consumed by a single summarization
//! - [`SummaryResult`]: the cached, user-facing result for an article
//! - [`InboxScrape`]: the outcome of one feed scrape, empty or not
//! - [`RefreshReport`] / [`ErrorPayload`]: what the batch refresh hands back
//!
//! An article's canonical URL is its identity everywhere.

use crate::error::{CredentialError, PipelineError};
use crate::summarizer::LengthTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Blog name used when the feed entry does not show one.
pub const UNKNOWN_BLOG: &str = "Unknown Blog";

/// An inbox entry. Immutable once captured by a scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRef {
    /// Canonical URL: absolute, without query or fragment.
    pub url: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub blog_name: String,
    pub blog_thumbnail_url: Option<String>,
    pub article_thumbnail_url: Option<String>,
    /// Timestamp as displayed in the feed ("Mar 3", "2h").
    pub published_at: String,
    /// Author / reading-time line as displayed in the feed.
    pub author_meta: String,
}

impl ArticleRef {
    /// Placeholder for a URL that was not seen in a scrape.
    pub fn bare(url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: url.to_string(),
            subtitle: None,
            blog_name: UNKNOWN_BLOG.to_string(),
            blog_thumbnail_url: None,
            article_thumbnail_url: None,
            published_at: String::new(),
            author_meta: String::new(),
        }
    }
}

/// Raw article text keyed by URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleContent {
    pub url: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnails {
    pub article: Option<String>,
    pub blog: Option<String>,
}

/// Summary of one article plus the metadata needed to display it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub url: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub summary_text: String,
    pub thumbnails: Thumbnails,
    pub blog_name: String,
    pub published_at: String,
    pub length_tier: LengthTier,
    pub summarized_at: DateTime<Utc>,
}

impl SummaryResult {
    pub fn new(article: &ArticleRef, summary_text: String, length_tier: LengthTier) -> Self {
        Self {
            url: article.url.clone(),
            title: article.title.clone(),
            subtitle: article.subtitle.clone(),
            summary_text,
            thumbnails: Thumbnails {
                article: article.article_thumbnail_url.clone(),
                blog: article.blog_thumbnail_url.clone(),
            },
            blog_name: article.blog_name.clone(),
            published_at: article.published_at.clone(),
            length_tier,
            summarized_at: Utc::now(),
        }
    }
}

/// Result of one inbox scrape.
///
/// `strategy` names the selector that produced the entries; it is `None` when
/// no selector in the cascade yielded anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxScrape {
    pub strategy: Option<String>,
    pub articles: Vec<ArticleRef>,
}

impl InboxScrape {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

/// Error field surfaced to callers in place of a thrown fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    pub kind: String,
}

impl From<&PipelineError> for ErrorPayload {
    fn from(err: &PipelineError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind().to_string(),
        }
    }
}

impl From<&CredentialError> for ErrorPayload {
    fn from(err: &CredentialError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind().to_string(),
        }
    }
}

/// An article the batch refresh could not summarize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleFailure {
    pub url: String,
    pub title: String,
    #[serde(flatten)]
    pub error: ErrorPayload,
}

/// Output of a batch refresh, articles in feed order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub strategy: Option<String>,
    pub articles: Vec<SummaryResult>,
    pub failures: Vec<ArticleFailure>,
}
