//! Process-lifetime stores keyed by article URL.
//!
//! [`SummaryCache`] holds the latest summary per article. [`ArticleCatalog`]
//! remembers the [`ArticleRef`]s from the most recent inbox scrape so a later
//! summarize call for one of those URLs can carry its feed metadata.
//!
//! Neither store expires, bounds its size, or persists. Concurrent writers to
//! the same key race benignly: the last write wins.

use crate::models::{ArticleRef, SummaryResult};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Summaries by canonical article URL, for the life of the process.
#[derive(Debug, Default)]
pub struct SummaryCache {
    entries: RwLock<HashMap<String, SummaryResult>>,
}

impl SummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached summary for `url`.
    ///
    /// # Arguments
    ///
    /// * `url` - canonical article URL
    ///
    /// # Returns
    ///
    /// The most recent [`SummaryResult`] stored for `url`, whatever its tier.
    pub fn get(&self, url: &str) -> Option<SummaryResult> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    /// Insert or overwrite the entry for `url`.
    pub fn put(&self, url: &str, result: SummaryResult) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), result);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Feed entries seen by scrapes in this process, by URL.
#[derive(Debug, Default)]
pub struct ArticleCatalog {
    articles: RwLock<HashMap<String, ArticleRef>>,
}

impl ArticleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `articles`, replacing earlier entries with the same URL.
    pub fn record(&self, articles: &[ArticleRef]) {
        let mut map = self.articles.write().unwrap_or_else(PoisonError::into_inner);
        for article in articles {
            map.insert(article.url.clone(), article.clone());
        }
    }

    pub fn get(&self, url: &str) -> Option<ArticleRef> {
        self.articles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    pub fn clear(&self) {
        self.articles.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarizer::LengthTier;

    fn result(url: &str, summary: &str) -> SummaryResult {
        SummaryResult::new(&ArticleRef::bare(url), summary.to_string(), LengthTier::Moderate)
    }

    #[test]
    fn test_get_missing_is_none() {
        let cache = SummaryCache::new();
        assert!(cache.get("https://example.com/p/a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_overwrites() {
        let cache = SummaryCache::new();
        cache.put("https://example.com/p/a", result("https://example.com/p/a", "first"));
        cache.put("https://example.com/p/a", result("https://example.com/p/a", "second"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("https://example.com/p/a").unwrap().summary_text, "second");
    }

    #[test]
    fn test_clear_empties_cache() {
        let cache = SummaryCache::new();
        cache.put("https://example.com/p/a", result("https://example.com/p/a", "s"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_catalog_records_by_url() {
        let catalog = ArticleCatalog::new();
        let mut article = ArticleRef::bare("https://example.com/p/a");
        article.title = "A".into();
        catalog.record(std::slice::from_ref(&article));
        assert_eq!(catalog.get("https://example.com/p/a"), Some(article));
        catalog.clear();
        assert!(catalog.get("https://example.com/p/a").is_none());
    }
}
