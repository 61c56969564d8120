//! Content fetcher: one article page to plain text.

use crate::browser::{Locator, Page};
use crate::error::ExtractionError;
use crate::models::ArticleContent;
use tracing::{debug, info, instrument, warn};

/// Reads an article's text from its content landmark.
pub struct ContentFetcher<'a> {
    landmark: &'a Locator,
}

impl<'a> ContentFetcher<'a> {
    pub fn new(landmark: &'a Locator) -> Self {
        Self { landmark }
    }

    /// Navigate to `url` and return the rendered text of the content landmark.
    ///
    /// The landmark wait inherits the page's default timeout.
    ///
    /// # Errors
    ///
    /// [`ExtractionError::Navigation`] if the page cannot be loaded or read,
    /// [`ExtractionError::LandmarkMissing`] if the landmark never appears,
    /// [`ExtractionError::EmptyContent`] if it appears without any text.
    #[instrument(level = "info", skip_all, fields(url = %url))]
    pub async fn fetch(&self, page: &dyn Page, url: &str) -> Result<ArticleContent, ExtractionError> {
        let navigation = |source| ExtractionError::Navigation {
            url: url.to_string(),
            source,
        };

        page.goto(url).await.map_err(navigation)?;
        let Some(landmark) = page.wait_for_selector(self.landmark, None).await.map_err(navigation)? else {
            warn!(landmark = %self.landmark, "Content landmark did not appear");
            return Err(ExtractionError::LandmarkMissing {
                url: url.to_string(),
                landmark: self.landmark.to_string(),
            });
        };

        let text = page.inner_text(&landmark).await.map_err(navigation)?;
        if text.trim().is_empty() {
            warn!(landmark = %self.landmark, "Content landmark is empty");
            return Err(ExtractionError::EmptyContent {
                url: url.to_string(),
                landmark: self.landmark.to_string(),
            });
        }
        debug!(chars = text.len(), "Extracted article text");
        info!("Fetched article content");
        Ok(ArticleContent {
            url: url.to_string(),
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePage;
    use std::time::Duration;

    const URL: &str = "https://example.substack.com/p/post";

    #[tokio::test]
    async fn test_returns_landmark_text() {
        let page = FakePage::new().with_document(
            URL,
            "<html><body><nav>Menu</nav><article><h1>Title</h1><p>Body text.</p></article></body></html>",
        );
        let landmark = Locator::css("article");
        let content = ContentFetcher::new(&landmark).fetch(&page, URL).await.unwrap();
        assert_eq!(content.url, URL);
        assert!(content.text.contains("Body text."));
        assert!(!content.text.contains("Menu"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_landmark_waits_default_timeout() {
        let page = FakePage::new()
            .with_document(URL, "<html><body><p>Paywalled</p></body></html>")
            .with_default_timeout(Duration::from_secs(30));
        let landmark = Locator::css("article");

        let started = tokio::time::Instant::now();
        let err = ContentFetcher::new(&landmark).fetch(&page, URL).await.unwrap_err();

        assert!(matches!(err, ExtractionError::LandmarkMissing { .. }));
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_blank_landmark_is_empty_content() {
        let page = FakePage::new().with_document(
            URL,
            "<html><body><article>\n   <div class=\"loading\"></div>\n</article></body></html>",
        );
        let landmark = Locator::css("article");
        let err = ContentFetcher::new(&landmark).fetch(&page, URL).await.unwrap_err();
        match err {
            ExtractionError::EmptyContent { url, landmark } => {
                assert_eq!(url, URL);
                assert_eq!(landmark, "article");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_navigation_error_is_extraction_failure() {
        let page = FakePage::new().unreachable(URL);
        let landmark = Locator::css("article");
        let err = ContentFetcher::new(&landmark).fetch(&page, URL).await.unwrap_err();
        match err {
            ExtractionError::Navigation { url, .. } => assert_eq!(url, URL),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
