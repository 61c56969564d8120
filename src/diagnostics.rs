//! Failure observers.
//!
//! The pipeline reports notable failures to a [`FailureObserver`] with the page
//! that failed and a scenario label. Observers are side channels: whatever they
//! do, and whether it works, never changes the outcome of the request.

use crate::browser::Page;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

/// Scenario labels, also used as screenshot file stems.
pub mod labels {
    /// Login was not confirmed in time.
    pub const LOGIN_TIMEOUT: &str = "login_timeout";
    /// The inbox selector cascade produced nothing.
    pub const EMPTY_INBOX: &str = "debug_screenshot";
    /// A request failed after the browser was up.
    pub const REQUEST_ERROR: &str = "error_screenshot";
}

#[async_trait]
pub trait FailureObserver: Send + Sync {
    async fn on_failure(&self, page: &dyn Page, label: &str);
}

/// Writes `{dir}/{label}.png`, overwriting earlier captures of the same scenario.
#[derive(Debug, Clone)]
pub struct ScreenshotObserver {
    dir: PathBuf,
}

impl ScreenshotObserver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl FailureObserver for ScreenshotObserver {
    async fn on_failure(&self, page: &dyn Page, label: &str) {
        let path = self.dir.join(format!("{label}.png"));
        match page.screenshot(&path).await {
            Ok(()) => info!(path = %path.display(), "Saved diagnostic screenshot"),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not save diagnostic screenshot"),
        }
    }
}

/// Used when screenshots are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

#[async_trait]
impl FailureObserver for NoopObserver {
    async fn on_failure(&self, _page: &dyn Page, label: &str) {
        tracing::debug!(label, "Diagnostics disabled; skipping screenshot");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePage;

    #[tokio::test]
    async fn test_screenshot_path_uses_label() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new();
        ScreenshotObserver::new(dir.path())
            .on_failure(&page, labels::LOGIN_TIMEOUT)
            .await;
        assert_eq!(page.screenshots(), vec![dir.path().join("login_timeout.png")]);
        assert!(dir.path().join("login_timeout.png").exists());
    }

    #[tokio::test]
    async fn test_screenshot_failure_is_swallowed() {
        let page = FakePage::new().failing_screenshots();
        ScreenshotObserver::new("/nonexistent")
            .on_failure(&page, labels::REQUEST_ERROR)
            .await;
        assert!(page.screenshots().is_empty());
    }

    #[tokio::test]
    async fn test_noop_observer_takes_no_screenshot() {
        let page = FakePage::new();
        NoopObserver.on_failure(&page, labels::EMPTY_INBOX).await;
        assert!(page.screenshots().is_empty());
    }
}
