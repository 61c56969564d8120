//! Browser-automation capability consumed by the pipeline.
//!
//! The pipeline never talks to a concrete browser. It drives three traits:
//!
//! - [`BrowserLauncher`]: starts a fresh browser process for one request
//! - [`Browser`]: owns that process and hands out a [`Page`]
//! - [`Page`]: navigation, element lookup, script evaluation and screenshots
//!
//! [`webdriver`] implements them against a W3C WebDriver endpoint
//! (chromedriver, geckodriver). Tests use the scripted page in `crate::testing`.
//!
//! Elements are addressed with a [`Locator`]: a CSS selector plus an optional
//! case-insensitive text filter, written in config as
//! `button:has-text("Dashboard")`.

pub mod webdriver;

use crate::error::BrowserError;
use crate::utils::collapse_whitespace;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Interval between probes while waiting for an element.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

static HAS_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)^(.*?)\s*:has-text\(\s*(?:"([^"]*)"|'([^']*)')\s*\)\s*$"#)
        .expect("has-text pattern is valid")
});

/// A CSS selector with an optional text filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Locator {
    css: String,
    has_text: Option<String>,
}

impl Locator {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            has_text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.has_text = Some(text.into());
        self
    }

    /// Parse the config form, e.g. `button:has-text("Continue")`.
    ///
    /// Anything without a `:has-text(...)` suffix is taken as plain CSS.
    pub fn parse(raw: &str) -> Self {
        match HAS_TEXT.captures(raw) {
            Some(caps) => {
                let css = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                let text = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                let css = if css.is_empty() { "*" } else { css };
                Locator::css(css).with_text(text)
            }
            None => Locator::css(raw.trim()),
        }
    }

    pub fn css_selector(&self) -> &str {
        &self.css
    }

    pub fn text_filter(&self) -> Option<&str> {
        self.has_text.as_deref()
    }

    /// Case-insensitive substring match on whitespace-collapsed text.
    pub fn text_matches(&self, text: &str) -> bool {
        match &self.has_text {
            None => true,
            Some(needle) => collapse_whitespace(text)
                .to_lowercase()
                .contains(&collapse_whitespace(needle).to_lowercase()),
        }
    }

    /// Evaluate the locator against a parsed DOM snapshot, in document order.
    pub fn select_in<'a>(&self, document: &'a Html) -> Result<Vec<ElementRef<'a>>, String> {
        let selector = Selector::parse(&self.css).map_err(|e| format!("`{}`: {}", self.css, e))?;
        Ok(document
            .select(&selector)
            .filter(|el| self.text_matches(&el.text().collect::<String>()))
            .collect())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.has_text {
            Some(text) => write!(f, "{}:has-text(\"{}\")", self.css, text),
            None => f.write_str(&self.css),
        }
    }
}

impl From<String> for Locator {
    fn from(value: String) -> Self {
        Locator::parse(&value)
    }
}

impl From<&str> for Locator {
    fn from(value: &str) -> Self {
        Locator::parse(value)
    }
}

impl From<Locator> for String {
    fn from(value: Locator) -> Self {
        value.to_string()
    }
}

/// Opaque reference to an element on a [`Page`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Settings for one browser launch.
///
/// User agent and viewport live here rather than on a separate context object:
/// every launch yields exactly one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Delay inserted before every browser command.
    pub slow_mo: Duration,
    pub user_agent: Option<String>,
    pub viewport: Option<Viewport>,
    /// Navigation and wait timeout used when a call does not override it.
    pub default_timeout: Duration,
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Browser>, BrowserError>;
}

#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn Page>, BrowserError>;

    /// Tear down the browser process. Must be called on every exit path.
    async fn close(&self) -> Result<(), BrowserError>;
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    /// All elements currently matching `locator`, in document order.
    async fn query_selector_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, BrowserError>;

    async fn inner_text(&self, element: &ElementHandle) -> Result<String, BrowserError>;


    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError>;

    /// Replace the value of the first element matching `locator`.
    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), BrowserError>;

    /// Run `script` as a function body in the page and return its JSON result.
    async fn evaluate(
        &self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, BrowserError>;

    /// Write a PNG screenshot of the viewport to `path`.
    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError>;

    fn default_timeout(&self) -> Duration;

    /// Poll until an element matches or `timeout` elapses.
    ///
    /// Returns `Ok(None)` on timeout. `None` for `timeout` uses
    /// [`Page::default_timeout`].
    async fn wait_for_selector(
        &self,
        locator: &Locator,
        timeout: Option<Duration>,
    ) -> Result<Option<ElementHandle>, BrowserError> {
        let timeout = timeout.unwrap_or_else(|| self.default_timeout());
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(first) = self.query_selector_all(locator).await?.into_iter().next() {
                return Ok(Some(first));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}
