//! YAML configuration.
//!
//! Everything that depends on the platform's front end lives here rather than in
//! code: URLs, the login locators, the inbox selector cascade and the metadata
//! selectors. When the site changes its markup, a new selector goes into the
//! config file and the extraction logic stays untouched.
//!
//! Every field has a default, so a config file only needs the keys it overrides:
//!
//! ```yaml
//! browser:
//!   headless: true
//! inbox:
//!   selectors:
//!     - 'a[href*="/p/"]'
//!     - '.feed-item a'
//! ```
//!
//! Credentials are never read from this file; see [`crate::cli`].

use crate::browser::{LaunchOptions, Locator, Viewport};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "inbox_digest.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub browser: BrowserConfig,
    pub site: SiteConfig,
    pub inbox: InboxConfig,
    pub article: ArticleConfig,
    pub summarizer: SummarizerConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// WebDriver server, e.g. a local `chromedriver --port=9515`.
    pub webdriver_url: String,
    /// Manual login needs a visible window, so this defaults to `false`.
    pub headless: bool,
    pub slow_mo_ms: u64,
    pub user_agent: Option<String>,
    pub viewport: Option<Viewport>,
    pub default_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: false,
            slow_mo_ms: 50,
            user_agent: None,
            viewport: None,
            default_timeout_secs: 30,
        }
    }
}

impl BrowserConfig {
    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            headless: self.headless,
            slow_mo: Duration::from_millis(self.slow_mo_ms),
            user_agent: self.user_agent.clone(),
            viewport: self.viewport,
            default_timeout: Duration::from_secs(self.default_timeout_secs),
        }
    }
}

/// Login flow and authenticated-state detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub login_url: String,
    pub inbox_url: String,
    /// Sole signal of a logged-in session.
    pub authenticated_marker: Locator,
    pub email_input: Locator,
    /// Switches the sign-in form from magic link to password.
    pub password_login_option: Locator,
    pub password_input: Locator,
    pub submit_button: Locator,
    /// Shown when the platform asks for an emailed verification code.
    pub two_factor_prompt: Option<Locator>,
    pub manual_login_timeout_secs: u64,
    pub login_step_timeout_secs: u64,
    pub post_submit_timeout_secs: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            login_url: "https://substack.com/sign-in".to_string(),
            inbox_url: "https://substack.com/inbox".to_string(),
            authenticated_marker: Locator::parse("button:has-text(\"Dashboard\")"),
            email_input: Locator::css("input[type=\"email\"]"),
            password_login_option: Locator::css(".login-option"),
            password_input: Locator::css("input[type=\"password\"]"),
            submit_button: Locator::parse("button:has-text(\"Continue\")"),
            two_factor_prompt: Some(Locator::css("input[autocomplete=\"one-time-code\"]")),
            manual_login_timeout_secs: 60,
            login_step_timeout_secs: 10,
            post_submit_timeout_secs: 10,
        }
    }
}

impl SiteConfig {
    pub fn manual_login_timeout(&self) -> Duration {
        Duration::from_secs(self.manual_login_timeout_secs)
    }

    pub fn login_step_timeout(&self) -> Duration {
        Duration::from_secs(self.login_step_timeout_secs)
    }

    pub fn post_submit_timeout(&self) -> Duration {
        Duration::from_secs(self.post_submit_timeout_secs)
    }
}

/// Feed scraping: the selector cascade and where metadata sits around a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboxConfig {
    pub settle_delay_ms: u64,
    /// How long the browser stays open after a scrape found nothing.
    pub empty_result_idle_secs: u64,
    pub default_limit: usize,
    /// Tried in order, most specific first.
    pub selectors: Vec<Locator>,
    pub metadata: MetadataSelectors,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 2000,
            empty_result_idle_secs: 5,
            default_limit: 3,
            selectors: [
                "a[href*=\"/p/\"]",
                ".post-preview a",
                "article a",
                ".post-title a",
                ".post a",
                "a[href*=\"substack.com\"]",
            ]
            .into_iter()
            .map(Locator::css)
            .collect(),
            metadata: MetadataSelectors::default(),
        }
    }
}

impl InboxConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn empty_result_idle(&self) -> Duration {
        Duration::from_secs(self.empty_result_idle_secs)
    }
}

/// CSS selectors, relative to the entry container unless noted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSelectors {
    /// Matched against the link and its ancestors (nearest wins).
    pub container: String,
    pub blog_name: String,
    pub blog_thumbnail: String,
    pub title: String,
    pub subtitle: String,
    pub article_thumbnail: String,
    pub published_at: String,
    pub author_meta: String,
}

impl Default for MetadataSelectors {
    fn default() -> Self {
        Self {
            container: ".reader2-post-container".to_string(),
            blog_name: ".pub-name a".to_string(),
            blog_thumbnail: ".reader2-post-head img".to_string(),
            title: ".reader2-post-title".to_string(),
            subtitle: ".reader2-secondary".to_string(),
            article_thumbnail: ".reader2-post-picture-container img".to_string(),
            published_at: ".inbox-item-timestamp".to_string(),
            author_meta: ".reader2-item-meta".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleConfig {
    /// Element whose rendered text is the article body.
    pub content_landmark: Locator,
}

impl Default for ArticleConfig {
    fn default() -> Self {
        Self {
            content_landmark: Locator::css("article"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Any OpenAI-compatible endpoint.
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub max_input_tokens: usize,
    pub chars_per_token: usize,
    pub request_timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            system_prompt:
                "You are a helpful assistant that creates concise summaries of articles.".to_string(),
            max_input_tokens: 16_000,
            chars_per_token: 4,
            request_timeout_secs: 60,
        }
    }
}

impl SummarizerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub screenshots: bool,
    pub screenshot_dir: PathBuf,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            screenshots: true,
            screenshot_dir: PathBuf::from("."),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] if it exists, or fall
    /// back to the built-in defaults.
    #[instrument(level = "info", skip_all)]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    Self::load_from(local)?
                } else {
                    debug!("No config file found; using defaults");
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&raw)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        // An empty file deserialises to unit, not to an empty mapping.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("site.login_url", &self.site.login_url),
            ("site.inbox_url", &self.site.inbox_url),
            ("summarizer.base_url", &self.summarizer.base_url),
            ("browser.webdriver_url", &self.browser.webdriver_url),
        ] {
            Url::parse(value).map_err(|e| ConfigError::Invalid(format!("{name} `{value}`: {e}")))?;
        }
        if self.inbox.selectors.is_empty() {
            return Err(ConfigError::Invalid(
                "inbox.selectors must list at least one selector".into(),
            ));
        }
        if self.summarizer.chars_per_token == 0 {
            return Err(ConfigError::Invalid(
                "summarizer.chars_per_token must be positive".into(),
            ));
        }
        if self.summarizer.max_input_tokens == 0 {
            return Err(ConfigError::Invalid(
                "summarizer.max_input_tokens must be positive".into(),
            ));
        }
        Ok(())
    }
}
