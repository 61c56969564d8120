//! Scripted doubles for the browser, the text API and the failure observer.
//!
//! [`FakePage`] serves static HTML per URL and evaluates locators against it
//! with `scraper`, so the same selectors used in production run in tests.
//! Clicks and scheduled document swaps let a test script a login page that
//! changes underneath the authenticator. Swap times use `tokio::time`, so tests
//! running with `start_paused = true` can cover minute-long waits instantly.

use crate::api::{AskAsync, ChatRequest, ProviderFactory};
use crate::browser::{Browser, BrowserLauncher, ElementHandle, LaunchOptions, Locator, Page};
use crate::diagnostics::FailureObserver;
use crate::error::{ApiError, BrowserError};
use async_trait::async_trait;
use scraper::Html;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum ClickEffect {
    Fail,
    Load(String),
}

#[derive(Debug, Clone)]
struct Registered {
    locator: String,
    text: String,
}

#[derive(Debug, Default)]
struct FakeState {
    documents: HashMap<String, String>,
    unreachable: HashSet<String>,
    current: String,
    click_effects: HashMap<String, ClickEffect>,
    swap: Option<(Instant, String)>,
    elements: Vec<Registered>,
    fail_screenshots: bool,
    navigations: Vec<String>,
    fills: Vec<(String, String)>,
    clicks: Vec<String>,
    screenshots: Vec<PathBuf>,
    evaluations: usize,
}

impl FakeState {
    fn apply_swap(&mut self) {
        let due = matches!(&self.swap, Some((at, _)) if Instant::now() >= *at);
        if due {
            if let Some((_, html)) = self.swap.take() {
                self.current = html;
            }
        }
    }
}

/// A page backed by static HTML documents.
#[derive(Debug, Clone)]
pub struct FakePage {
    state: Arc<Mutex<FakeState>>,
    default_timeout: Duration,
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            default_timeout: Duration::from_secs(30),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Serve `html` when the page navigates to `url`.
    pub fn with_document(self, url: &str, html: &str) -> Self {
        self.lock().documents.insert(url.to_string(), html.to_string());
        self
    }

    /// Document shown before any navigation.
    pub fn with_current(self, html: &str) -> Self {
        self.lock().current = html.to_string();
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Clicking an element found by `locator` fails.
    pub fn failing_click(self, locator: &Locator) -> Self {
        self.lock().click_effects.insert(locator.to_string(), ClickEffect::Fail);
        self
    }

    /// Clicking an element found by `locator` replaces the document.
    pub fn on_click_load(self, locator: &Locator, html: &str) -> Self {
        self.lock()
            .click_effects
            .insert(locator.to_string(), ClickEffect::Load(html.to_string()));
        self
    }

    /// Replace the current document once `after` has elapsed, whatever page
    /// is showing by then.
    pub fn swap_document_after(self, after: Duration, html: &str) -> Self {
        self.lock().swap = Some((Instant::now() + after, html.to_string()));
        self
    }

    pub fn unreachable(self, url: &str) -> Self {
        self.lock().unreachable.insert(url.to_string());
        self
    }

    pub fn failing_screenshots(self) -> Self {
        self.lock().fail_screenshots = true;
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.lock().fills.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.lock().screenshots.clone()
    }

    pub fn evaluations(&self) -> usize {
        self.lock().evaluations
    }

    fn find(&self, locator: &Locator) -> Result<Vec<ElementHandle>, BrowserError> {
        let mut state = self.lock();
        state.apply_swap();
        let found: Vec<Registered> = {
            let html = Html::parse_document(&state.current);
            locator
                .select_in(&html)
                .map_err(|message| BrowserError::Command {
                    command: "find elements".into(),
                    error: "invalid selector".into(),
                    message,
                })?
                .into_iter()
                .map(|el| Registered {
                    locator: locator.to_string(),
                    text: el.text().collect::<String>().trim().to_string(),
                })
                .collect()
        };
        let start = state.elements.len();
        state.elements.extend(found);
        Ok((start..state.elements.len())
            .map(|i| ElementHandle::new(format!("fake-{i}")))
            .collect())
    }

    fn registered(&self, element: &ElementHandle) -> Result<Registered, BrowserError> {
        element
            .id()
            .strip_prefix("fake-")
            .and_then(|i| i.parse::<usize>().ok())
            .and_then(|i| self.lock().elements.get(i).cloned())
            .ok_or_else(|| BrowserError::NoSuchElement(element.id().to_string()))
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let mut state = self.lock();
        state.navigations.push(url.to_string());
        if state.unreachable.contains(url) {
            return Err(BrowserError::Command {
                command: "navigate".into(),
                error: "unknown error".into(),
                message: format!("net::ERR_NAME_NOT_RESOLVED at {url}"),
            });
        }
        state.current = state
            .documents
            .get(url)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string());
        Ok(())
    }

    async fn query_selector_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, BrowserError> {
        self.find(locator)
    }

    async fn inner_text(&self, element: &ElementHandle) -> Result<String, BrowserError> {
        Ok(self.registered(element)?.text)
    }


    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        let registered = self.registered(element)?;
        let mut state = self.lock();
        state.clicks.push(registered.locator.clone());
        match state.click_effects.get(&registered.locator).cloned() {
            Some(ClickEffect::Fail) => Err(BrowserError::Command {
                command: "element click".into(),
                error: "element click intercepted".into(),
                message: format!("{} is covered by another element", registered.locator),
            }),
            Some(ClickEffect::Load(html)) => {
                state.current = html;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), BrowserError> {
        if self.find(locator)?.is_empty() {
            return Err(BrowserError::NoSuchElement(locator.to_string()));
        }
        self.lock().fills.push((locator.to_string(), value.to_string()));
        Ok(())
    }

    async fn evaluate(&self, _script: &str, _args: Vec<Value>) -> Result<Value, BrowserError> {
        let mut state = self.lock();
        state.apply_swap();
        state.evaluations += 1;
        Ok(Value::String(state.current.clone()))
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        if self.lock().fail_screenshots {
            return Err(BrowserError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other("screenshot disabled"),
            });
        }
        std::fs::write(path, b"\x89PNG").map_err(|source| BrowserError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.lock().screenshots.push(path.to_path_buf());
        Ok(())
    }

    fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

/// Launches browsers that all share one [`FakePage`].
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    page: FakePage,
    fail_launch: bool,
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new(page: FakePage) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }

    pub fn page(&self) -> &FakePage {
        &self.page
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Box<dyn Browser>, BrowserError> {
        if self.fail_launch {
            return Err(BrowserError::Protocol("no webdriver session".into()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeBrowser {
            page: self.page.clone(),
            closes: self.closes.clone(),
        }))
    }
}

struct FakeBrowser {
    page: FakePage,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>, BrowserError> {
        Ok(Box::new(self.page.clone()))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Canned chat client that records every request.
#[derive(Debug, Default)]
pub struct FakeAsk {
    reply: Option<String>,
    reject_keys: AtomicBool,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeAsk {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AskAsync for FakeAsk {
    async fn ask(&self, request: &ChatRequest) -> Result<String, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        self.reply.clone().ok_or_else(|| ApiError::Http {
            status: 500,
            body: "upstream unavailable".into(),
        })
    }

    async fn check_key(&self) -> Result<(), ApiError> {
        if self.reject_keys.load(Ordering::SeqCst) {
            Err(ApiError::Unauthorized)
        } else {
            Ok(())
        }
    }
}

/// Hands out one shared [`FakeAsk`] for every key.
#[derive(Debug, Clone)]
pub struct FakeProvider {
    ask: Arc<FakeAsk>,
    key_checks: Arc<Mutex<Vec<String>>>,
    connects: Arc<AtomicUsize>,
}

impl FakeProvider {
    fn wrap(ask: FakeAsk) -> Self {
        Self {
            ask: Arc::new(ask),
            key_checks: Arc::default(),
            connects: Arc::default(),
        }
    }

    pub fn replying(reply: &str) -> Self {
        Self::wrap(FakeAsk::replying(reply))
    }

    pub fn failing() -> Self {
        Self::wrap(FakeAsk::failing())
    }

    pub fn rejecting_keys(self) -> Self {
        self.ask.reject_keys.store(true, Ordering::SeqCst);
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.ask.requests()
    }

    /// Keys passed to `check_key`, in order.
    pub fn key_checks(&self) -> Vec<String> {
        self.key_checks.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

struct KeyedAsk {
    key: String,
    inner: Arc<FakeAsk>,
    key_checks: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl AskAsync for KeyedAsk {
    async fn ask(&self, request: &ChatRequest) -> Result<String, ApiError> {
        self.inner.ask(request).await
    }

    async fn check_key(&self) -> Result<(), ApiError> {
        self.key_checks.lock().unwrap().push(self.key.clone());
        self.inner.check_key().await
    }
}

impl ProviderFactory for FakeProvider {
    fn connect(&self, api_key: &str) -> Arc<dyn AskAsync> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Arc::new(KeyedAsk {
            key: api_key.to_string(),
            inner: self.ask.clone(),
            key_checks: self.key_checks.clone(),
        })
    }
}

/// Records failure labels instead of taking screenshots.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    labels: Arc<Mutex<Vec<String>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().unwrap().clone()
    }
}

#[async_trait]
impl FailureObserver for RecordingObserver {
    async fn on_failure(&self, _page: &dyn Page, label: &str) {
        self.labels.lock().unwrap().push(label.to_string());
    }
}
