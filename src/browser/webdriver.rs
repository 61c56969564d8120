//! W3C WebDriver adapter for the browser traits.
//!
//! Each [`WebDriverLauncher::launch`] call creates a new WebDriver session, which
//! makes the driver start a fresh browser process. [`Browser::close`] deletes the
//! session and with it the process.
//!
//! Only the handful of endpoints the pipeline needs are implemented:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | launch | `POST /session` |
//! | close | `DELETE /session/{id}` |
//! | goto | `POST /session/{id}/url` |
//! | query | `POST /session/{id}/elements` |
//! | text | `GET /session/{id}/element/{e}/text` |
//! | click / fill | `POST .../click`, `.../clear`, `.../value` |
//! | evaluate | `POST /session/{id}/execute/sync` |
//! | screenshot | `GET /session/{id}/screenshot` |

use super::{Browser, BrowserLauncher, ElementHandle, LaunchOptions, Locator, Page};
use crate::error::BrowserError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Key under which WebDriver serialises element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52f-4ad146b3f8a6";

/// Starts browser sessions on a WebDriver server such as `chromedriver --port=9515`.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    endpoint: String,
    client: Client,
}

impl WebDriverLauncher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn capabilities(options: &LaunchOptions) -> Value {
        let mut args = Vec::new();
        if options.headless {
            args.push("--headless=new".to_string());
        }
        if let Some(ua) = &options.user_agent {
            args.push(format!("--user-agent={ua}"));
        }
        if let Some(vp) = options.viewport {
            args.push(format!("--window-size={},{}", vp.width, vp.height));
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args },
                    "timeouts": { "pageLoad": options.default_timeout.as_millis() as u64 },
                }
            }
        })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    #[instrument(level = "info", skip_all, fields(endpoint = %self.endpoint, headless = options.headless))]
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Browser>, BrowserError> {
        let response = self
            .client
            .post(format!("{}/session", self.endpoint))
            .json(&Self::capabilities(options))
            .send()
            .await?;
        let value = unwrap_value("new session", response).await?;
        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| BrowserError::Protocol("new session response has no sessionId".into()))?;
        info!(%session_id, "Browser session started");

        Ok(Box::new(WebDriverBrowser {
            session: Arc::new(Session {
                client: self.client.clone(),
                base: format!("{}/session/{}", self.endpoint, session_id),
                slow_mo: options.slow_mo,
                default_timeout: options.default_timeout,
            }),
        }))
    }
}

#[derive(Debug)]
struct Session {
    client: Client,
    base: String,
    slow_mo: Duration,
    default_timeout: Duration,
}

impl Session {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        if !self.slow_mo.is_zero() {
            sleep(self.slow_mo).await;
        }
        let mut request = self.client.request(method.clone(), format!("{}{}", self.base, path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        debug!(%method, path, "WebDriver command");
        let response = request.send().await?;
        unwrap_value(path, response).await
    }

    async fn get(&self, path: &str) -> Result<Value, BrowserError> {
        self.command(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, BrowserError> {
        self.command(Method::POST, path, Some(body)).await
    }
}

/// Pull `value` out of a WebDriver response, mapping error payloads.
async fn unwrap_value(command: &str, response: reqwest::Response) -> Result<Value, BrowserError> {
    let status = response.status();
    let payload: Value = response.json().await?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }
    let error = value["error"].as_str().unwrap_or("unknown error").to_string();
    let message = value["message"].as_str().unwrap_or_default().to_string();
    warn!(command, %status, %error, "WebDriver command failed");
    Err(BrowserError::Command {
        command: command.to_string(),
        error,
        message,
    })
}

fn element_id(value: &Value) -> Result<ElementHandle, BrowserError> {
    value[ELEMENT_KEY]
        .as_str()
        .map(ElementHandle::new)
        .ok_or_else(|| BrowserError::Protocol(format!("not an element reference: {value}")))
}

struct WebDriverBrowser {
    session: Arc<Session>,
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>, BrowserError> {
        Ok(Box::new(WebDriverPage {
            session: Arc::clone(&self.session),
        }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let response = self.session.client.delete(&self.session.base).send().await?;
        unwrap_value("delete session", response).await?;
        info!("Browser session closed");
        Ok(())
    }
}

/// The session's single top-level browsing context.
struct WebDriverPage {
    session: Arc<Session>,
}

#[async_trait]
impl Page for WebDriverPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.session.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    async fn query_selector_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, BrowserError> {
        let value = self
            .session
            .post(
                "/elements",
                json!({ "using": "css selector", "value": locator.css_selector() }),
            )
            .await?;
        let refs = value
            .as_array()
            .ok_or_else(|| BrowserError::Protocol("find elements did not return an array".into()))?;
        let elements = refs.iter().map(element_id).collect::<Result<Vec<_>, _>>()?;
        if locator.text_filter().is_none() {
            return Ok(elements);
        }
        let mut matching = Vec::new();
        for element in elements {
            if locator.text_matches(&self.inner_text(&element).await?) {
                matching.push(element);
            }
        }
        Ok(matching)
    }

    async fn inner_text(&self, element: &ElementHandle) -> Result<String, BrowserError> {
        let value = self.session.get(&format!("/element/{}/text", element.id())).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }


    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.session
            .post(&format!("/element/{}/click", element.id()), json!({}))
            .await?;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), BrowserError> {
        let element = self
            .query_selector_all(locator)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BrowserError::NoSuchElement(locator.to_string()))?;
        self.session
            .post(&format!("/element/{}/clear", element.id()), json!({}))
            .await?;
        self.session
            .post(
                &format!("/element/{}/value", element.id()),
                json!({ "text": value }),
            )
            .await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        self.session
            .post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        let value = self.session.get("/screenshot").await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BrowserError::Protocol("screenshot is not a string".into()))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| BrowserError::Protocol(format!("screenshot is not base64: {e}")))?;
        tokio::fs::write(path, bytes).await.map_err(|source| BrowserError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn default_timeout(&self) -> Duration {
        self.session.default_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Viewport;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options() -> LaunchOptions {
        LaunchOptions {
            headless: true,
            slow_mo: Duration::ZERO,
            user_agent: Some("inbox-digest-test".into()),
            viewport: Some(Viewport {
                width: 1280,
                height: 800,
            }),
            default_timeout: Duration::from_secs(5),
        }
    }

    async fn server_with_session() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "value": { "sessionId": "abc", "capabilities": {} } })),
            )
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_capabilities_carry_launch_options() {
        let caps = WebDriverLauncher::capabilities(&options());
        let args = &caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"];
        assert_eq!(
            args,
            &json!(["--headless=new", "--user-agent=inbox-digest-test", "--window-size=1280,800"])
        );
        assert_eq!(caps["capabilities"]["alwaysMatch"]["timeouts"]["pageLoad"], json!(5000));
    }

    #[tokio::test]
    async fn test_launch_navigate_and_read_text() {
        let server = server_with_session().await;
        Mock::given(method("POST"))
            .and(path("/session/abc/url"))
            .and(body_partial_json(json!({ "url": "https://example.com/p/one" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/abc/elements"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ ELEMENT_KEY: "e1" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/abc/element/e1/text"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": "Body text" })))
            .mount(&server)
            .await;

        let launcher = WebDriverLauncher::new(server.uri());
        let browser = launcher.launch(&options()).await.unwrap();
        let page = browser.new_page().await.unwrap();
        page.goto("https://example.com/p/one").await.unwrap();
        let element = page
            .wait_for_selector(&Locator::css("article"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(element.id(), "e1");
        assert_eq!(page.inner_text(&element).await.unwrap(), "Body text");
    }

    #[tokio::test]
    async fn test_text_filter_drops_non_matching_elements() {
        let server = server_with_session().await;
        Mock::given(method("POST"))
            .and(path("/session/abc/elements"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ ELEMENT_KEY: "e1" }, { ELEMENT_KEY: "e2" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/abc/element/e1/text"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": "Settings" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/abc/element/e2/text"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": "Dashboard" })))
            .mount(&server)
            .await;

        let browser = WebDriverLauncher::new(server.uri()).launch(&options()).await.unwrap();
        let page = browser.new_page().await.unwrap();
        let found = page
            .query_selector_all(&Locator::parse("button:has-text(\"Dashboard\")"))
            .await
            .unwrap();
        assert_eq!(found, vec![ElementHandle::new("e2")]);
    }

    #[tokio::test]
    async fn test_command_error_is_mapped() {
        let server = server_with_session().await;
        Mock::given(method("POST"))
            .and(path("/session/abc/url"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": { "error": "unknown error", "message": "net::ERR_NAME_NOT_RESOLVED" }
            })))
            .mount(&server)
            .await;

        let browser = WebDriverLauncher::new(server.uri()).launch(&options()).await.unwrap();
        let page = browser.new_page().await.unwrap();
        let err = page.goto("https://nowhere.invalid").await.unwrap_err();
        match err {
            BrowserError::Command { error, message, .. } => {
                assert_eq!(error, "unknown error");
                assert!(message.contains("ERR_NAME_NOT_RESOLVED"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_screenshot_is_decoded_to_file() {
        let server = server_with_session().await;
        Mock::given(method("GET"))
            .and(path("/session/abc/screenshot"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "value": STANDARD.encode(b"PNGDATA") })),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("login_timeout.png");
        let browser = WebDriverLauncher::new(server.uri()).launch(&options()).await.unwrap();
        let page = browser.new_page().await.unwrap();
        page.screenshot(&target).await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"PNGDATA");
    }

    #[tokio::test]
    async fn test_close_deletes_session() {
        let server = server_with_session().await;
        Mock::given(method("DELETE"))
            .and(path("/session/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        let browser = WebDriverLauncher::new(server.uri()).launch(&options()).await.unwrap();
        browser.close().await.unwrap();
    }
}
