//! Session authenticator.
//!
//! Brings a page into the logged-in state, or fails with an [`AuthError`].
//! The authenticated marker from [`SiteConfig`] is the only signal of success.
//!
//! 1. Marker already present: return without navigating.
//! 2. Otherwise open the login page.
//! 3. With credentials, script the sign-in form. Every step waits for its own
//!    element with a short timeout; any failure drops through to step 4.
//! 4. Wait for the marker for the manual-login window (60s by default). On
//!    timeout the observer gets a `login_timeout` capture and the call fails.
//!
//! A visible two-factor prompt after submit is logged and left to the user
//! during the manual window. If it is still on screen when the window closes,
//! the failure is [`AuthError::TwoFactorRequired`] rather than a plain timeout.

use crate::browser::{ElementHandle, Locator, Page};
use crate::config::SiteConfig;
use crate::diagnostics::{FailureObserver, labels};
use crate::error::AuthError;
use crate::session::LoginCredentials;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub struct Authenticator<'a> {
    site: &'a SiteConfig,
    observer: &'a dyn FailureObserver,
}

impl<'a> Authenticator<'a> {
    pub fn new(site: &'a SiteConfig, observer: &'a dyn FailureObserver) -> Self {
        Self { site, observer }
    }

    /// Guarantee `page` is logged in on return.
    ///
    /// # Arguments
    ///
    /// * `page` - the request's browser page
    /// * `credentials` - enables scripted login; `None` waits for a manual login
    ///
    /// # Errors
    ///
    /// [`AuthError::LoginTimeout`] when the authenticated marker does not show
    /// within the manual window, [`AuthError::TwoFactorRequired`] when the
    /// two-factor prompt is still up at that point.
    #[instrument(level = "info", skip_all, fields(scripted = credentials.is_some()))]
    pub async fn ensure_authenticated(
        &self,
        page: &dyn Page,
        credentials: Option<&LoginCredentials>,
    ) -> Result<(), AuthError> {
        if self.is_authenticated(page).await? {
            info!("Already authenticated");
            return Ok(());
        }

        info!(url = %self.site.login_url, "Navigating to login page");
        page.goto(&self.site.login_url).await?;

        match credentials {
            Some(credentials) => match self.scripted_login(page, credentials).await {
                Ok(()) => {
                    info!("Scripted login succeeded");
                    return Ok(());
                }
                Err(e) => warn!(error = %e, "Scripted login failed; falling back to manual login"),
            },
            None => info!("No login credentials in session; waiting for manual login"),
        }

        self.await_manual_login(page).await
    }

    async fn is_authenticated(&self, page: &dyn Page) -> Result<bool, AuthError> {
        Ok(!page
            .query_selector_all(&self.site.authenticated_marker)
            .await?
            .is_empty())
    }

    async fn two_factor_visible(&self, page: &dyn Page) -> bool {
        match &self.site.two_factor_prompt {
            Some(prompt) => page
                .query_selector_all(prompt)
                .await
                .map(|found| !found.is_empty())
                .unwrap_or(false),
            None => false,
        }
    }

    async fn require(
        &self,
        page: &dyn Page,
        step: &'static str,
        locator: &Locator,
    ) -> Result<ElementHandle, AuthError> {
        let timeout = self.site.login_step_timeout();
        page.wait_for_selector(locator, Some(timeout))
            .await?
            .ok_or(AuthError::LoginStep { step, timeout })
    }

    async fn scripted_login(
        &self,
        page: &dyn Page,
        credentials: &LoginCredentials,
    ) -> Result<(), AuthError> {
        info!("Attempting scripted login");
        let site = self.site;

        self.require(page, "email", &site.email_input).await?;
        page.fill(&site.email_input, &credentials.email).await?;

        let option = self.require(page, "password_option", &site.password_login_option).await?;
        page.click(&option).await?;

        self.require(page, "password", &site.password_input).await?;
        page.fill(&site.password_input, &credentials.password).await?;

        let submit = self.require(page, "submit", &site.submit_button).await?;
        page.click(&submit).await?;

        let timeout = site.post_submit_timeout();
        if page
            .wait_for_selector(&site.authenticated_marker, Some(timeout))
            .await?
            .is_some()
        {
            return Ok(());
        }
        if self.two_factor_visible(page).await {
            warn!("Two-factor verification requested; complete it in the browser window");
        }
        Err(AuthError::LoginStep {
            step: "confirm",
            timeout,
        })
    }

    async fn await_manual_login(&self, page: &dyn Page) -> Result<(), AuthError> {
        let window = self.site.manual_login_timeout();
        info!(timeout_secs = window.as_secs(), "Waiting for login to complete in the browser");
        if page
            .wait_for_selector(&self.site.authenticated_marker, Some(window))
            .await?
            .is_some()
        {
            info!("Manual login succeeded");
            return Ok(());
        }

        self.observer.on_failure(page, labels::LOGIN_TIMEOUT).await;
        Err(self.timeout_error(page, window).await)
    }

    async fn timeout_error(&self, page: &dyn Page, window: Duration) -> AuthError {
        if self.two_factor_visible(page).await {
            warn!("Login window closed with two-factor prompt still open");
            AuthError::TwoFactorRequired(window)
        } else {
            warn!("Login window closed without reaching the authenticated state");
            AuthError::LoginTimeout(window)
        }
    }
}
