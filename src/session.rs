//! Credential store: the per-client session and its secrets.
//!
//! A [`Session`] carries the platform login and the summarization API key. It is
//! created when [`CredentialStore::save`] accepts a set of credentials, and
//! removed by [`CredentialStore::clear`] or process exit.
//!
//! The API key is validated eagerly against the provider before the session is
//! stored; a rejected key never reaches the store. Login credentials are
//! optional: without them the authenticator waits for a manual login.
//!
//! Secrets are redacted from `Debug` output.

use crate::api::ProviderFactory;
use crate::error::CredentialError;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, instrument, warn};

/// Email and password for scripted login.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub authenticated: bool,
    pub login_email: Option<String>,
    pub login_password: Option<String>,
    pub api_key: Option<String>,
}

impl Session {
    /// Login credentials, present only when both halves are stored.
    pub fn login_credentials(&self) -> Option<LoginCredentials> {
        match (&self.login_email, &self.login_password) {
            (Some(email), Some(password)) => Some(LoginCredentials {
                email: email.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.authenticated)
            .field("login_email", &self.login_email)
            .field("login_password", &self.login_password.as_ref().map(|_| "<redacted>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Session credential surface (get / set / clear).
pub trait SessionStore: Send + Sync {
    fn get(&self) -> Session;
    fn set(&self, session: Session);
    fn clear(&self);
}

/// In-process session store for a single client.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: RwLock<Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Session {
        self.session.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, session: Session) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn clear(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Session::default();
    }
}

/// Validates and stores credentials in a [`SessionStore`].
pub struct CredentialStore {
    sessions: Arc<dyn SessionStore>,
    provider: Arc<dyn ProviderFactory>,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl CredentialStore {
    /// # Arguments
    ///
    /// * `sessions` - where the validated session is kept
    /// * `provider` - used to check the API key before it is stored
    pub fn new(sessions: Arc<dyn SessionStore>, provider: Arc<dyn ProviderFactory>) -> Self {
        Self { sessions, provider }
    }

    /// Validate the API key with the provider, then store an authenticated session.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::MissingApiKey`] when the key is blank
    /// - [`CredentialError::PartialLogin`] when only one of email/password is given
    /// - [`CredentialError::InvalidApiKey`] when the provider rejects the key
    #[instrument(level = "info", skip_all, fields(has_login = email.is_some()))]
    pub async fn save(
        &self,
        email: Option<&str>,
        password: Option<&str>,
        api_key: &str,
    ) -> Result<(), CredentialError> {
        let api_key = non_blank(Some(api_key)).ok_or(CredentialError::MissingApiKey)?;
        let email = non_blank(email);
        // Passwords may legitimately carry surrounding spaces.
        let password = password.filter(|p| !p.is_empty()).map(str::to_string);
        if email.is_some() != password.is_some() {
            return Err(CredentialError::PartialLogin);
        }

        if let Err(e) = self.provider.connect(&api_key).check_key().await {
            warn!(error = %e, "API key validation failed");
            return Err(CredentialError::InvalidApiKey(e));
        }

        self.sessions.set(Session {
            authenticated: true,
            login_email: email,
            login_password: password,
            api_key: Some(api_key),
        });
        info!("Credentials stored");
        Ok(())
    }

    /// The stored session, or an unauthenticated default.
    pub fn current(&self) -> Session {
        self.sessions.get()
    }

    /// Drop the stored session.
    pub fn clear(&self) {
        self.sessions.clear();
        info!("Credentials cleared");
    }
}
