//! Credential lifecycle: load, validate, refresh, re-authorize, persist
//!
//! [`CredentialManager`] is the only writer of the current credential and of
//! the token file. It moves between three states:
//!
//! ```text
//! NoCredential --authorize--> Valid --expiry--> Refreshing --ok--> Valid
//!                                                    |
//!                                                    +--fail--> NoCredential
//! NoCredential --(interactive auth unavailable)--> TokenExpired
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::i18n::{t, t_with, Language};

/// Access tokens this close to expiry are treated as expired
const EXPIRY_SKEW_SECS: i64 = 60;

/// Markers that identify an expired, revoked or rejected credential
const CREDENTIAL_MARKERS: &[&str] = &[
    "invalid_grant",
    "invalid_token",
    "invalid credentials",
    "invalid authentication credentials",
    "unauthenticated",
];

/// Decide whether a provider error message describes a credential problem
///
/// The providers expose no structured code for this, so it is a substring
/// heuristic. False negatives are tolerated: the error is then reported as a
/// generic API error.
pub fn is_credential_error(message: &str) -> bool {
    let message = message.to_lowercase();
    CREDENTIAL_MARKERS.iter().any(|marker| message.contains(marker))
        || (message.contains("token")
            && (message.contains("expired") || message.contains("revoked")))
}

/// Signature of the pluggable credential-error predicate
pub type ErrorClassifier = fn(&str) -> bool;

/// OAuth2 bearer/refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credential {
    /// Usable right now without a refresh
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && !self.is_expired_at(now)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now + Duration::seconds(EXPIRY_SKEW_SECS),
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// File-backed store for the single current credential
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored credential; `None` means not yet authorized
    pub async fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let credential = serde_json::from_str(&content)?;
        Ok(Some(credential))
    }

    /// Persist the credential, replacing any previous one
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(credential)?;
        tokio::fs::write(&self.path, content).await?;
        secure_token_file(&self.path).await?;

        debug!("Credential saved to {:?}", self.path);
        Ok(())
    }

    /// Delete the stored credential; returns whether a file was removed
    pub async fn remove(&self) -> Result<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Secure token file permissions on Unix systems
///
/// Sets file permissions to 0600 (read/write for owner only)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows uses ACLs instead of Unix permission bits
#[cfg(not(unix))]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}

/// The OAuth provider operations the manager depends on
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange the refresh token for a new access token
    async fn refresh(&self, credential: &Credential) -> Result<Credential>;

    /// Run a full (human-interactive) authorization flow
    async fn authorize(&self) -> Result<Credential>;
}

/// Read-only view of the current credential for API clients
#[derive(Debug, Clone, Default)]
pub struct CredentialHandle {
    inner: Arc<RwLock<Option<Credential>>>,
}

impl CredentialHandle {
    pub fn current(&self) -> Option<Credential> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.current().map(|c| c.access_token)
    }

    pub(crate) fn replace(&self, credential: Option<Credential>) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = credential;
        }
    }
}

/// Owns the credential and decides between reuse, refresh and re-authorization
pub struct CredentialManager {
    backend: Box<dyn AuthBackend>,
    store: TokenStore,
    handle: CredentialHandle,
    interactive: bool,
    classify: ErrorClassifier,
    lang: Language,
}

impl CredentialManager {
    pub fn new(backend: Box<dyn AuthBackend>, store: TokenStore, lang: Language) -> Self {
        Self {
            backend,
            store,
            handle: CredentialHandle::default(),
            interactive: true,
            classify: is_credential_error,
            lang,
        }
    }

    /// Replace the credential-error predicate
    pub fn with_error_classifier(mut self, classify: ErrorClassifier) -> Self {
        self.classify = classify;
        self
    }

    /// Allow or forbid the human-interactive authorization flow
    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    pub fn handle(&self) -> CredentialHandle {
        self.handle.clone()
    }

    pub fn current(&self) -> Option<Credential> {
        self.handle.current()
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Return a credential that is valid for immediate use
    ///
    /// Loads the token file if nothing is loaded yet, refreshes an expired
    /// token, and falls back to interactive authorization. Without
    /// interactive authorization a missing credential is `TokenExpired`.
    pub async fn ensure_authorized(&mut self) -> Result<Credential> {
        if self.handle.current().is_none() {
            match self.store.load().await {
                Ok(Some(credential)) => self.handle.replace(Some(credential)),
                Ok(None) => debug!("No stored credential at {:?}", self.store.path()),
                Err(e) => warn!("Ignoring unreadable token file {:?}: {}", self.store.path(), e),
            }
        }

        if let Some(credential) = self.handle.current() {
            if credential.is_valid() {
                return Ok(credential);
            }

            if credential.can_refresh() {
                match self.backend.refresh(&credential).await {
                    Ok(fresh) => return self.install(fresh, Some(&credential)).await,
                    Err(e) if e.is_transient() => return Err(e),
                    Err(e) => {
                        warn!("{}", t_with(self.lang, "token_refresh_failed", &[("error", &e)]));
                    }
                }
            }

            self.discard().await?;
        }

        self.authorize_or_expire().await
    }

    /// React to an error from a provider call
    ///
    /// Returns `Ok(false)` when the error is not credential-related. Otherwise
    /// refreshes (or re-authorizes) and returns `Ok(true)` so the caller can
    /// retry once, or fails with `TokenExpired` when that is impossible.
    pub async fn recover_from_failure(&mut self, error: &RelayError) -> Result<bool> {
        if !(self.classify)(&error.to_string()) {
            return Ok(false);
        }

        warn!("{}", t(self.lang, "token_expired_reauth"));

        if let Some(credential) = self.handle.current().filter(Credential::can_refresh) {
            match self.backend.refresh(&credential).await {
                Ok(fresh) => {
                    self.install(fresh, Some(&credential)).await?;
                    return Ok(true);
                }
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => {
                    warn!("{}", t_with(self.lang, "token_refresh_failed", &[("error", &e)]));
                }
            }
        }

        self.discard().await?;
        self.authorize_or_expire().await?;
        Ok(true)
    }

    /// Drop any stored credential and run interactive authorization
    pub async fn reauthorize(&mut self) -> Result<Credential> {
        self.discard().await?;
        let credential = self.backend.authorize().await?;
        self.install(credential, None).await
    }

    async fn authorize_or_expire(&mut self) -> Result<Credential> {
        if !self.interactive {
            return Err(RelayError::TokenExpired(t(self.lang, "token_fully_expired")));
        }

        let credential = self.backend.authorize().await?;
        self.install(credential, None).await
    }

    /// Make `fresh` current and persist it
    async fn install(
        &mut self,
        mut fresh: Credential,
        previous: Option<&Credential>,
    ) -> Result<Credential> {
        // Refresh responses usually omit the refresh token
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = previous.and_then(|p| p.refresh_token.clone());
        }
        if fresh.scopes.is_empty() {
            if let Some(previous) = previous {
                fresh.scopes = previous.scopes.clone();
            }
        }

        self.store.save(&fresh).await?;
        self.handle.replace(Some(fresh.clone()));
        info!("{}", t(self.lang, "gmail_auth_success"));
        Ok(fresh)
    }

    /// Forget the current credential and delete the token file
    async fn discard(&mut self) -> Result<()> {
        self.handle.replace(None);
        if self.store.remove().await? {
            info!("{}", t(self.lang, "token_removed"));
        }
        Ok(())
    }
}
