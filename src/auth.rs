//! OAuth2 flows against Google for the Gmail API
//!
//! [`OAuthBackend`] is the production [`AuthBackend`]: it refreshes access
//! tokens with the stored refresh token and runs the installed-app flow when
//! a human has to approve access. Two flavours of the latter exist:
//!
//! - browser: a local redirect listener, for machines with a desktop
//! - headless: a small web page on `0.0.0.0:{port}` where the operator can
//!   paste the redirect URL, for servers reached over SSH or Docker

use async_trait::async_trait;
use axum::{
    extract::{Form, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use google_gmail1::yup_oauth2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info};
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::authorized_user::AuthorizedUserSecret;
use yup_oauth2::storage::{TokenInfo, TokenStorage};
use yup_oauth2::{ApplicationSecret, InstalledFlowReturnMethod};

use crate::credentials::{AuthBackend, Credential};
use crate::error::{RelayError, Result};
use crate::i18n::{t, t_with, Language};

/// Scope needed to read messages and clear the UNREAD label
pub const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// How to run the human-interactive part of the OAuth flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Browser when one can be opened, headless otherwise
    #[default]
    Auto,
    Browser,
    Headless,
}

impl AuthMode {
    /// Resolve `Auto` against the current environment
    pub fn resolve(self) -> AuthMode {
        match self {
            AuthMode::Auto if can_open_browser() => AuthMode::Browser,
            AuthMode::Auto => AuthMode::Headless,
            mode => mode,
        }
    }
}

/// Whether a local browser can plausibly be opened from this process
pub fn can_open_browser() -> bool {
    browser_available(|name| std::env::var(name).ok())
}

fn browser_available(env: impl Fn(&str) -> Option<String>) -> bool {
    let set = |name: &str| env(name).is_some_and(|v| !v.is_empty());

    if set("SSH_CONNECTION") || set("SSH_CLIENT") {
        return false;
    }

    if cfg!(all(unix, not(target_os = "macos"))) {
        return set("DISPLAY") || set("WAYLAND_DISPLAY");
    }

    true
}

/// Read the OAuth client secret downloaded from the Google Cloud console
pub async fn read_client_secret(path: &Path) -> Result<ApplicationSecret> {
    yup_oauth2::read_application_secret(path)
        .await
        .map_err(|e| RelayError::AuthError(format!("Failed to read credentials {:?}: {}", path, e)))
}

/// Production OAuth backend built on yup-oauth2
pub struct OAuthBackend {
    secret: ApplicationSecret,
    scopes: Vec<String>,
    mode: AuthMode,
    port: u16,
    external_host: String,
    lang: Language,
}

impl OAuthBackend {
    pub fn new(secret: ApplicationSecret, scopes: Vec<String>, lang: Language) -> Self {
        Self {
            secret,
            scopes,
            mode: AuthMode::Auto,
            port: 8080,
            external_host: String::new(),
            lang,
        }
    }

    pub fn with_mode(mut self, mode: AuthMode) -> Self {
        self.mode = mode;
        self
    }

    /// Port for the redirect listener (browser) or the paste page (headless)
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Public host name shown in the headless hint instead of a placeholder
    pub fn with_external_host(mut self, host: impl Into<String>) -> Self {
        self.external_host = host.into();
        self
    }

    fn hint_url(&self) -> String {
        if self.external_host.is_empty() {
            format!("http://YOUR_SERVER_IP:{}", self.port)
        } else {
            format!("http://{}", self.external_host)
        }
    }
}

#[async_trait]
impl AuthBackend for OAuthBackend {
    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .clone()
            .ok_or_else(|| RelayError::AuthError("No refresh token stored".to_string()))?;

        let secret = AuthorizedUserSecret {
            client_id: self.secret.client_id.clone(),
            client_secret: self.secret.client_secret.clone(),
            refresh_token: refresh_token.clone(),
            key_type: "authorized_user".to_string(),
        };

        let auth = yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
            .build()
            .await
            .map_err(|e| RelayError::AuthError(format!("Failed to build authenticator: {}", e)))?;

        let token = auth.token(self.scopes.as_slice()).await.map_err(oauth_error)?;
        debug!("Access token refreshed");

        credential_from_token(
            token.token(),
            Some(refresh_token),
            token.expiration_time().map(|t| t.unix_timestamp()),
            &self.scopes,
        )
    }

    async fn authorize(&self) -> Result<Credential> {
        let storage = CaptureStorage::default();
        let captured = Arc::clone(&storage.captured);

        let builder = match self.mode.resolve() {
            AuthMode::Headless => yup_oauth2::InstalledFlowAuthenticator::builder(
                self.secret.clone(),
                InstalledFlowReturnMethod::Interactive,
            )
            .flow_delegate(Box::new(HeadlessDelegate {
                redirect_uri: format!("http://localhost:{}/", self.port),
                port: self.port,
                hint_url: self.hint_url(),
                lang: self.lang,
            })),
            _ => yup_oauth2::InstalledFlowAuthenticator::builder(
                self.secret.clone(),
                InstalledFlowReturnMethod::HTTPPortRedirect(self.port),
            )
            .flow_delegate(Box::new(BrowserDelegate { lang: self.lang })),
        };

        let auth = builder
            .with_storage(Box::new(storage))
            .build()
            .await
            .map_err(|e| RelayError::AuthError(format!("Failed to build authenticator: {}", e)))?;

        let token = auth.token(self.scopes.as_slice()).await.map_err(oauth_error)?;

        let refresh_token = captured
            .lock()
            .await
            .take()
            .and_then(|info| info.refresh_token);

        credential_from_token(
            token.token(),
            refresh_token,
            token.expiration_time().map(|t| t.unix_timestamp()),
            &self.scopes,
        )
    }
}

fn credential_from_token(
    access_token: Option<&str>,
    refresh_token: Option<String>,
    expires_at_unix: Option<i64>,
    scopes: &[String],
) -> Result<Credential> {
    let access_token = access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RelayError::AuthError("Provider returned no access token".to_string()))?;

    Ok(Credential {
        access_token: access_token.to_string(),
        refresh_token,
        expires_at: expires_at_unix.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        scopes: scopes.to_vec(),
    })
}

/// Provider rejections are permanent; transport trouble is worth retrying
fn oauth_error(e: yup_oauth2::Error) -> RelayError {
    match e {
        yup_oauth2::Error::AuthError(inner) => RelayError::AuthError(inner.to_string()),
        other => RelayError::NetworkError(other.to_string()),
    }
}

/// Token storage that only remembers what the flow produced
///
/// The token file is owned by the credential manager, so nothing is ever
/// handed back to yup-oauth2 from here.
#[derive(Default)]
struct CaptureStorage {
    captured: Arc<Mutex<Option<TokenInfo>>>,
}

#[async_trait]
impl TokenStorage for CaptureStorage {
    async fn set(&self, _scopes: &[&str], token: TokenInfo) -> anyhow::Result<()> {
        *self.captured.lock().await = Some(token);
        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        None
    }
}

type DelegateFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>>;

struct BrowserDelegate {
    lang: Language,
}

impl InstalledFlowDelegate for BrowserDelegate {
    fn present_user_url<'a>(&'a self, url: &'a str, _need_code: bool) -> DelegateFuture<'a> {
        Box::pin(async move {
            println!("\n{}\n{}\n", t(self.lang, "open_auth_url"), url);
            open_in_browser(url);
            Ok(String::new())
        })
    }
}

/// Platform URL opener
fn browser_command() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(windows) {
        "explorer"
    } else {
        "xdg-open"
    }
}

/// Launch the opener without waiting on it; the printed URL is the fallback
fn open_in_browser(url: &str) {
    let command = browser_command();
    if let Err(e) = tokio::process::Command::new(command).arg(url).spawn() {
        debug!("Could not run {}: {}", command, e);
    }
}

struct HeadlessDelegate {
    redirect_uri: String,
    port: u16,
    hint_url: String,
    lang: Language,
}

impl InstalledFlowDelegate for HeadlessDelegate {
    fn redirect_uri(&self) -> Option<&str> {
        Some(&self.redirect_uri)
    }

    fn present_user_url<'a>(&'a self, url: &'a str, _need_code: bool) -> DelegateFuture<'a> {
        Box::pin(async move {
            let listener = TcpListener::bind(("0.0.0.0", self.port))
                .await
                .map_err(|e| format!("Failed to bind port {}: {}", self.port, e))?;

            info!("{}", t_with(self.lang, "auth_server_started", &[("port", &self.port)]));
            println!("\n{}", "=".repeat(60));
            println!("{}", t_with(self.lang, "auth_server_hint", &[("url", &self.hint_url)]));
            println!("{}\n", "=".repeat(60));

            serve_callback(listener, url.to_string(), self.lang)
                .await
                .map_err(|e| e.to_string())
        })
    }
}

#[derive(Clone)]
struct CallbackState {
    auth_url: Arc<String>,
    lang: Language,
    code_tx: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

impl CallbackState {
    async fn deliver(&self, code: String) {
        if let Some(tx) = self.code_tx.lock().await.take() {
            let _ = tx.send(code);
        }
    }
}

#[derive(Debug, Deserialize)]
struct PastedUrl {
    #[serde(default)]
    url: String,
}

/// Serve the headless authorization page until an authorization code arrives
///
/// The code comes either from the OAuth redirect reaching this server
/// directly (`GET /?code=...`, e.g. through port forwarding) or from the
/// operator pasting the redirect URL into the form (`POST /`).
pub async fn serve_callback(
    listener: TcpListener,
    auth_url: String,
    lang: Language,
) -> Result<String> {
    let (code_tx, code_rx) = oneshot::channel::<String>();
    let state = CallbackState {
        auth_url: Arc::new(auth_url),
        lang,
        code_tx: Arc::new(Mutex::new(Some(code_tx))),
    };

    let app = Router::new()
        .route("/", get(callback_page).post(submit_url))
        .with_state(state);

    let captured = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&captured);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Ok(code) = code_rx.await {
                *slot.lock().await = Some(code);
            }
        })
        .await?;

    let code = captured.lock().await.take();
    code.ok_or_else(|| RelayError::AuthError("Callback server stopped without a code".to_string()))
}

async fn callback_page(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    match params.get("code").filter(|c| !c.is_empty()) {
        Some(code) => {
            debug!("Authorization code received via redirect");
            state.deliver(code.clone()).await;
            Html(message_page(state.lang, "auth_success_browser"))
        }
        None => Html(instructions_page(state.lang, &state.auth_url)),
    }
}

async fn submit_url(State(state): State<CallbackState>, Form(form): Form<PastedUrl>) -> Response {
    match code_from_url(&form.url) {
        Some(code) => {
            debug!("Authorization code received via pasted URL");
            state.deliver(code).await;
            Html(message_page(state.lang, "auth_success_browser")).into_response()
        }
        None => (
            StatusCode::BAD_REQUEST,
            Html(message_page(state.lang, "auth_code_not_found")),
        )
            .into_response(),
    }
}

/// Pull the `code` query parameter out of a pasted redirect URL
pub fn code_from_url(pasted: &str) -> Option<String> {
    let url = url::Url::parse(pasted.trim()).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
}

fn message_page(lang: Language, key: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset='utf-8'></head><body><h2>{}</h2></body></html>",
        escape_html(&t(lang, key))
    )
}

fn instructions_page(lang: Language, auth_url: &str) -> String {
    let text = |key: &str| escape_html(&t(lang, key));
    format!(
        "<!DOCTYPE html><html><head><meta charset='utf-8'><title>Gmail OAuth</title></head><body>\
         <h2>{title}</h2>\
         <p>{step1}</p>\
         <p><a href='{url}' target='_blank'>{link}</a></p>\
         <p>{step2}</p>\
         <p>{step3}</p>\
         <form method='POST'>\
         <input type='text' name='url' style='width:80%;padding:8px' placeholder='{placeholder}'>\
         <br><br>\
         <button type='submit' style='padding:8px 24px'>{submit}</button>\
         </form></body></html>",
        title = text("auth_page_title"),
        step1 = text("auth_page_step1"),
        url = escape_html(auth_url),
        link = text("auth_page_link"),
        step2 = text("auth_page_step2"),
        step3 = text("auth_page_step3"),
        placeholder = text("auth_page_placeholder"),
        submit = text("auth_page_submit"),
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
