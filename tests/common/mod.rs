//! Common test utilities and fixtures

#![allow(dead_code)]

use chrono::{Duration, Utc};
use gmail_auth_relay::body::encode_base64url;
use gmail_auth_relay::client::MailboxClient;
use gmail_auth_relay::credentials::{AuthBackend, Credential, TokenStore};
use gmail_auth_relay::error::Result;
use gmail_auth_relay::models::EmailMessage;
use gmail_auth_relay::notifier::ChatSender;
use mockall::mock;
use serde_json::json;
use std::path::Path;

// Mock implementation of MailboxClient for testing
mock! {
    pub MailClient {}

    #[async_trait::async_trait]
    impl MailboxClient for MailClient {
        async fn list_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>>;
        async fn get_message(&self, id: &str) -> Result<EmailMessage>;
        async fn mark_as_read(&self, id: &str) -> Result<()>;
    }
}

mock! {
    pub Chat {}

    #[async_trait::async_trait]
    impl ChatSender for Chat {
        async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;
    }
}

mock! {
    pub Auth {}

    #[async_trait::async_trait]
    impl AuthBackend for Auth {
        async fn refresh(&self, credential: &Credential) -> Result<Credential>;
        async fn authorize(&self) -> Result<Credential>;
    }
}

/// A credential valid for the next hour
pub fn valid_credential(access_token: &str) -> Credential {
    Credential {
        access_token: access_token.to_string(),
        refresh_token: Some("1//refresh".to_string()),
        expires_at: Some(Utc::now() + Duration::hours(1)),
        scopes: vec!["https://www.googleapis.com/auth/gmail.modify".to_string()],
    }
}

/// A credential that expired a minute ago
pub fn expired_credential(access_token: &str) -> Credential {
    Credential {
        expires_at: Some(Utc::now() - Duration::minutes(1)),
        ..valid_credential(access_token)
    }
}

/// Token store at `dir/token.json`, pre-populated with `credential`
pub async fn store_with(dir: &Path, credential: Option<&Credential>) -> TokenStore {
    let store = TokenStore::new(dir.join("token.json"));
    if let Some(credential) = credential {
        store.save(credential).await.unwrap();
    }
    store
}

/// Create a test email with default sender
pub fn create_test_email(id: &str, subject: &str, body: &str) -> EmailMessage {
    EmailMessage {
        id: id.to_string(),
        subject: subject.to_string(),
        sender: "Anthropic <no-reply@mail.anthropic.com>".to_string(),
        body: body.to_string(),
    }
}

/// Gmail API `payload` JSON for a multipart/alternative message
pub fn gmail_payload_json(
    subject: &str,
    plain: Option<&str>,
    html: Option<&str>,
) -> serde_json::Value {
    let mut parts = Vec::new();
    if let Some(plain) = plain {
        parts.push(json!({
            "partId": "0",
            "mimeType": "text/plain",
            "headers": [{"name": "Content-Type", "value": "text/plain; charset=UTF-8"}],
            "body": {"size": plain.len(), "data": encode_base64url(plain.as_bytes())}
        }));
    }
    if let Some(html) = html {
        parts.push(json!({
            "partId": "1",
            "mimeType": "text/html",
            "headers": [{"name": "Content-Type", "value": "text/html; charset=UTF-8"}],
            "body": {"size": html.len(), "data": encode_base64url(html.as_bytes())}
        }));
    }

    json!({
        "partId": "",
        "mimeType": "multipart/alternative",
        "headers": [
            {"name": "From", "value": "Anthropic <no-reply@mail.anthropic.com>"},
            {"name": "Subject", "value": subject},
            {"name": "Date", "value": "Mon, 1 Jan 2024 10:00:00 -0800"}
        ],
        "body": {"size": 0},
        "parts": parts
    })
}
