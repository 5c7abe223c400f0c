//! Gmail API client: list unread candidates, fetch bodies, clear UNREAD

use async_trait::async_trait;
use google_gmail1::{
    api::{Message, ModifyMessageRequest},
    common::GetToken,
    hyper_rustls, hyper_util, Gmail,
};
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

use crate::auth::MODIFY_SCOPE;
use crate::body::{extract_body, get_header};
use crate::credentials::CredentialHandle;
use crate::error::{RelayError, Result};
use crate::i18n::{t, Language};
use crate::models::{EmailMessage, PayloadPart};

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Label removed to mark a message as read
const UNREAD_LABEL: &str = "UNREAD";

/// Mailbox operations the monitor needs
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// List ids of messages matching a Gmail search query
    async fn list_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>>;

    /// Fetch a full message and decode its body
    async fn get_message(&self, id: &str) -> Result<EmailMessage>;

    /// Remove the UNREAD label from a message
    async fn mark_as_read(&self, id: &str) -> Result<()>;
}

/// The hub asks this for a bearer token on every request, so a credential
/// replaced by the manager takes effect on the next call
impl GetToken for CredentialHandle {
    fn get_token<'a>(
        &'a self,
        _scopes: &'a [&str],
    ) -> Pin<
        Box<
            dyn Future<
                    Output = std::result::Result<
                        Option<String>,
                        Box<dyn std::error::Error + Send + Sync>,
                    >,
                > + Send
                + 'a,
        >,
    > {
        let token = self.access_token();
        Box::pin(async move { Ok(token) })
    }
}

/// Build a Gmail hub that authenticates with the manager's current credential
pub fn build_gmail_hub(credential: CredentialHandle) -> Result<GmailHub> {
    // HTTP/1 works better with google-gmail1 than the HTTP/2 default
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| RelayError::NetworkError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, credential))
}

/// Production Gmail client
pub struct ProductionGmailClient {
    hub: GmailHub,
    lang: Language,
}

impl ProductionGmailClient {
    pub fn new(hub: GmailHub, lang: Language) -> Self {
        Self { hub, lang }
    }

    /// Address of the authorized mailbox, used to confirm a fresh token works
    pub async fn profile_email(&self) -> Result<String> {
        let (_, profile) = self
            .hub
            .users()
            .get_profile("me")
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;

        Ok(profile.email_address.unwrap_or_default())
    }
}

#[async_trait]
impl MailboxClient for ProductionGmailClient {
    async fn list_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>> {
        let (_, response) = self
            .hub
            .users()
            .messages_list("me")
            .q(query)
            .max_results(max_results)
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;

        let ids: Vec<String> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect();

        debug!("Query {:?} matched {} message(s)", query, ids.len());
        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> Result<EmailMessage> {
        let (_, message) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("full")
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;

        parse_message(message, self.lang)
    }

    async fn mark_as_read(&self, id: &str) -> Result<()> {
        let modify_request = ModifyMessageRequest {
            add_label_ids: None,
            remove_label_ids: Some(vec![UNREAD_LABEL.to_string()]),
        };

        self.hub
            .users()
            .messages_modify(modify_request, "me", id)
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;

        Ok(())
    }
}

/// Parse a full-format Gmail API message into an [`EmailMessage`]
///
/// Missing Subject/From headers fall back to localized placeholders.
pub fn parse_message(msg: Message, lang: Language) -> Result<EmailMessage> {
    let id = msg
        .id
        .ok_or_else(|| RelayError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let payload = msg.payload.map(PayloadPart::from).unwrap_or_default();

    let subject = get_header(&payload.headers, "Subject")
        .map(str::to_string)
        .unwrap_or_else(|| t(lang, "no_subject"));
    let sender = get_header(&payload.headers, "From")
        .map(str::to_string)
        .unwrap_or_else(|| t(lang, "unknown_sender"));

    Ok(EmailMessage {
        id,
        subject,
        sender,
        body: extract_body(&payload),
    })
}
