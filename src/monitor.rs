//! The polling loop: fetch unread mail, extract, notify, mark read
//!
//! One cycle runs to completion before the next is scheduled. A provider
//! call that fails with a credential error is retried once after the
//! credential manager has recovered.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::client::MailboxClient;
use crate::credentials::{Credential, CredentialManager};
use crate::error::{RelayError, Result};
use crate::extractor::extract;
use crate::i18n::{t, t_with, Language};
use crate::models::EmailMessage;
use crate::notifier::Notifier;

/// Gmail access with credential recovery around every call
pub struct Mailbox {
    client: Box<dyn MailboxClient>,
    credentials: CredentialManager,
    query: String,
    max_results: u32,
    lang: Language,
}

impl Mailbox {
    pub fn new(
        client: Box<dyn MailboxClient>,
        credentials: CredentialManager,
        query: impl Into<String>,
        max_results: u32,
        lang: Language,
    ) -> Self {
        Self {
            client,
            credentials,
            query: query.into(),
            max_results,
            lang,
        }
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn credentials_mut(&mut self) -> &mut CredentialManager {
        &mut self.credentials
    }

    pub async fn ensure_authorized(&mut self) -> Result<Credential> {
        self.credentials.ensure_authorized().await
    }

    /// Fetch every message matching the query
    ///
    /// Messages that fail to load are logged and skipped. A failure of the
    /// listing itself is retried once if the credential could be recovered;
    /// anything else surfaces as an `ApiError`, except `TokenExpired`.
    pub async fn fetch_unread(&mut self) -> Result<Vec<EmailMessage>> {
        let error = match self.try_fetch().await {
            Ok(emails) => return Ok(emails),
            Err(e) => e,
        };

        match self.credentials.recover_from_failure(&error).await {
            Ok(true) => self.try_fetch().await.map_err(|e| self.fetch_error(e)),
            Ok(false) => Err(self.fetch_error(error)),
            Err(recovery_error) => Err(self.fetch_error(recovery_error)),
        }
    }

    async fn try_fetch(&self) -> Result<Vec<EmailMessage>> {
        let ids = self
            .client
            .list_message_ids(&self.query, self.max_results)
            .await?;

        let mut emails = Vec::with_capacity(ids.len());
        for id in ids {
            match self.client.get_message(&id).await {
                Ok(email) => emails.push(email),
                Err(e) => {
                    error!(
                        "{}",
                        t_with(self.lang, "email_read_error", &[("msg_id", &id), ("error", &e)])
                    );
                }
            }
        }
        Ok(emails)
    }

    fn fetch_error(&self, error: RelayError) -> RelayError {
        match error {
            RelayError::TokenExpired(_) => error,
            other => {
                RelayError::ApiError(t_with(self.lang, "gmail_fetch_error", &[("error", &other)]))
            }
        }
    }

    /// Clear the UNREAD label; returns whether the label was removed
    ///
    /// Failures are logged rather than returned, except `TokenExpired`.
    pub async fn mark_as_read(&mut self, id: &str) -> Result<bool> {
        let error = match self.client.mark_as_read(id).await {
            Ok(()) => return Ok(self.marked(id)),
            Err(e) => e,
        };

        let error = match self.credentials.recover_from_failure(&error).await {
            Ok(true) => match self.client.mark_as_read(id).await {
                Ok(()) => return Ok(self.marked(id)),
                Err(e) => e,
            },
            Ok(false) => error,
            Err(e @ RelayError::TokenExpired(_)) => return Err(e),
            Err(e) => e,
        };

        error!("{}", t_with(self.lang, "email_mark_error", &[("error", &error)]));
        Ok(false)
    }

    fn marked(&self, id: &str) -> bool {
        info!("{}", t_with(self.lang, "email_marked_read", &[("msg_id", &id)]));
        true
    }
}

/// Loop timing and policy
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub check_interval: Duration,
    pub retry_delay: Duration,
    /// Allow interactive re-authorization after startup
    pub reauth_while_running: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(15),
            retry_delay: Duration::from_secs(30),
            reauth_while_running: false,
        }
    }
}

/// Outcome of one polling cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub found: usize,
    pub notified: usize,
    pub marked_read: usize,
}

pub struct Monitor {
    mailbox: Mailbox,
    notifier: Notifier,
    settings: MonitorSettings,
    lang: Language,
}

impl Monitor {
    pub fn new(
        mailbox: Mailbox,
        notifier: Notifier,
        settings: MonitorSettings,
        lang: Language,
    ) -> Self {
        Self {
            mailbox,
            notifier,
            settings,
            lang,
        }
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Fetch, extract, notify and mark read
    ///
    /// An email is marked read only if at least one recipient received
    /// its notification, so undelivered ones are picked up next cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.mailbox.ensure_authorized().await?;

        let emails = self.mailbox.fetch_unread().await?;
        let mut report = CycleReport {
            found: emails.len(),
            ..Default::default()
        };

        if emails.is_empty() {
            debug!("{}", t(self.lang, "no_new_emails"));
            return Ok(report);
        }

        info!("{}", t_with(self.lang, "emails_found", &[("count", &emails.len())]));

        for email in &emails {
            let result = extract(&email.subject, &email.body);
            debug!("Email {} from {}: {:?}", email.id, email.sender, result);

            if !self.notifier.send_extraction(email, &result).await {
                warn!("{}", t(self.lang, "telegram_not_sent"));
                continue;
            }
            report.notified += 1;

            if self.mailbox.mark_as_read(&email.id).await? {
                report.marked_read += 1;
            }
        }

        Ok(report)
    }

    /// Authorize, announce startup, then poll until `shutdown` resolves
    ///
    /// Startup may run interactive authorization; afterwards it is governed
    /// by `reauth_while_running`. When the credential is gone for good the
    /// recipients are alerted once and the loop keeps polling the token
    /// store; if nobody could be alerted, the error is returned.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!("{}", t(self.lang, "gmail_auth_start"));
        self.mailbox.credentials_mut().set_interactive(true);
        tokio::select! {
            _ = &mut shutdown => {
                info!("{}", t(self.lang, "bot_stopped"));
                return Ok(());
            }
            authorized = self.mailbox.ensure_authorized() => {
                authorized?;
            }
        }
        self.mailbox
            .credentials_mut()
            .set_interactive(self.settings.reauth_while_running);

        info!("{}", t(self.lang, "telegram_startup"));
        self.notifier
            .send_startup(self.settings.check_interval.as_secs())
            .await;

        info!(
            "{}",
            t_with(
                self.lang,
                "monitoring_start",
                &[("interval", &self.settings.check_interval.as_secs())]
            )
        );

        let mut alerted = false;
        loop {
            let outcome = tokio::select! {
                _ = &mut shutdown => break,
                outcome = self.run_cycle() => outcome,
            };

            let delay = match outcome {
                Ok(_) => {
                    alerted = false;
                    self.settings.check_interval
                }
                Err(RelayError::TokenExpired(message)) => {
                    if !alerted {
                        error!("{}", message);
                        if self.notifier.send_token_expired_alert().await == 0 {
                            return Err(RelayError::TokenExpired(message));
                        }
                        alerted = true;
                    } else {
                        debug!("Still waiting for re-authorization: {}", message);
                    }
                    self.settings.retry_delay
                }
                Err(e) => {
                    error!("{}", t_with(self.lang, "gmail_api_error", &[("error", &e)]));
                    info!(
                        "{}",
                        t_with(
                            self.lang,
                            "retry_in",
                            &[("seconds", &self.settings.retry_delay.as_secs())]
                        )
                    );
                    self.settings.retry_delay
                }
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("{}", t(self.lang, "bot_stopped"));
        Ok(())
    }
}
