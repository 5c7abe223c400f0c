//! Chat notifications: message formatting and broadcast to every recipient

use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{error, info};

use crate::error::{RelayError, Result};
use crate::extractor::UNKNOWN_CARD;
use crate::i18n::{t, t_with, Language};
use crate::models::{EmailMessage, ExtractionResult};

/// Sends a text message to one chat
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Telegram Bot API sender
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// Use a non-default Bot API server (local bot API, test doubles)
    pub fn with_api_url(token: &str, api_url: &str) -> Result<Self> {
        let url = url::Url::parse(api_url).map_err(|e| {
            RelayError::ConfigError(format!("Invalid Bot API URL {}: {}", api_url, e))
        })?;
        Ok(Self {
            bot: Bot::new(token).set_api_url(url),
        })
    }
}

#[async_trait]
impl ChatSender for TelegramSender {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }
}

/// Render the notification for one extraction result
///
/// `time` is the local wall-clock time, already formatted as `HH:MM:SS`.
pub fn format_notification(
    result: &ExtractionResult,
    subject: &str,
    time: &str,
    lang: Language,
) -> String {
    match result {
        ExtractionResult::LoginLink { value } => {
            format!("{}\n\n{}", t(lang, "auth_link_header"), value)
        }
        ExtractionResult::MobileLoginLink { value } => {
            format!("{}\n\n{}", t(lang, "auth_mobile_link_header"), value)
        }
        ExtractionResult::Code { value } => format!(
            "{}\n\n{}: {}\n{}: {}",
            t(lang, "auth_code_header"),
            t(lang, "code_label"),
            value,
            t(lang, "time_label"),
            time
        ),
        ExtractionResult::PaymentFailure { amount, card_last4 } => {
            let card = if card_last4.is_empty() || card_last4 == UNKNOWN_CARD {
                UNKNOWN_CARD.to_string()
            } else {
                format!("**** {}", card_last4)
            };
            format!(
                "{}\n\n{}: {}\n{}: {}\n\n{}",
                t(lang, "payment_failed_header"),
                t(lang, "amount_label"),
                amount,
                t(lang, "card_label"),
                card,
                t(lang, "payment_instruction")
            )
        }
        ExtractionResult::None => format!(
            "{}\n\n{}: {}\n{}: {}\n\n{}",
            t(lang, "new_email_header"),
            t(lang, "subject_label"),
            subject,
            t(lang, "time_label"),
            time,
            t(lang, "extraction_failed")
        ),
    }
}

pub fn format_startup_message(check_interval_secs: u64, lang: Language) -> String {
    format!(
        "{}\n\n{}\n{}",
        t(lang, "bot_started"),
        t_with(lang, "checking_email_interval", &[("interval", &check_interval_secs)]),
        t(lang, "waiting_for_emails")
    )
}

pub fn format_token_expired_alert(lang: Language) -> String {
    t(lang, "token_expired_alert")
}

/// Delivers one message to every configured recipient
pub struct Notifier {
    sender: Box<dyn ChatSender>,
    recipients: Vec<i64>,
    lang: Language,
}

impl Notifier {
    pub fn new(sender: Box<dyn ChatSender>, recipients: Vec<i64>, lang: Language) -> Self {
        Self {
            sender,
            recipients,
            lang,
        }
    }

    /// Send `text` to each recipient in turn; returns how many received it
    ///
    /// A failing recipient is logged and does not stop delivery to the rest.
    pub async fn broadcast(&self, text: &str, log_success: bool) -> usize {
        let mut delivered = 0;

        for &user_id in &self.recipients {
            match self.sender.send_message(user_id, text).await {
                Ok(()) => {
                    if log_success {
                        info!(
                            "{}",
                            t_with(self.lang, "msg_sent_to_user", &[("user_id", &user_id)])
                        );
                    }
                    delivered += 1;
                }
                Err(e) => {
                    error!(
                        "{}",
                        t_with(self.lang, "msg_send_error", &[("user_id", &user_id), ("error", &e)])
                    );
                }
            }
        }

        delivered
    }

    /// Notify about one email; true when at least one recipient got it
    pub async fn send_extraction(&self, email: &EmailMessage, result: &ExtractionResult) -> bool {
        let time = chrono::Local::now().format("%H:%M:%S").to_string();
        let text = format_notification(result, &email.subject, &time, self.lang);
        self.broadcast(&text, true).await > 0
    }

    pub async fn send_startup(&self, check_interval_secs: u64) -> usize {
        let text = format_startup_message(check_interval_secs, self.lang);
        self.broadcast(&text, false).await
    }

    pub async fn send_token_expired_alert(&self) -> usize {
        self.broadcast(&format_token_expired_alert(self.lang), true).await
    }
}
