//! Localized user-facing and log strings (English and Russian)
//!
//! The active [`Language`] is plain configuration: it is passed to whatever
//! needs to render text instead of living in a process-wide setting.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Supported interface languages
///
/// Deserializes leniently: any code other than `ru` means English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Language {
    #[default]
    En,
    Ru,
}

impl Language {
    /// Parse a language code, falling back to English for anything unknown
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "ru" => Language::Ru,
            _ => Language::En,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
        }
    }
}

impl From<String> for Language {
    fn from(code: String) -> Self {
        Language::from_code(&code)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

struct Translation {
    en: &'static str,
    ru: &'static str,
}

static MESSAGES: Lazy<HashMap<&'static str, Translation>> = Lazy::new(|| {
    let entries: &[(&'static str, &'static str, &'static str)] = &[
        // startup and polling loop
        ("config_errors_header", "Configuration errors:", "Ошибки конфигурации:"),
        ("config_ok", "Configuration verified ✓", "Конфигурация проверена ✓"),
        ("gmail_auth_start", "Authenticating with Gmail...", "Авторизация в Gmail..."),
        (
            "telegram_startup",
            "Sending startup message to Telegram...",
            "Отправка стартового сообщения в Telegram...",
        ),
        (
            "monitoring_start",
            "Monitoring email (interval: {interval} sec). Ctrl+C to stop",
            "Мониторинг почты (интервал: {interval} сек). Ctrl+C для остановки",
        ),
        ("emails_found", "Found {count} new email(s)", "Найдено {count} новых писем"),
        (
            "telegram_not_sent",
            "Telegram not sent, email NOT marked as read",
            "Telegram не отправлен, письмо НЕ помечено прочитанным",
        ),
        ("no_new_emails", "No new emails", "Новых писем нет"),
        ("gmail_api_error", "Gmail API error: {error}", "Gmail API ошибка: {error}"),
        ("retry_in", "Retrying in {seconds} sec...", "Повтор через {seconds} сек..."),
        ("bot_stopped", "Bot stopped", "Бот остановлен"),
        // chat delivery
        (
            "msg_sent_to_user",
            "Message sent to user {user_id}",
            "Сообщение отправлено пользователю {user_id}",
        ),
        (
            "msg_send_error",
            "Error sending to user {user_id}: {error}",
            "Ошибка отправки пользователю {user_id}: {error}",
        ),
        ("auth_link_header", "🔐 Claude login link", "🔐 Ссылка для входа в Claude"),
        (
            "auth_mobile_link_header",
            "📱 Claude mobile login link",
            "📱 Ссылка для входа в Claude (мобильный)",
        ),
        ("auth_code_header", "🔐 Claude authorization code", "🔐 Код авторизации Claude"),
        ("payment_failed_header", "⚠️ Claude payment failed", "⚠️ Оплата Claude не прошла"),
        ("amount_label", "Amount", "Сумма"),
        ("card_label", "Card", "Карта"),
        (
            "payment_instruction",
            "Update your payment method in Claude billing settings.",
            "Обновите способ оплаты в настройках биллинга Claude.",
        ),
        ("time_label", "Time", "Время"),
        ("code_label", "Code", "Код"),
        (
            "new_email_header",
            "📧 New email from Claude/Anthropic",
            "📧 Новое письмо от Claude/Anthropic",
        ),
        ("subject_label", "Subject", "Тема"),
        ("no_subject", "No subject", "Без темы"),
        (
            "extraction_failed",
            "Could not extract code/link. Please check email manually.",
            "Не удалось извлечь код/ссылку. Проверьте почту вручную.",
        ),
        ("bot_started", "✅ Bot started!", "✅ Бот запущен!"),
        (
            "checking_email_interval",
            "Checking email every {interval} sec.",
            "Проверяю почту каждые {interval} сек.",
        ),
        (
            "waiting_for_emails",
            "Waiting for Claude/Anthropic emails...",
            "Жду писем от Claude/Anthropic...",
        ),
        (
            "token_expired_alert",
            "⛔ Gmail access expired or was revoked. Run `gmail-auth-relay auth` on the server to restore monitoring.",
            "⛔ Доступ к Gmail истёк или отозван. Запустите `gmail-auth-relay auth` на сервере, чтобы восстановить мониторинг.",
        ),
        // mailbox and credentials
        (
            "open_auth_url",
            "Open this URL in your browser:",
            "Откройте эту ссылку в браузере:",
        ),
        (
            "gmail_auth_success",
            "Gmail authentication successful",
            "Gmail авторизация успешна",
        ),
        (
            "gmail_fetch_error",
            "Error fetching emails: {error}",
            "Ошибка при получении писем: {error}",
        ),
        ("unknown_sender", "Unknown", "Неизвестный"),
        (
            "email_read_error",
            "Error reading email {msg_id}: {error}",
            "Ошибка при чтении письма {msg_id}: {error}",
        ),
        (
            "email_marked_read",
            "Email {msg_id} marked as read",
            "Письмо {msg_id} помечено как прочитанное",
        ),
        (
            "email_mark_error",
            "Error marking email as read: {error}",
            "Ошибка при пометке письма: {error}",
        ),
        (
            "token_refresh_failed",
            "Token refresh failed (expired/revoked): {error}",
            "Не удалось обновить токен (истёк/отозван): {error}",
        ),
        (
            "token_removed",
            "Old token removed, re-authentication required",
            "Старый токен удалён, требуется повторная авторизация",
        ),
        (
            "token_expired_reauth",
            "Token expired during API call, re-authenticating...",
            "Токен истёк во время запроса, повторная авторизация...",
        ),
        (
            "token_fully_expired",
            "Gmail token expired or revoked, run the auth command again",
            "Токен Gmail истёк или отозван, повторите авторизацию командой auth",
        ),
        // OAuth flows
        (
            "auth_success_browser",
            "Authentication successful! You can close this window.",
            "Авторизация успешна! Можете закрыть это окно.",
        ),
        ("auth_page_title", "Gmail authorization", "Авторизация Gmail"),
        (
            "auth_page_step1",
            "1. Open the link below and allow access:",
            "1. Откройте ссылку ниже и разрешите доступ:",
        ),
        ("auth_page_link", "Authorize with Google", "Авторизоваться через Google"),
        (
            "auth_page_step2",
            "2. After approving, the browser is redirected to localhost and shows an error page. That is expected.",
            "2. После подтверждения браузер перейдёт на localhost и покажет ошибку. Это нормально.",
        ),
        (
            "auth_page_step3",
            "3. Copy the full address from the browser address bar and paste it below:",
            "3. Скопируйте полный адрес из адресной строки и вставьте его ниже:",
        ),
        (
            "auth_page_placeholder",
            "http://localhost:8080/?code=...",
            "http://localhost:8080/?code=...",
        ),
        ("auth_page_submit", "Submit", "Отправить"),
        (
            "auth_code_not_found",
            "Authorization code not found in the URL. Go back and try again.",
            "Код авторизации не найден в ссылке. Вернитесь и попробуйте снова.",
        ),
        (
            "auth_server_started",
            "OAuth server started on port {port}",
            "OAuth сервер запущен на порту {port}",
        ),
        (
            "auth_server_hint",
            "Open {url} in your browser to authorize Gmail access",
            "Откройте {url} в браузере для авторизации Gmail",
        ),
    ];

    entries
        .iter()
        .map(|&(key, en, ru)| (key, Translation { en, ru }))
        .collect()
});

/// Look up a localized message; unknown keys render as `[key]`
pub fn t(lang: Language, key: &str) -> String {
    match MESSAGES.get(key) {
        Some(translation) => match lang {
            Language::En => translation.en.to_string(),
            Language::Ru => translation.ru.to_string(),
        },
        None => format!("[{}]", key),
    }
}

/// Look up a localized message and fill its `{name}` placeholders
pub fn t_with(lang: Language, key: &str, args: &[(&str, &dyn fmt::Display)]) -> String {
    args.iter().fold(t(lang, key), |message, (name, value)| {
        message.replace(&format!("{{{}}}", name), &value.to_string())
    })
}
