//! Polling cycle behaviour against mocked Gmail, Telegram and OAuth backends

mod common;

use common::*;
use gmail_auth_relay::credentials::CredentialManager;
use gmail_auth_relay::error::RelayError;
use gmail_auth_relay::i18n::Language;
use gmail_auth_relay::monitor::{CycleReport, Mailbox, Monitor, MonitorSettings};
use gmail_auth_relay::notifier::{format_token_expired_alert, Notifier};
use mockall::predicate::eq;
use mockall::Sequence;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

const QUERY: &str = "from:anthropic.com OR from:claude.ai is:unread";

fn monitor(
    client: MockMailClient,
    chat: MockChat,
    recipients: Vec<i64>,
    credentials: CredentialManager,
) -> Monitor {
    monitor_with(client, chat, recipients, credentials, MonitorSettings::default())
}

fn monitor_with(
    client: MockMailClient,
    chat: MockChat,
    recipients: Vec<i64>,
    credentials: CredentialManager,
    settings: MonitorSettings,
) -> Monitor {
    let mailbox = Mailbox::new(Box::new(client), credentials, QUERY, 10, Language::En);
    let notifier = Notifier::new(Box::new(chat), recipients, Language::En);
    Monitor::new(mailbox, notifier, settings, Language::En)
}

/// One unread login-code email, fetched successfully
fn client_with_one_email() -> MockMailClient {
    let mut client = MockMailClient::new();
    client
        .expect_list_message_ids()
        .returning(|_, _| Ok(vec!["m1".to_string()]));
    client
        .expect_get_message()
        .returning(|id| Ok(create_test_email(id, "Your Claude login code", "code: 482913")));
    client
}

fn delivering_chat() -> MockChat {
    let mut chat = MockChat::new();
    chat.expect_send_message().returning(|_, _| Ok(()));
    chat
}

async fn manager(dir: &TempDir, auth: MockAuth, interactive: bool) -> CredentialManager {
    let store = store_with(dir.path(), Some(&valid_credential("ya29.valid"))).await;
    let mut manager = CredentialManager::new(Box::new(auth), store, Language::En);
    manager.set_interactive(interactive);
    manager
}

#[tokio::test]
async fn test_failing_middle_recipient_still_marks_email_read() {
    let dir = TempDir::new().unwrap();

    let mut client = MockMailClient::new();
    client
        .expect_list_message_ids()
        .with(eq(QUERY), eq(10u32))
        .times(1)
        .returning(|_, _| Ok(vec!["m1".to_string()]));
    client
        .expect_get_message()
        .with(eq("m1"))
        .times(1)
        .returning(|id| Ok(create_test_email(id, "Your Claude login code", "code: 482913")));
    client
        .expect_mark_as_read()
        .with(eq("m1"))
        .times(1)
        .returning(|_| Ok(()));

    let mut chat = MockChat::new();
    chat.expect_send_message()
        .withf(|chat_id, text| *chat_id == 1 && text.contains("Code: 482913"))
        .times(1)
        .returning(|_, _| Ok(()));
    chat.expect_send_message()
        .withf(|chat_id, _| *chat_id == 2)
        .times(1)
        .returning(|_, _| {
            Err(RelayError::NotificationError(
                "Forbidden: bot was blocked by the user".to_string(),
            ))
        });
    chat.expect_send_message()
        .withf(|chat_id, _| *chat_id == 3)
        .times(1)
        .returning(|_, _| Ok(()));

    let mut auth = MockAuth::new();
    auth.expect_refresh().times(0);
    auth.expect_authorize().times(0);

    let credentials = manager(&dir, auth, false).await;
    let mut monitor = monitor(client, chat, vec![1, 2, 3], credentials);

    let report = monitor.run_cycle().await.unwrap();
    assert_eq!(
        report,
        CycleReport {
            found: 1,
            notified: 1,
            marked_read: 1
        }
    );
}

#[tokio::test]
async fn test_undelivered_email_stays_unread() {
    let dir = TempDir::new().unwrap();

    let mut client = MockMailClient::new();
    client
        .expect_list_message_ids()
        .returning(|_, _| Ok(vec!["m1".to_string()]));
    client
        .expect_get_message()
        .returning(|id| Ok(create_test_email(id, "Welcome", "Nothing to see here")));
    client.expect_mark_as_read().times(0);

    let mut chat = MockChat::new();
    chat.expect_send_message()
        .times(2)
        .returning(|_, _| Err(RelayError::NetworkError("connection refused".to_string())));

    let credentials = manager(&dir, MockAuth::new(), false).await;
    let mut monitor = monitor(client, chat, vec![1, 2], credentials);

    let report = monitor.run_cycle().await.unwrap();
    assert_eq!(report.found, 1);
    assert_eq!(report.notified, 0);
    assert_eq!(report.marked_read, 0);
}

#[tokio::test]
async fn test_unreadable_message_is_skipped() {
    let dir = TempDir::new().unwrap();

    let mut client = MockMailClient::new();
    client
        .expect_list_message_ids()
        .returning(|_, _| Ok(vec!["bad".to_string(), "good".to_string()]));
    client
        .expect_get_message()
        .with(eq("bad"))
        .returning(|_| Err(RelayError::MessageNotFound("Resource not found".to_string())));
    client
        .expect_get_message()
        .with(eq("good"))
        .returning(|id| Ok(create_test_email(id, "Sign in", "https://claude.ai/magic-link#tok")));
    client
        .expect_mark_as_read()
        .with(eq("good"))
        .times(1)
        .returning(|_| Ok(()));

    let mut chat = MockChat::new();
    chat.expect_send_message()
        .withf(|_, text| text.ends_with("https://claude.ai/magic-link#tok"))
        .times(1)
        .returning(|_, _| Ok(()));

    let credentials = manager(&dir, MockAuth::new(), false).await;
    let mut monitor = monitor(client, chat, vec![7], credentials);

    let report = monitor.run_cycle().await.unwrap();
    assert_eq!(report.found, 1);
    assert_eq!(report.marked_read, 1);
}

#[tokio::test]
async fn test_invalid_grant_removes_store_and_reports_token_expired() {
    let dir = TempDir::new().unwrap();

    let mut client = MockMailClient::new();
    client
        .expect_list_message_ids()
        .times(1)
        .returning(|_, _| Err(RelayError::Unauthorized("HTTP 401: Unauthorized".to_string())));
    client.expect_get_message().times(0);

    let mut auth = MockAuth::new();
    auth.expect_refresh()
        .times(1)
        .returning(|_| {
            Err(RelayError::AuthError(
                "invalid_grant: Token has been expired or revoked.".to_string(),
            ))
        });
    auth.expect_authorize().times(0);

    let credentials = manager(&dir, auth, false).await;
    let token_path = credentials.store().path().to_path_buf();
    let mut monitor = monitor(client, MockChat::new(), vec![1], credentials);

    let err = monitor.run_cycle().await.unwrap_err();
    assert!(matches!(err, RelayError::TokenExpired(_)));
    assert!(!token_path.exists());
    assert!(monitor.mailbox().credentials().current().is_none());
}

#[tokio::test]
async fn test_network_error_keeps_store_and_reports_api_error() {
    let dir = TempDir::new().unwrap();

    let mut client = MockMailClient::new();
    client
        .expect_list_message_ids()
        .times(1)
        .returning(|_, _| Err(RelayError::NetworkError("connection reset by peer".to_string())));

    let mut auth = MockAuth::new();
    auth.expect_refresh().times(0);
    auth.expect_authorize().times(0);

    let credentials = manager(&dir, auth, false).await;
    let token_path = credentials.store().path().to_path_buf();
    let mut monitor = monitor(client, MockChat::new(), vec![1], credentials);

    let err = monitor.run_cycle().await.unwrap_err();
    match err {
        RelayError::ApiError(message) => {
            assert!(message.starts_with("Error fetching emails:"));
            assert!(message.contains("connection reset by peer"));
        }
        other => panic!("expected ApiError, got {:?}", other),
    }
    assert!(token_path.exists());
}

#[tokio::test]
async fn test_credential_error_is_recovered_and_retried_once() {
    let dir = TempDir::new().unwrap();
    let mut seq = Sequence::new();

    let mut client = MockMailClient::new();
    client
        .expect_list_message_ids()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(RelayError::Unauthorized("HTTP 401: Unauthorized".to_string())));
    client
        .expect_list_message_ids()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(vec![]));

    let mut auth = MockAuth::new();
    auth.expect_refresh()
        .withf(|credential| credential.refresh_token.as_deref() == Some("1//refresh"))
        .times(1)
        .returning(|_| {
            let mut fresh = valid_credential("ya29.fresh");
            fresh.refresh_token = None;
            Ok(fresh)
        });

    let credentials = manager(&dir, auth, false).await;
    let mut monitor = monitor(client, MockChat::new(), vec![1], credentials);

    let report = monitor.run_cycle().await.unwrap();
    assert_eq!(report, CycleReport::default());

    let stored = monitor.mailbox().credentials().store().load().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "ya29.fresh");
    assert_eq!(stored.refresh_token.as_deref(), Some("1//refresh"));
}

#[tokio::test]
async fn test_run_stops_when_token_expired_alert_reaches_nobody() {
    let dir = TempDir::new().unwrap();

    let mut client = MockMailClient::new();
    client
        .expect_list_message_ids()
        .times(1)
        .returning(|_, _| Err(RelayError::AuthError("invalid_grant".to_string())));

    let mut auth = MockAuth::new();
    auth.expect_refresh()
        .times(1)
        .returning(|_| Err(RelayError::AuthError("invalid_grant".to_string())));
    auth.expect_authorize().times(0);

    // startup message, then the token-expired alert
    let mut chat = MockChat::new();
    chat.expect_send_message()
        .times(2)
        .returning(|_, _| Err(RelayError::NotificationError("Unauthorized".to_string())));

    let credentials = manager(&dir, auth, true).await;
    let mut monitor = monitor(client, chat, vec![1], credentials);

    let err = monitor.run(std::future::pending::<()>()).await.unwrap_err();
    assert!(matches!(err, RelayError::TokenExpired(_)));
}

#[tokio::test]
async fn test_run_returns_on_shutdown() {
    let dir = TempDir::new().unwrap();

    let mut client = MockMailClient::new();
    client
        .expect_list_message_ids()
        .times(0..=1)
        .returning(|_, _| Ok(vec![]));

    let mut chat = MockChat::new();
    chat.expect_send_message()
        .times(0..=1)
        .returning(|_, _| Ok(()));

    let credentials = manager(&dir, MockAuth::new(), false).await;
    let mut monitor = monitor(client, chat, vec![1], credentials);

    monitor.run(std::future::ready(())).await.unwrap();
}

#[tokio::test]
async fn test_mark_read_recovers_from_credential_error() {
    let dir = TempDir::new().unwrap();
    let mut seq = Sequence::new();

    let mut client = client_with_one_email();
    client
        .expect_mark_as_read()
        .with(eq("m1"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(RelayError::Unauthorized("HTTP 401: Unauthorized".to_string())));
    client
        .expect_mark_as_read()
        .with(eq("m1"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));

    let mut auth = MockAuth::new();
    auth.expect_refresh()
        .times(1)
        .returning(|_| Ok(valid_credential("ya29.fresh")));
    auth.expect_authorize().times(0);

    let credentials = manager(&dir, auth, false).await;
    let mut monitor = monitor(client, delivering_chat(), vec![1], credentials);

    let report = monitor.run_cycle().await.unwrap();
    assert_eq!(report.notified, 1);
    assert_eq!(report.marked_read, 1);
    assert_eq!(
        monitor.mailbox().credentials().current().unwrap().access_token,
        "ya29.fresh"
    );
}

#[tokio::test]
async fn test_mark_read_failure_leaves_email_unread() {
    let dir = TempDir::new().unwrap();

    let mut client = client_with_one_email();
    client.expect_mark_as_read().times(1).returning(|_| {
        Err(RelayError::ServerError {
            status: 503,
            message: "HTTP 503: Service Unavailable".to_string(),
        })
    });

    let mut auth = MockAuth::new();
    auth.expect_refresh().times(0);
    auth.expect_authorize().times(0);

    let credentials = manager(&dir, auth, false).await;
    let mut monitor = monitor(client, delivering_chat(), vec![1], credentials);

    let report = monitor.run_cycle().await.unwrap();
    assert_eq!(report.notified, 1);
    assert_eq!(report.marked_read, 0);
}

#[tokio::test]
async fn test_mark_read_propagates_token_expired() {
    let dir = TempDir::new().unwrap();

    let mut client = client_with_one_email();
    client
        .expect_mark_as_read()
        .times(1)
        .returning(|_| Err(RelayError::Unauthorized("HTTP 401: Unauthorized".to_string())));

    let mut auth = MockAuth::new();
    auth.expect_refresh()
        .times(1)
        .returning(|_| Err(RelayError::AuthError("invalid_grant".to_string())));
    auth.expect_authorize().times(0);

    let credentials = manager(&dir, auth, false).await;
    let mut monitor = monitor(client, delivering_chat(), vec![1], credentials);

    let err = monitor.run_cycle().await.unwrap_err();
    assert!(matches!(err, RelayError::TokenExpired(_)));
}

#[tokio::test]
async fn test_run_keeps_polling_after_delivered_alert_and_picks_up_restored_token() {
    let dir = TempDir::new().unwrap();
    let stopped = Arc::new(Notify::new());
    let mut seq = Sequence::new();

    let mut client = MockMailClient::new();
    client
        .expect_list_message_ids()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(RelayError::Unauthorized("HTTP 401: Unauthorized".to_string())));
    let stop = Arc::clone(&stopped);
    client
        .expect_list_message_ids()
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |_, _| {
            stop.notify_one();
            Ok(vec![])
        });

    let mut auth = MockAuth::new();
    auth.expect_refresh()
        .times(1)
        .returning(|_| Err(RelayError::AuthError("invalid_grant".to_string())));
    auth.expect_authorize().times(0);

    // the operator re-runs `auth` in another process once alerted
    let token_path = dir.path().join("token.json");
    let restored = serde_json::to_string(&valid_credential("ya29.restored")).unwrap();
    let alert = format_token_expired_alert(Language::En);
    let mut chat = MockChat::new();
    chat.expect_send_message()
        .withf(move |_, text| text == alert)
        .times(1)
        .returning(move |_, _| {
            std::fs::write(&token_path, &restored).unwrap();
            Ok(())
        });
    chat.expect_send_message().times(1).returning(|_, _| Ok(()));

    let credentials = manager(&dir, auth, false).await;
    let settings = MonitorSettings {
        check_interval: Duration::from_secs(60),
        retry_delay: Duration::from_millis(10),
        reauth_while_running: false,
    };
    let mut monitor = monitor_with(client, chat, vec![1], credentials, settings);

    let shutdown = Arc::clone(&stopped);
    monitor
        .run(async move { shutdown.notified().await })
        .await
        .unwrap();

    assert_eq!(
        monitor.mailbox().credentials().current().unwrap().access_token,
        "ya29.restored"
    );
}
