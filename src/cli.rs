//! Command-line interface and command wiring

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::auth::{read_client_secret, OAuthBackend};
use crate::client::{build_gmail_hub, ProductionGmailClient};
use crate::config::Config;
use crate::credentials::{CredentialManager, TokenStore};
use crate::error::{RelayError, Result};
use crate::extractor::extract;
use crate::i18n::t;
use crate::monitor::{Mailbox, Monitor, MonitorSettings};
use crate::notifier::{format_notification, Notifier, TelegramSender};

#[derive(Parser, Debug)]
#[command(name = "gmail-auth-relay")]
#[command(version)]
#[command(about = "Relay Claude login links and codes from Gmail to Telegram", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll Gmail and forward login links and codes (default)
    Run,

    /// Authorize Gmail access and store the token
    Auth {
        /// Discard the stored token and authorize again
        #[arg(long)]
        force: bool,
    },

    /// Run the extractor on a saved email body and print the notification
    Extract {
        /// Subject line of the email
        #[arg(short, long, default_value = "")]
        subject: String,

        /// File containing the decoded body (plain text or HTML)
        file: PathBuf,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Credential manager backed by the configured OAuth client and token file
pub async fn build_credential_manager(config: &Config) -> Result<CredentialManager> {
    let secret = read_client_secret(&config.gmail.credentials_file).await?;
    let backend = OAuthBackend::new(secret, config.gmail.scopes.clone(), config.language)
        .with_mode(config.auth.mode)
        .with_port(config.auth.port)
        .with_external_host(config.auth.external_host.clone());

    Ok(CredentialManager::new(
        Box::new(backend),
        TokenStore::new(&config.gmail.token_file),
        config.language,
    ))
}

/// `run`: validate, authorize, then poll until Ctrl+C
pub async fn run_monitor(config: &Config) -> Result<()> {
    if let Err(e) = config.validate() {
        eprintln!("{}", t(config.language, "config_errors_header"));
        for error in config.validation_errors() {
            eprintln!("  - {}", error);
        }
        return Err(e);
    }
    info!("{}", t(config.language, "config_ok"));

    let credentials = build_credential_manager(config).await?;
    let hub = build_gmail_hub(credentials.handle())?;
    let client = ProductionGmailClient::new(hub, config.language);

    let mailbox = Mailbox::new(
        Box::new(client),
        credentials,
        config.gmail.query.clone(),
        config.gmail.max_results,
        config.language,
    );
    let notifier = Notifier::new(
        Box::new(TelegramSender::new(&config.telegram.bot_token)),
        config.telegram.allowed_user_ids.clone(),
        config.language,
    );
    let settings = MonitorSettings {
        check_interval: Duration::from_secs(config.monitor.check_interval_secs),
        retry_delay: Duration::from_secs(config.monitor.retry_delay_secs),
        reauth_while_running: config.auth.reauth_while_running,
    };

    let mut monitor = Monitor::new(mailbox, notifier, settings, config.language);
    monitor
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

/// `auth`: obtain a credential, persist it and check it against the API
pub async fn run_auth(config: &Config, force: bool) -> Result<()> {
    let mut credentials = build_credential_manager(config).await?;

    if force {
        credentials.reauthorize().await?;
    } else {
        credentials.ensure_authorized().await?;
    }

    println!("{}", t(config.language, "gmail_auth_success"));
    println!("Token stored at: {:?}", credentials.store().path());

    let hub = build_gmail_hub(credentials.handle())?;
    let client = ProductionGmailClient::new(hub, config.language);
    let email = client.profile_email().await?;
    println!("Connected to account: {}", email);

    Ok(())
}

/// `extract`: show what a saved email body would produce
pub async fn run_extract(config: &Config, subject: &str, file: &Path) -> Result<()> {
    let body = tokio::fs::read_to_string(file).await?;
    let result = extract(subject, &body);
    let time = chrono::Local::now().format("%H:%M:%S").to_string();

    println!("{}", serde_json::to_string_pretty(&result)?);
    println!();
    println!("{}", format_notification(&result, subject, &time, config.language));
    Ok(())
}

/// `init-config`: write an example configuration file
pub async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(RelayError::ConfigError(format!(
            "Configuration file already exists at {:?}. Use --force to overwrite.",
            output
        )));
    }

    Config::create_example(output).await?;

    println!("Created example configuration file at: {:?}", output);
    println!("\nPlease edit this file to customize your settings.");
    println!("Key settings to review:");
    println!("  - telegram.bot_token: token from @BotFather (or TELEGRAM_BOT_TOKEN)");
    println!("  - telegram.allowed_user_ids: chats that receive notifications");
    println!("  - gmail.credentials_file: OAuth client downloaded from Google Cloud Console");
    println!("  - auth.mode: 'auto', 'browser' or 'headless'");

    Ok(())
}
