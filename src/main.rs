use anyhow::Result;
use clap::Parser;
use gmail_auth_relay::cli::{self, Cli, Commands};
use gmail_auth_relay::config::Config;
use gmail_auth_relay::error::RelayError;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On non-Windows platforms, use aws-lc-rs; on Windows, use ring
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_auth_relay=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_auth_relay=info,warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = Config::load(&cli.config).await?;
            cli::run_monitor(&config).await?;
        }

        Commands::Auth { force } => {
            let config = Config::load(&cli.config).await?;
            cli::run_auth(&config, force).await?;
        }

        Commands::Extract { subject, file } => {
            let config = Config::load(&cli.config).await?;
            cli::run_extract(&config, &subject, &file).await?;
        }

        Commands::InitConfig { output, force } => {
            tracing::info!("Generating example configuration file");
            cli::init_config(&output, force).await?;
        }
    }

    Ok(())
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(relay_err) = error.downcast_ref::<RelayError>() {
        match relay_err {
            RelayError::AuthError(_) => {
                eprintln!("\nHint: Make sure your credentials.json file is valid.");
                eprintln!("      You can download it from Google Cloud Console.");
                eprintln!("      Try running: gmail-auth-relay auth --force");
            }
            RelayError::TokenExpired(_) => {
                eprintln!("\nHint: Gmail access was revoked or expired.");
                eprintln!("      Run: gmail-auth-relay auth");
            }
            RelayError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: gmail-auth-relay init-config --force");
            }
            e if e.is_credential_error() => {
                eprintln!("\nHint: Gmail rejected the stored token.");
                eprintln!("      Run: gmail-auth-relay auth --force");
            }
            _ => {}
        }
    }
}
