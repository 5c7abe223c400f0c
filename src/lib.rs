//! Gmail Auth Relay
//!
//! Watches a Gmail inbox for Claude/Anthropic emails and forwards the login
//! link, verification code or payment-failure details to Telegram.
//!
//! # Overview
//!
//! - **Credentials**: OAuth2 token lifecycle (reuse, refresh, re-authorize)
//!   with a single-writer token file
//! - **Extraction**: priority-ordered pattern matching over raw and cleaned
//!   email bodies
//! - **Monitoring**: a polling loop that notifies every recipient and marks
//!   delivered emails as read
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_auth_relay::{extract, ExtractionResult};
//!
//! let result = extract("Sign in to Claude", "Your code: 482913");
//! assert_eq!(result, ExtractionResult::code("482913"));
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 browser and headless flows
//! - [`body`] - Body decoding and HTML cleanup
//! - [`cli`] - Command-line interface and command wiring
//! - [`client`] - Gmail API client
//! - [`config`] - Configuration management
//! - [`credentials`] - Credential lifecycle manager and token store
//! - [`error`] - Error types and result aliases
//! - [`extractor`] - Link, code and payment extraction
//! - [`i18n`] - English and Russian message table
//! - [`models`] - Core data structures
//! - [`monitor`] - Polling loop
//! - [`notifier`] - Message formatting and Telegram delivery

pub mod auth;
pub mod body;
pub mod cli;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod extractor;
pub mod i18n;
pub mod models;
pub mod monitor;
pub mod notifier;

pub use client::MailboxClient;
pub use config::Config;
pub use credentials::{AuthBackend, Credential, CredentialManager, TokenStore};
pub use error::{RelayError, Result};
pub use extractor::extract;
pub use i18n::Language;
pub use models::{EmailMessage, ExtractionResult};
pub use notifier::{ChatSender, Notifier};
