//! AuthAPI Mailer
//!
//! Operator tool for the notification mailer: checks the resolved settings,
//! previews rendered bodies and sends one-off notifications through the
//! configured relay.
//!
//! ## Usage
//!
//! ```text
//! authapi-mailer check [--connect]
//! authapi-mailer preview password_reset --token <token>
//! authapi-mailer send email_verification --to user@example.com --token <token>
//! ```
//!
//! Settings come from `appsettings.json`, `appsettings.{Environment}.json` and
//! the process environment, in that order. Ctrl+C or SIGTERM cancels an
//! in-flight send at the next stage boundary; the relay connection is still
//! closed.

use clap::{Parser, Subcommand};
use core_config::tracing::init_tracing;
use core_config::{Environment, LayeredConfig};
use domain_notifications::{
    EmailDispatcher, Notification, NotificationKind, ResolvedConfig, notification_for,
};
use eyre::{Result, WrapErr, eyre};
use serde::Serialize;
use std::path::PathBuf;
use strum::IntoEnumIterator;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Token used by `preview` when none is given.
const SAMPLE_TOKEN: &str = "sample-token-0123456789";

#[derive(Parser, Debug)]
#[command(name = "authapi-mailer")]
#[command(about = "Check, preview and send AuthAPI notification emails")]
pub struct Cli {
    /// Directory holding appsettings.json and appsettings.{Environment}.json
    #[arg(short, long, default_value = ".", global = true)]
    pub config_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve email settings, validate templates and print a JSON report
    Check {
        /// Also open (and close) a connection to the relay
        #[arg(long)]
        connect: bool,
    },

    /// Render a notification body to stdout without sending it
    Preview {
        /// email_verification, password_reset, account_deletion_confirmation or
        /// account_deletion_notice
        kind: NotificationKind,

        /// Recipient shown in the body
        #[arg(long, default_value = "user@example.com")]
        to: String,

        /// Token for link-bearing kinds
        #[arg(long)]
        token: Option<String>,
    },

    /// Send one notification
    Send {
        kind: NotificationKind,

        /// Recipient address
        #[arg(long)]
        to: String,

        /// Token for link-bearing kinds
        #[arg(long)]
        token: Option<String>,
    },
}

/// Run the mailer CLI
///
/// # Errors
///
/// Returns an error if:
/// - A settings file exists but cannot be parsed
/// - A template fails startup validation
/// - The selected command fails (missing setting, render or delivery error)
pub async fn run(cli: Cli) -> Result<()> {
    let environment = Environment::from_env();
    init_tracing(&environment);

    info!(
        environment = environment.as_str(),
        config_dir = %cli.config_dir.display(),
        "Starting AuthAPI mailer"
    );

    let config = LayeredConfig::load_default(&cli.config_dir, &environment)
        .wrap_err("Failed to load configuration")?;
    let dispatcher = EmailDispatcher::new(config).wrap_err("Failed to initialize email templates")?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
            return;
        }
        trigger.cancel();
    });

    match cli.command {
        Commands::Check { connect } => {
            let config = dispatcher.config().wrap_err("Email settings are incomplete")?;

            let relay_reachable = if connect {
                dispatcher
                    .check_relay(&cancel)
                    .await
                    .wrap_err("Relay connection check failed")?;
                Some(true)
            } else {
                None
            };

            let report = SettingsReport::new(&config, relay_reachable);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Preview { kind, to, token } => {
            let notification = preview_notification(kind, token.as_deref());
            let body = dispatcher
                .preview(&notification, &to)
                .wrap_err_with(|| format!("Failed to render {}", kind))?;
            println!("Subject: {}\n\n{}", kind.subject(), body);
        }

        Commands::Send { kind, to, token } => {
            let notification = notification_for(kind, token.as_deref())
                .ok_or_else(|| eyre!("{} requires --token", kind))?;
            let sent = dispatcher
                .dispatch(notification, &to, &cancel)
                .await
                .wrap_err_with(|| format!("Failed to send {} to {}", kind, to))?;
            println!(
                "Sent {} to {} ({})",
                kind,
                to,
                sent.message_id.as_deref().unwrap_or("no response id")
            );
        }
    }

    Ok(())
}

/// What `check` prints. Never includes the password.
#[derive(Debug, Serialize)]
struct SettingsReport<'a> {
    from_address: &'a str,
    from_name: &'a str,
    base_url: &'a str,
    smtp_host: &'a str,
    smtp_port: u16,
    smtp_username: &'a str,
    smtp_security: String,
    helo_name: &'a str,
    timeout_seconds: TimeoutReport,
    templates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    relay_reachable: Option<bool>,
}

#[derive(Debug, Serialize)]
struct TimeoutReport {
    connect: u64,
    authenticate: u64,
    send: u64,
}

impl<'a> SettingsReport<'a> {
    fn new(config: &'a ResolvedConfig, relay_reachable: Option<bool>) -> Self {
        let timeouts = &config.smtp.timeouts;
        Self {
            from_address: &config.from_address,
            from_name: &config.from_name,
            base_url: &config.base_url,
            smtp_host: &config.smtp.host,
            smtp_port: config.smtp.port,
            smtp_username: &config.smtp.username,
            smtp_security: config.smtp.security.to_string(),
            helo_name: &config.smtp.helo_name,
            timeout_seconds: TimeoutReport {
                connect: timeouts.connect.as_secs(),
                authenticate: timeouts.authenticate.as_secs(),
                send: timeouts.send.as_secs(),
            },
            templates: NotificationKind::iter().map(|kind| kind.to_string()).collect(),
            relay_reachable,
        }
    }
}

fn preview_notification(kind: NotificationKind, token: Option<&str>) -> Notification {
    let token = token.unwrap_or(SAMPLE_TOKEN);
    notification_for(kind, Some(token)).unwrap_or(Notification::AccountDeletionNotice)
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .wrap_err("Failed to install SIGTERM handler")?;

    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = signal::ctrl_c() => {
            result.wrap_err("Failed to install Ctrl+C handler")?;
            info!("Received Ctrl+C, cancelling...");
        },
        _ = terminate => {
            info!("Received SIGTERM, cancelling...");
        },
    }

    Ok(())
}
