//! The public entry point: resolve, render, compose, deliver.
//!
//! ```text
//! dispatch(notification, recipient)
//!   ├─ ConfigResolver::resolve     (once, cached on success)
//!   ├─ TemplateEngine::render
//!   ├─ MailComposer::compose
//!   └─ MailTransport::send         (connect → authenticate → send → release)
//! ```
//!
//! Each call is independent: no state is shared between concurrent dispatches
//! except the read-only resolved configuration and template registry.

use crate::composer::MailComposer;
use crate::config::{ConfigResolver, ResolvedConfig};
use crate::error::NotificationResult;
use crate::models::{Notification, NotificationKind, RenderParams, SentEmail};
use crate::templates::TemplateEngine;
use crate::transport::{MailTransport, SmtpTransport};
use chrono::Utc;
use core_config::LayeredConfig;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

/// Sends account-lifecycle notifications.
pub struct EmailDispatcher<T: MailTransport = SmtpTransport> {
    resolver: ConfigResolver,
    resolved: OnceCell<Arc<ResolvedConfig>>,
    templates: TemplateEngine,
    transport: Arc<T>,
}

impl EmailDispatcher<SmtpTransport> {
    /// Dispatcher that delivers through the configured SMTP relay.
    pub fn new(config: LayeredConfig) -> NotificationResult<Self> {
        Self::with_transport(config, SmtpTransport::new())
    }
}

impl<T: MailTransport> EmailDispatcher<T> {
    /// Build a dispatcher over `transport`. Templates are validated here;
    /// configuration is resolved on first use.
    pub fn with_transport(config: LayeredConfig, transport: T) -> NotificationResult<Self> {
        Ok(Self {
            resolver: ConfigResolver::new(config),
            resolved: OnceCell::new(),
            templates: TemplateEngine::new()?,
            transport: Arc::new(transport),
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolved settings, computed on the first call. Failures are not cached,
    /// so a fixed environment is picked up by the next dispatch.
    pub fn config(&self) -> NotificationResult<Arc<ResolvedConfig>> {
        let config = self
            .resolved
            .get_or_try_init(|| self.resolver.resolve().map(Arc::new))?;
        Ok(Arc::clone(config))
    }

    /// Render the body `notification` would carry, without sending it. Only
    /// the base URL is resolved, so SMTP settings may be absent.
    pub fn preview(
        &self,
        notification: &Notification,
        recipient: &str,
    ) -> NotificationResult<String> {
        let base_url = self.resolver.base_url()?;
        let params = render_params(notification, recipient, &base_url);
        Ok(self.templates.render(notification.kind(), &params)?)
    }

    /// Render, compose and deliver one notification.
    #[instrument(skip(self, notification, cancel), fields(kind = %notification.kind()))]
    pub async fn dispatch(
        &self,
        notification: Notification,
        recipient: &str,
        cancel: &CancellationToken,
    ) -> NotificationResult<SentEmail> {
        let kind = notification.kind();

        match self.deliver(&notification, recipient, cancel).await {
            Ok(sent) => {
                info!(
                    kind = %kind,
                    recipient = %recipient,
                    transport = self.transport.name(),
                    "Notification email sent"
                );
                Ok(sent)
            }
            Err(err) => {
                error!(
                    kind = %kind,
                    recipient = %recipient,
                    stage = %err.stage(),
                    error = %err,
                    "Failed to send notification email"
                );
                Err(err)
            }
        }
    }

    async fn deliver(
        &self,
        notification: &Notification,
        recipient: &str,
        cancel: &CancellationToken,
    ) -> NotificationResult<SentEmail> {
        let config = self.config()?;
        let kind = notification.kind();

        let params = render_params(notification, recipient, &config.base_url);
        let body = self.templates.render(kind, &params)?;
        let message = MailComposer::compose(&config, recipient, kind.subject(), body);

        Ok(self.transport.send(&config.smtp, message, cancel).await?)
    }

    /// Connect to the relay and disconnect again.
    pub async fn check_relay(&self, cancel: &CancellationToken) -> NotificationResult<()> {
        let config = self.config()?;
        Ok(self.transport.health_check(&config.smtp, cancel).await?)
    }

    // ========================================================================
    // Per-kind operations
    //
    // `cancel` aborts the exchange at the next connect, authenticate or send
    // boundary; the relay connection is released either way.
    // ========================================================================

    pub async fn send_email_verification(
        &self,
        recipient: &str,
        token: &str,
        cancel: &CancellationToken,
    ) -> NotificationResult<SentEmail> {
        let notification = Notification::EmailVerification {
            token: token.to_string(),
        };
        self.dispatch(notification, recipient, cancel).await
    }

    pub async fn send_password_reset(
        &self,
        recipient: &str,
        token: &str,
        cancel: &CancellationToken,
    ) -> NotificationResult<SentEmail> {
        let notification = Notification::PasswordReset {
            token: token.to_string(),
        };
        self.dispatch(notification, recipient, cancel).await
    }

    pub async fn send_account_deletion_confirmation(
        &self,
        recipient: &str,
        token: &str,
        cancel: &CancellationToken,
    ) -> NotificationResult<SentEmail> {
        let notification = Notification::AccountDeletionConfirmation {
            token: token.to_string(),
        };
        self.dispatch(notification, recipient, cancel).await
    }

    /// Final notice after deletion. No token, no link.
    pub async fn send_account_deleted_notice(
        &self,
        recipient: &str,
        cancel: &CancellationToken,
    ) -> NotificationResult<SentEmail> {
        self.dispatch(Notification::AccountDeletionNotice, recipient, cancel)
            .await
    }
}

fn render_params(notification: &Notification, recipient: &str, base_url: &str) -> RenderParams {
    let params = RenderParams::new(recipient, base_url, Utc::now());
    match notification.token() {
        Some(token) => params.with_token(token),
        None => params,
    }
}

/// Build the [`Notification`] for `kind`, attaching `token` when the kind needs one.
pub fn notification_for(kind: NotificationKind, token: Option<&str>) -> Option<Notification> {
    let token = token.map(str::to_string);
    match (kind, token) {
        (NotificationKind::EmailVerification, Some(token)) => {
            Some(Notification::EmailVerification { token })
        }
        (NotificationKind::PasswordReset, Some(token)) => {
            Some(Notification::PasswordReset { token })
        }
        (NotificationKind::AccountDeletionConfirmation, Some(token)) => {
            Some(Notification::AccountDeletionConfirmation { token })
        }
        (NotificationKind::AccountDeletionNotice, _) => Some(Notification::AccountDeletionNotice),
        (_, None) => None,
    }
}
