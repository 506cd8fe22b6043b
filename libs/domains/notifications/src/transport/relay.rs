//! Real relay connections built on lettre's low-level SMTP client.
//!
//! The pooled `AsyncSmtpTransport` hides the connect / authenticate / send
//! boundaries, so sessions drive `AsyncSmtpConnection` directly.

use super::{BoxError, SmtpConnection, SmtpConnector};
use crate::config::{SmtpSecurity, SmtpSettings};
use crate::models::EmailMessage;
use async_trait::async_trait;
use lettre::Message;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::{ClientId, Extension};
use tracing::{debug, warn};

/// Connects to the configured relay over TCP, then upgrades with STARTTLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct LettreConnector;

#[async_trait]
impl SmtpConnector for LettreConnector {
    async fn connect(&self, settings: &SmtpSettings) -> Result<Box<dyn SmtpConnection>, BoxError> {
        let hello = ClientId::Domain(settings.helo_name.clone());

        // Socket-level timeout; stage timeouts are enforced by the session.
        let socket_timeout = settings
            .timeouts
            .connect
            .max(settings.timeouts.authenticate)
            .max(settings.timeouts.send);

        let mut connection = AsyncSmtpConnection::connect_tokio1(
            (settings.host.as_str(), settings.port),
            Some(socket_timeout),
            &hello,
            None,
            None,
        )
        .await?;

        let offers_starttls = connection.server_info().supports_feature(Extension::StartTls);

        match (offers_starttls, settings.security) {
            (true, _) => {
                let upgraded = match TlsParameters::new(settings.host.clone()) {
                    Ok(tls) => connection.starttls(tls, &hello).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = upgraded {
                    connection.abort().await;
                    return Err(e.into());
                }
                debug!(host = %settings.host, "STARTTLS negotiated");
            }
            (false, SmtpSecurity::StartTls) => {
                connection.abort().await;
                return Err(format!("{} does not offer STARTTLS", settings.host).into());
            }
            (false, SmtpSecurity::Opportunistic) => {
                warn!(
                    host = %settings.host,
                    "Relay does not offer STARTTLS; continuing without TLS"
                );
            }
        }

        Ok(Box::new(LettreConnection { inner: connection }))
    }
}

struct LettreConnection {
    inner: AsyncSmtpConnection,
}

#[async_trait]
impl SmtpConnection for LettreConnection {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), BoxError> {
        let credentials = Credentials::new(username.to_string(), password.to_string());
        self.inner
            .auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
            .await?;
        Ok(())
    }

    async fn send(&mut self, message: &EmailMessage) -> Result<Option<String>, BoxError> {
        let email = build_message(message)?;
        let response = self.inner.send(email.envelope(), &email.formatted()).await?;

        Ok(response.message().next().map(|s| s.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.quit().await {
            debug!(error = %e, "SMTP QUIT failed; aborting connection");
            self.inner.abort().await;
        }
    }
}

/// Build a single-part HTML lettre message.
pub(crate) fn build_message(message: &EmailMessage) -> Result<Message, BoxError> {
    let from = Mailbox::new(
        Some(message.from_name().to_string()),
        message.from_address().parse()?,
    );
    let to = Mailbox::new(None, message.to_address().parse()?);

    let email = Message::builder()
        .from(from)
        .to(to)
        .subject(message.subject())
        .header(ContentType::TEXT_HTML)
        .body(message.html_body().to_string())?;

    Ok(email)
}
