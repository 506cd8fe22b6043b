//! SMTP delivery.
//!
//! ```text
//! MailTransport           ← what the dispatcher calls (one send = one session)
//!   └─ SmtpTransport<C>
//!        └─ TransportSession   ← state machine, guaranteed release
//!             └─ C: SmtpConnector → Box<dyn SmtpConnection>
//!                   ├─ LettreConnector (real relay, STARTTLS + AUTH)
//!                   └─ MockConnector   (tests)
//! ```
//!
//! There is no retry, pooling or batching here. A retry policy belongs in a
//! `MailTransport` wrapper so every stage failure still surfaces unmodified
//! from the inner transport.

pub mod mock;
mod relay;
mod session;

pub use mock::MockConnector;
pub use relay::LettreConnector;
pub use session::{SessionState, TransportSession};

use crate::config::SmtpSettings;
use crate::error::{DeliveryError, DeliveryFailure};
use crate::models::{EmailMessage, SentEmail};
use async_trait::async_trait;
use lettre::Address;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Boxed error returned by connector implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Opens connections to the relay.
#[async_trait]
pub trait SmtpConnector: Send + Sync {
    /// Connect and complete the greeting, EHLO and (per `settings.security`)
    /// STARTTLS. A failed connect must not leave a socket open.
    async fn connect(&self, settings: &SmtpSettings)
    -> Result<Box<dyn SmtpConnection>, BoxError>;
}

/// One open connection to the relay.
#[async_trait]
pub trait SmtpConnection: Send {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), BoxError>;

    /// Submit one message; returns the first line of the relay's response.
    async fn send(&mut self, message: &EmailMessage) -> Result<Option<String>, BoxError>;

    /// Say QUIT, falling back to dropping the socket. Never fails.
    async fn close(&mut self);
}

/// Delivers composed messages.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver `message`, honouring `cancel` and the per-stage timeouts in
    /// `settings` at the connect, authenticate and send boundaries.
    async fn send(
        &self,
        settings: &SmtpSettings,
        message: EmailMessage,
        cancel: &CancellationToken,
    ) -> Result<SentEmail, DeliveryError>;

    /// Connect and disconnect without authenticating or sending.
    async fn health_check(
        &self,
        settings: &SmtpSettings,
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;
}

/// SMTP transport: one session per message.
pub struct SmtpTransport<C: SmtpConnector = LettreConnector> {
    connector: Arc<C>,
}

impl SmtpTransport<LettreConnector> {
    pub fn new() -> Self {
        Self::with_connector(LettreConnector)
    }
}

impl Default for SmtpTransport<LettreConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: SmtpConnector> SmtpTransport<C> {
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Drive `session` through connect, authenticate and send, then release
    /// it. The session ends `Closed` whichever stage fails.
    async fn deliver(
        &self,
        session: &mut TransportSession<'_>,
        message: &EmailMessage,
        cancel: &CancellationToken,
    ) -> Result<SentEmail, DeliveryError> {
        let outcome = match session.connect(&*self.connector, cancel).await {
            Ok(()) => match session.authenticate(cancel).await {
                Ok(()) => session.send(message, cancel).await,
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };

        session.release().await;
        outcome
    }

    async fn check_connection(
        &self,
        session: &mut TransportSession<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        let outcome = session.connect(&*self.connector, cancel).await;
        session.release().await;
        outcome
    }
}

impl<C: SmtpConnector> Clone for SmtpTransport<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
        }
    }
}

#[async_trait]
impl<C: SmtpConnector + 'static> MailTransport for SmtpTransport<C> {
    async fn send(
        &self,
        settings: &SmtpSettings,
        message: EmailMessage,
        cancel: &CancellationToken,
    ) -> Result<SentEmail, DeliveryError> {
        // Reject unusable addresses before a connection is acquired.
        let addresses = [
            ("sender", message.from_address()),
            ("recipient", message.to_address()),
        ];
        for (role, address) in addresses {
            address.parse::<Address>().map_err(|e| {
                let reason = format!("invalid {} address: {}", role, e);
                DeliveryError::Send(DeliveryFailure::Rejected(reason))
            })?;
        }

        debug!(
            to = %message.to_address(),
            subject = %message.subject(),
            host = %settings.host,
            port = %settings.port,
            "Sending email via SMTP"
        );

        let mut session = TransportSession::new(settings);
        let sent = self.deliver(&mut session, &message, cancel).await?;
        info!(
            to = %message.to_address(),
            message_id = ?sent.message_id,
            "Email accepted by SMTP relay"
        );
        Ok(sent)
    }

    async fn health_check(
        &self,
        settings: &SmtpSettings,
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        let mut session = TransportSession::new(settings);
        self.check_connection(&mut session, cancel).await
    }

    fn name(&self) -> &'static str {
        "SMTP"
    }
}
