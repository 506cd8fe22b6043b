//! One SMTP exchange as an explicit state machine.
//!
//! ```text
//! Idle → Connecting → Connected → Authenticating → Authenticated → Sending → Sent
//!            │                          │                             │
//!            └──────────────────────────┴─────────── Failed ──────────┘
//!
//! Sent | Failed | Connected | Authenticated → Disconnecting → Closed
//! ```
//!
//! Every stage is bounded by its timeout and by the caller's cancellation
//! token. [`TransportSession::release`] closes the connection on normal and
//! error paths; if the session is dropped first (the owning future was
//! cancelled or panicked) the connection is dropped with it.

use super::{BoxError, SmtpConnection, SmtpConnector};
use crate::config::SmtpSettings;
use crate::error::{DeliveryError, DeliveryFailure};
use crate::models::{EmailMessage, SentEmail};
use std::future::Future;
use std::time::Duration;
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Upper bound for the QUIT exchange during release.
const RELEASE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
    Sending,
    Sent,
    Failed,
    Disconnecting,
    Closed,
}

pub struct TransportSession<'a> {
    settings: &'a SmtpSettings,
    state: SessionState,
    history: Vec<SessionState>,
    connection: Option<Box<dyn SmtpConnection>>,
}

impl<'a> TransportSession<'a> {
    pub fn new(settings: &'a SmtpSettings) -> Self {
        Self {
            settings,
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
            connection: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Connect, greet and negotiate TLS.
    pub async fn connect<C>(
        &mut self,
        connector: &C,
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError>
    where
        C: SmtpConnector + ?Sized,
    {
        self.transition(SessionState::Connecting);
        let settings = self.settings;

        match run_stage(settings.timeouts.connect, cancel, connector.connect(settings)).await {
            Ok(connection) => {
                self.connection = Some(connection);
                self.transition(SessionState::Connected);
                Ok(())
            }
            Err(failure) => {
                self.transition(SessionState::Failed);
                Err(DeliveryError::Connect(failure))
            }
        }
    }

    pub async fn authenticate(&mut self, cancel: &CancellationToken) -> Result<(), DeliveryError> {
        self.transition(SessionState::Authenticating);
        let settings = self.settings;

        let result = match self.connection.as_mut() {
            Some(connection) => {
                run_stage(
                    settings.timeouts.authenticate,
                    cancel,
                    connection.authenticate(&settings.username, &settings.password),
                )
                .await
            }
            None => Err(not_connected()),
        };

        match result {
            Ok(()) => {
                self.transition(SessionState::Authenticated);
                Ok(())
            }
            Err(failure) => {
                self.transition(SessionState::Failed);
                Err(DeliveryError::Authenticate(failure))
            }
        }
    }

    pub async fn send(
        &mut self,
        message: &EmailMessage,
        cancel: &CancellationToken,
    ) -> Result<SentEmail, DeliveryError> {
        self.transition(SessionState::Sending);
        let settings = self.settings;

        let result = match self.connection.as_mut() {
            Some(connection) => {
                run_stage(settings.timeouts.send, cancel, connection.send(message)).await
            }
            None => Err(not_connected()),
        };

        match result {
            Ok(message_id) => {
                self.transition(SessionState::Sent);
                Ok(SentEmail { message_id })
            }
            Err(failure) => {
                self.transition(SessionState::Failed);
                Err(DeliveryError::Send(failure))
            }
        }
    }

    /// Close the connection if one is open and move to `Closed`. Idempotent.
    ///
    /// Not bounded by the caller's cancellation token: a cancelled dispatch
    /// still says QUIT, within [`RELEASE_TIMEOUT`].
    pub async fn release(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Some(mut connection) = self.connection.take() {
            self.transition(SessionState::Disconnecting);
            if tokio::time::timeout(RELEASE_TIMEOUT, connection.close()).await.is_err() {
                warn!(host = %self.settings.host, "SMTP QUIT timed out; dropping connection");
            }
        }

        self.transition(SessionState::Closed);
    }

    fn transition(&mut self, next: SessionState) {
        debug!(
            host = %self.settings.host,
            from = %self.state,
            to = %next,
            "SMTP session state change"
        );
        self.state = next;
        self.history.push(next);
    }
}

impl Drop for TransportSession<'_> {
    fn drop(&mut self) {
        if self.connection.take().is_some() {
            warn!(
                host = %self.settings.host,
                state = %self.state,
                "SMTP session dropped before release; closing connection"
            );
        }
    }
}

fn not_connected() -> DeliveryFailure {
    DeliveryFailure::Rejected("no open SMTP connection".to_string())
}

/// Run one stage under `limit`, giving up immediately when `cancel` fires.
async fn run_stage<T, F>(
    limit: Duration,
    cancel: &CancellationToken,
    stage: F,
) -> Result<T, DeliveryFailure>
where
    F: Future<Output = Result<T, BoxError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DeliveryFailure::Cancelled),
        result = tokio::time::timeout(limit, stage) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DeliveryFailure::Rejected(e.to_string())),
            Err(_) => Err(DeliveryFailure::TimedOut(limit)),
        },
    }
}
