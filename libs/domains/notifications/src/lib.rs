//! Notifications Domain
//!
//! Transactional email for the AuthAPI account lifecycle.
//!
//! # Features
//!
//! - Email verification after registration
//! - Password reset
//! - Account deletion confirmation
//! - Account deleted notice
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Auth handler   │  ← supplies recipient + opaque token
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │ EmailDispatcher │  ← resolves settings once, renders, composes
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │ TemplateEngine  │  ← Handlebars assets, validated at startup
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │  SmtpTransport  │  ← connect → STARTTLS → AUTH → send → QUIT
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use core_config::{Environment, LayeredConfig};
//! use domain_notifications::EmailDispatcher;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = LayeredConfig::load_default(".", &Environment::from_env())?;
//! let dispatcher = EmailDispatcher::new(config)?;
//!
//! let cancel = CancellationToken::new();
//! dispatcher.send_password_reset("user@example.com", &token, &cancel).await?;
//! ```

pub mod composer;
pub mod config;
pub mod dispatcher;
pub mod encoding;
pub mod error;
pub mod models;
pub mod policy;
pub mod templates;
pub mod transport;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use composer::MailComposer;
pub use config::{ConfigResolver, ResolvedConfig, SmtpSecurity, SmtpSettings, StageTimeouts};
pub use dispatcher::{EmailDispatcher, notification_for};
pub use encoding::TokenEncoder;
pub use error::{
    DeliveryError, DeliveryFailure, DispatchStage, NotificationError, NotificationResult,
    RenderError,
};
pub use models::{EmailMessage, Notification, NotificationKind, RenderParams, SentEmail};
pub use policy::TokenLifetime;
pub use templates::TemplateEngine;
pub use transport::{LettreConnector, MailTransport, MockConnector, SmtpTransport};
