//! Error types for the notifications domain.
//!
//! Every failure a dispatch can produce maps to exactly one [`DispatchStage`],
//! so callers can alert on configuration problems separately from relay
//! outages.

use crate::models::NotificationKind;
use core_config::ConfigError;
use std::time::Duration;
use strum::Display;
use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Pipeline stage in which a dispatch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DispatchStage {
    Configuration,
    Render,
    Connect,
    Authenticate,
    Send,
}

/// Errors that can occur in the notifications domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// A required setting is absent or unparsable.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Template rendering error.
    #[error("Template rendering error: {0}")]
    Render(#[from] RenderError),

    /// SMTP transport error.
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

impl NotificationError {
    /// The stage that produced this error.
    pub fn stage(&self) -> DispatchStage {
        match self {
            NotificationError::Config(_) => DispatchStage::Configuration,
            NotificationError::Render(_) => DispatchStage::Render,
            NotificationError::Delivery(err) => err.stage(),
        }
    }
}

/// Rendering failures. Messages never include token values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A parameter required by the notification kind is missing or empty.
    #[error("missing required parameter '{parameter}' for {kind}")]
    MissingParameter {
        kind: NotificationKind,
        parameter: &'static str,
    },

    /// A template asset failed registration or startup validation.
    #[error("invalid template '{template}': {details}")]
    InvalidTemplate {
        template: &'static str,
        details: String,
    },

    /// The template engine rejected the render.
    #[error("failed to render {kind}: {details}")]
    Engine {
        kind: NotificationKind,
        details: String,
    },
}

/// Why a transport stage did not complete.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The relay or the local stack reported an error.
    #[error("{0}")]
    Rejected(String),

    /// The stage exceeded its configured timeout.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The caller cancelled the dispatch.
    #[error("cancelled by caller")]
    Cancelled,
}

/// SMTP transport failure, tagged with the stage that failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// TCP connect, greeting, EHLO or STARTTLS negotiation failed.
    #[error("SMTP connect failed: {0}")]
    Connect(DeliveryFailure),

    /// The relay rejected the credentials.
    #[error("SMTP authentication failed: {0}")]
    Authenticate(DeliveryFailure),

    /// The message could not be built or was not accepted.
    #[error("SMTP send failed: {0}")]
    Send(DeliveryFailure),
}

impl DeliveryError {
    pub fn stage(&self) -> DispatchStage {
        match self {
            DeliveryError::Connect(_) => DispatchStage::Connect,
            DeliveryError::Authenticate(_) => DispatchStage::Authenticate,
            DeliveryError::Send(_) => DispatchStage::Send,
        }
    }

    pub fn failure(&self) -> &DeliveryFailure {
        match self {
            DeliveryError::Connect(f)
            | DeliveryError::Authenticate(f)
            | DeliveryError::Send(f) => f,
        }
    }
}
