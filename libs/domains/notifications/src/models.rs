//! Data models for the notifications domain.

use crate::encoding::TokenEncoder;
use crate::policy::{
    ACCOUNT_DELETION_TOKEN_LIFETIME, EMAIL_VERIFICATION_TOKEN_LIFETIME,
    PASSWORD_RESET_TOKEN_LIFETIME, TokenLifetime,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumIter, EnumString};

// ============================================================================
// Notification kinds
// ============================================================================

/// Account-lifecycle notifications this subsystem can send.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    /// Confirm ownership of the address after registration.
    EmailVerification,
    /// Link to the password reset form.
    PasswordReset,
    /// Link that confirms a requested account deletion.
    AccountDeletionConfirmation,
    /// Final notice after the account has been deleted. Carries no token.
    AccountDeletionNotice,
}

/// Per-kind data: one row per [`NotificationKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindProfile {
    /// Fixed subject line.
    pub subject: &'static str,
    /// API path the link points at; `None` for kinds without a link.
    pub link_path: Option<&'static str>,
    /// How long the link stays valid.
    pub token_lifetime: Option<TokenLifetime>,
}

const EMAIL_VERIFICATION: KindProfile = KindProfile {
    subject: "Email Verification Required - AuthAPI",
    link_path: Some("/api/auth/verify-email"),
    token_lifetime: Some(EMAIL_VERIFICATION_TOKEN_LIFETIME),
};

const PASSWORD_RESET: KindProfile = KindProfile {
    subject: "Password Reset Request - AuthAPI",
    link_path: Some("/api/auth/reset-password"),
    token_lifetime: Some(PASSWORD_RESET_TOKEN_LIFETIME),
};

const ACCOUNT_DELETION_CONFIRMATION: KindProfile = KindProfile {
    subject: "Account Deletion Confirmation - AuthAPI",
    link_path: Some("/api/auth/confirm-account-deletion"),
    token_lifetime: Some(ACCOUNT_DELETION_TOKEN_LIFETIME),
};

const ACCOUNT_DELETION_NOTICE: KindProfile = KindProfile {
    subject: "Account Successfully Deleted - AuthAPI",
    link_path: None,
    token_lifetime: None,
};

impl NotificationKind {
    pub const fn profile(&self) -> &'static KindProfile {
        match self {
            NotificationKind::EmailVerification => &EMAIL_VERIFICATION,
            NotificationKind::PasswordReset => &PASSWORD_RESET,
            NotificationKind::AccountDeletionConfirmation => &ACCOUNT_DELETION_CONFIRMATION,
            NotificationKind::AccountDeletionNotice => &ACCOUNT_DELETION_NOTICE,
        }
    }

    pub const fn subject(&self) -> &'static str {
        self.profile().subject
    }

    /// Every kind that carries a link also carries a token.
    pub const fn requires_token(&self) -> bool {
        self.profile().link_path.is_some()
    }
}

// ============================================================================
// Dispatch requests
// ============================================================================

/// A notification together with the data only that kind needs.
#[derive(Clone, PartialEq, Eq)]
pub enum Notification {
    EmailVerification { token: String },
    PasswordReset { token: String },
    AccountDeletionConfirmation { token: String },
    AccountDeletionNotice,
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::EmailVerification { .. } => NotificationKind::EmailVerification,
            Notification::PasswordReset { .. } => NotificationKind::PasswordReset,
            Notification::AccountDeletionConfirmation { .. } => {
                NotificationKind::AccountDeletionConfirmation
            }
            Notification::AccountDeletionNotice => NotificationKind::AccountDeletionNotice,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Notification::EmailVerification { token }
            | Notification::PasswordReset { token }
            | Notification::AccountDeletionConfirmation { token } => Some(token),
            Notification::AccountDeletionNotice => None,
        }
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("kind", &self.kind())
            .field("token", &self.token().map(TokenEncoder::preview))
            .finish()
    }
}

// ============================================================================
// Rendering input
// ============================================================================

/// Values bound into a template.
#[derive(Clone)]
pub struct RenderParams {
    /// Recipient address, already validated by the caller.
    pub recipient: String,
    /// Opaque token; required by every kind except the deletion notice.
    pub token: Option<String>,
    /// Root for callback links.
    pub base_url: String,
    /// Display-only generation timestamp.
    pub issued_at: DateTime<Utc>,
}

impl RenderParams {
    pub fn new(
        recipient: impl Into<String>,
        base_url: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            token: None,
            base_url: base_url.into(),
            issued_at,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl fmt::Debug for RenderParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderParams")
            .field("recipient", &self.recipient)
            .field("token", &self.token.as_deref().map(TokenEncoder::preview))
            .field("base_url", &self.base_url)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

// ============================================================================
// Outgoing message
// ============================================================================

/// A fully composed message. Built only by [`crate::composer::MailComposer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    from_address: String,
    from_name: String,
    to_address: String,
    subject: String,
    html_body: String,
}

impl EmailMessage {
    pub(crate) fn new(
        from_address: String,
        from_name: String,
        to_address: String,
        subject: String,
        html_body: String,
    ) -> Self {
        Self {
            from_address,
            from_name,
            to_address,
            subject,
            html_body,
        }
    }

    pub fn from_address(&self) -> &str {
        &self.from_address
    }

    pub fn from_name(&self) -> &str {
        &self.from_name
    }

    pub fn to_address(&self) -> &str {
        &self.to_address
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn html_body(&self) -> &str {
        &self.html_body
    }
}

/// Outcome of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    /// First line of the relay's final response, usually carrying its queue id.
    pub message_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_kind_display_and_parse() {
        assert_eq!(NotificationKind::PasswordReset.to_string(), "password_reset");
        assert_eq!(
            NotificationKind::from_str("account_deletion_notice").unwrap(),
            NotificationKind::AccountDeletionNotice
        );
        assert!(NotificationKind::from_str("welcome").is_err());
    }

    #[test]
    fn test_only_notice_has_no_token() {
        for kind in NotificationKind::iter() {
            let expected = kind != NotificationKind::AccountDeletionNotice;
            assert_eq!(kind.requires_token(), expected, "{kind}");
            assert_eq!(kind.profile().token_lifetime.is_some(), expected, "{kind}");
        }
    }

    #[test]
    fn test_lifetimes_come_from_policy() {
        assert_eq!(
            NotificationKind::EmailVerification.profile().token_lifetime,
            Some(EMAIL_VERIFICATION_TOKEN_LIFETIME)
        );
        assert_eq!(
            NotificationKind::PasswordReset.profile().token_lifetime,
            Some(PASSWORD_RESET_TOKEN_LIFETIME)
        );
        assert_eq!(
            NotificationKind::AccountDeletionConfirmation.profile().token_lifetime,
            Some(ACCOUNT_DELETION_TOKEN_LIFETIME)
        );
    }

    #[test]
    fn test_notification_kind_and_token() {
        let n = Notification::PasswordReset {
            token: "reset-token".to_string(),
        };
        assert_eq!(n.kind(), NotificationKind::PasswordReset);
        assert_eq!(n.token(), Some("reset-token"));
        assert_eq!(Notification::AccountDeletionNotice.token(), None);
    }

    #[test]
    fn test_debug_never_prints_full_token() {
        let token = "a-very-long-secret-token-value";
        let n = Notification::EmailVerification {
            token: token.to_string(),
        };
        assert!(!format!("{:?}", n).contains(token));

        let params = RenderParams::new("user@example.com", "https://x.test", Utc::now())
            .with_token(token);
        assert!(!format!("{:?}", params).contains(token));
    }
}
