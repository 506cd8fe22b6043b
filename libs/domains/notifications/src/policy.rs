//! Token lifetime policy.
//!
//! The token issuer and the templates must agree on how long a link stays
//! valid. Both sides read these constants; the templates never carry their
//! own expiry literals.

use std::time::Duration;

/// Validity window of a token, in whole hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetime {
    hours: u32,
}

impl TokenLifetime {
    pub const fn hours(hours: u32) -> Self {
        Self { hours }
    }

    pub const fn as_hours(&self) -> u32 {
        self.hours
    }

    pub const fn as_duration(&self) -> Duration {
        Duration::from_secs(self.hours as u64 * 3600)
    }

    /// Human-readable window, e.g. `72 hours` or `1 hour`.
    pub fn describe(&self) -> String {
        if self.hours == 1 {
            "1 hour".to_string()
        } else {
            format!("{} hours", self.hours)
        }
    }
}

/// Email verification links.
pub const EMAIL_VERIFICATION_TOKEN_LIFETIME: TokenLifetime = TokenLifetime::hours(72);

/// Password reset links.
pub const PASSWORD_RESET_TOKEN_LIFETIME: TokenLifetime = TokenLifetime::hours(1);

/// Account deletion confirmation links.
pub const ACCOUNT_DELETION_TOKEN_LIFETIME: TokenLifetime = TokenLifetime::hours(24);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        assert_eq!(EMAIL_VERIFICATION_TOKEN_LIFETIME.describe(), "72 hours");
        assert_eq!(PASSWORD_RESET_TOKEN_LIFETIME.describe(), "1 hour");
        assert_eq!(ACCOUNT_DELETION_TOKEN_LIFETIME.describe(), "24 hours");
    }

    #[test]
    fn test_as_duration() {
        assert_eq!(
            PASSWORD_RESET_TOKEN_LIFETIME.as_duration(),
            Duration::from_secs(3600)
        );
        assert_eq!(ACCOUNT_DELETION_TOKEN_LIFETIME.as_hours(), 24);
    }
}
