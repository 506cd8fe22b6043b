//! Message assembly.

use crate::config::ResolvedConfig;
use crate::models::EmailMessage;

/// Assembles transport-agnostic messages from resolved settings and rendered content.
pub struct MailComposer;

impl MailComposer {
    /// Build the message envelope. Pure: no I/O, no validation beyond what
    /// [`crate::config::ConfigResolver`] and the renderer already guarantee.
    pub fn compose(
        config: &ResolvedConfig,
        recipient: &str,
        subject: &str,
        html_body: String,
    ) -> EmailMessage {
        EmailMessage::new(
            config.from_address.clone(),
            config.from_name.clone(),
            recipient.to_string(),
            subject.to_string(),
            html_body,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmtpSettings;

    #[test]
    fn test_compose_copies_every_field() {
        let config = ResolvedConfig {
            from_address: "no-reply@authapi.test".to_string(),
            from_name: "AuthAPI".to_string(),
            base_url: "https://x.test".to_string(),
            smtp: SmtpSettings::new("smtp.authapi.test", 587, "mailer", "secret"),
        };

        let message = MailComposer::compose(
            &config,
            "user@example.com",
            "Subject line",
            "<p>body</p>".to_string(),
        );

        assert_eq!(message.from_address(), "no-reply@authapi.test");
        assert_eq!(message.from_name(), "AuthAPI");
        assert_eq!(message.to_address(), "user@example.com");
        assert_eq!(message.subject(), "Subject line");
        assert_eq!(message.html_body(), "<p>body</p>");
    }
}
