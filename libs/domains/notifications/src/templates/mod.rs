//! Email template rendering engine.
//!
//! Each [`NotificationKind`] maps to one Handlebars asset under `templates/`
//! and the set of placeholders that asset must use. Assets are registered in
//! strict mode and validated when the engine is built, so a broken asset fails
//! at startup instead of on the first send.

use crate::encoding::TokenEncoder;
use crate::error::RenderError;
use crate::models::{NotificationKind, RenderParams};
use handlebars::Handlebars;
use serde::Serialize;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::debug;

/// A template asset and the placeholders it is declared to bind.
#[derive(Debug, Clone, Copy)]
pub struct TemplateAsset {
    pub name: &'static str,
    pub source: &'static str,
    pub placeholders: &'static [&'static str],
}

const EMAIL_VERIFICATION_TEMPLATE: TemplateAsset = TemplateAsset {
    name: "email_verification",
    source: include_str!("../../templates/email_verification.hbs"),
    placeholders: &["link", "expiry", "token_preview", "generated_at"],
};

const PASSWORD_RESET_TEMPLATE: TemplateAsset = TemplateAsset {
    name: "password_reset",
    source: include_str!("../../templates/password_reset.hbs"),
    placeholders: &["link", "expiry", "token_preview", "api_path", "generated_at"],
};

const ACCOUNT_DELETION_CONFIRMATION_TEMPLATE: TemplateAsset = TemplateAsset {
    name: "account_deletion_confirmation",
    source: include_str!("../../templates/account_deletion_confirmation.hbs"),
    placeholders: &["link", "expiry", "generated_at"],
};

const ACCOUNT_DELETION_NOTICE_TEMPLATE: TemplateAsset = TemplateAsset {
    name: "account_deletion_notice",
    source: include_str!("../../templates/account_deletion_notice.hbs"),
    placeholders: &["recipient", "generated_at"],
};

/// The asset used for `kind`.
pub const fn asset_for(kind: NotificationKind) -> &'static TemplateAsset {
    match kind {
        NotificationKind::EmailVerification => &EMAIL_VERIFICATION_TEMPLATE,
        NotificationKind::PasswordReset => &PASSWORD_RESET_TEMPLATE,
        NotificationKind::AccountDeletionConfirmation => &ACCOUNT_DELETION_CONFIRMATION_TEMPLATE,
        NotificationKind::AccountDeletionNotice => &ACCOUNT_DELETION_NOTICE_TEMPLATE,
    }
}

/// `base_url + path + "?token=" + encode(token)`.
pub fn callback_link(base_url: &str, path: &str, token: &str) -> String {
    format!(
        "{}{}?token={}",
        base_url.trim_end_matches('/'),
        path,
        TokenEncoder::encode(token)
    )
}

/// Values exposed to the templates. Absent fields stay absent so strict mode
/// catches a template that references data its kind does not provide.
#[derive(Debug, Serialize)]
struct TemplateContext<'a> {
    recipient: &'a str,
    generated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_path: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_preview: Option<String>,
}

/// Template engine for rendering notification bodies.
#[derive(Clone)]
pub struct TemplateEngine {
    handlebars: Arc<Handlebars<'static>>,
}

impl TemplateEngine {
    /// Create a new template engine with every kind's asset registered and validated.
    pub fn new() -> Result<Self, RenderError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);

        for kind in NotificationKind::iter() {
            let asset = asset_for(kind);
            validate_asset(kind, asset)?;
            handlebars
                .register_template_string(asset.name, asset.source)
                .map_err(|e| RenderError::InvalidTemplate {
                    template: asset.name,
                    details: e.to_string(),
                })?;
        }

        debug!(templates = handlebars.get_templates().len(), "Registered email templates");

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    /// Render the HTML body for `kind`.
    ///
    /// Output depends only on `(kind, params)`; the timestamp is part of
    /// `params`.
    pub fn render(
        &self,
        kind: NotificationKind,
        params: &RenderParams,
    ) -> Result<String, RenderError> {
        let profile = kind.profile();

        if params.recipient.trim().is_empty() {
            return Err(RenderError::MissingParameter {
                kind,
                parameter: "recipient",
            });
        }

        let mut context = TemplateContext {
            recipient: &params.recipient,
            generated_at: params.issued_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            link: None,
            api_path: None,
            expiry: profile.token_lifetime.map(|lifetime| lifetime.describe()),
            token_preview: None,
        };

        if let Some(path) = profile.link_path {
            let token = params
                .token
                .as_deref()
                .filter(|token| !token.is_empty())
                .ok_or(RenderError::MissingParameter {
                    kind,
                    parameter: "token",
                })?;

            if params.base_url.trim().is_empty() {
                return Err(RenderError::MissingParameter {
                    kind,
                    parameter: "base_url",
                });
            }

            context.link = Some(callback_link(&params.base_url, path, token));
            context.api_path = Some(path);
            context.token_preview = Some(TokenEncoder::preview(token));
        }

        let asset = asset_for(kind);
        debug!(kind = %kind, template = asset.name, "Rendering email template");

        self.handlebars
            .render(asset.name, &context)
            .map_err(|e| RenderError::Engine {
                kind,
                details: e.to_string(),
            })
    }
}

/// Startup checks: every declared placeholder is used by the asset, and
/// kinds without a link never carry a token parameter.
pub fn validate_asset(kind: NotificationKind, asset: &TemplateAsset) -> Result<(), RenderError> {
    for placeholder in asset.placeholders {
        let escaped = format!("{{{{{}}}}}", placeholder);
        let raw = format!("{{{{{{{}}}}}}}", placeholder);
        if !asset.source.contains(&escaped) && !asset.source.contains(&raw) {
            return Err(RenderError::InvalidTemplate {
                template: asset.name,
                details: format!("declared placeholder '{}' is not used", placeholder),
            });
        }
    }

    let has_link = asset.placeholders.contains(&"link");
    if kind.requires_token() != has_link {
        return Err(RenderError::InvalidTemplate {
            template: asset.name,
            details: format!("link placeholder does not match {} token requirement", kind),
        });
    }

    if !kind.requires_token() && asset.source.contains("token=") {
        return Err(RenderError::InvalidTemplate {
            template: asset.name,
            details: "template without a token must not contain a token parameter".to_string(),
        });
    }

    Ok(())
}
