//! Content decoration applied to every message right before it is sent.
//!
//! Both decorators are pure string transforms. The unsubscribe link carries a
//! SHA-256 token so the unsubscribe endpoint can tell a genuine link from a
//! guessed one without a database lookup.

use std::fmt;

use hex::encode;
use missive_common::ids::{CampaignId, ContactId};
use sha2::{Digest, Sha256};

use crate::config::UnsubscribeConfig;

const BODY_CLOSE: &str = "</body>";

/// Footer added to messages from plans without custom branding
pub const BRANDING_FOOTER: &str = concat!(
    r#"<div style="margin-top:24px;font-size:12px;color:#888;text-align:center">"#,
    "Sent with missive",
    "</div>"
);

/// Add the platform footer unless the plan pays for custom branding
#[must_use]
pub fn decorate_for_branding(html: &str, has_custom_branding: bool) -> String {
    if has_custom_branding {
        html.to_string()
    } else {
        insert_before_body_close(html, BRANDING_FOOTER)
    }
}

/// Insert an unsubscribe link before `</body>`, or at the end if there is none
#[must_use]
pub fn append_unsubscribe_link(html: &str, link: &str) -> String {
    let block = format!(
        r#"<p style="font-size:12px;color:#888;text-align:center"><a href="{link}">Unsubscribe</a></p>"#
    );
    insert_before_body_close(html, &block)
}

/// Trailing unsubscribe line for the plain-text part
#[must_use]
pub fn append_unsubscribe_text(text: &str, link: &str) -> String {
    if text.is_empty() {
        format!("Unsubscribe: {link}")
    } else if text.ends_with('\n') {
        format!("{text}\nUnsubscribe: {link}")
    } else {
        format!("{text}\n\nUnsubscribe: {link}")
    }
}

fn insert_before_body_close(html: &str, fragment: &str) -> String {
    // Last occurrence, case-insensitive; HTML tags are ASCII so byte offsets
    // line up between the original and the lowercased copy
    match html.to_ascii_lowercase().rfind(BODY_CLOSE) {
        Some(at) => {
            let mut out = String::with_capacity(html.len() + fragment.len());
            out.push_str(&html[..at]);
            out.push_str(fragment);
            out.push_str(&html[at..]);
            out
        }
        None => format!("{html}{fragment}"),
    }
}

/// Signed unsubscribe links
#[derive(Clone)]
pub struct UnsubscribeLinks {
    base_url: String,
    secret: String,
}

impl fmt::Debug for UnsubscribeLinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsubscribeLinks")
            .field("base_url", &self.base_url)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl UnsubscribeLinks {
    #[must_use]
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            secret: secret.into(),
        }
    }

    /// The link a recipient follows to unsubscribe from everything this user sends
    #[must_use]
    pub fn link(&self, campaign: CampaignId, contact: ContactId) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}campaign={campaign}&contact={contact}&token={}",
            self.base_url,
            self.token(campaign, contact)
        )
    }

    /// Hex-encoded SHA-256 over the secret and both ids
    #[must_use]
    pub fn token(&self, campaign: CampaignId, contact: ContactId) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b":");
        hasher.update(campaign.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(contact.to_string().as_bytes());
        encode(hasher.finalize())
    }

    /// Check a token presented back by the unsubscribe endpoint
    #[must_use]
    pub fn verify(&self, campaign: CampaignId, contact: ContactId, token: &str) -> bool {
        let expected = self.token(campaign, contact);
        let valid = expected.eq_ignore_ascii_case(token);

        if !valid {
            tracing::warn!(%campaign, %contact, "Rejected unsubscribe token");
        }

        valid
    }
}

impl From<&UnsubscribeConfig> for UnsubscribeLinks {
    fn from(config: &UnsubscribeConfig) -> Self {
        Self::new(config.base_url.clone(), config.secret.clone())
    }
}
