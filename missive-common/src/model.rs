//! Campaign domain model
//!
//! These are the rows the dispatch engine reads and writes. Everything that
//! mutates a recipient goes through [`CampaignRecipient::settle`], which is
//! the only place a recipient leaves `Pending`.

use core::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{
    CampaignId, ContactId, ContactListId, RecipientId, SenderAccountId, TemplateId, UserId,
};

/// Contact fields, an arbitrary JSON object so templates can address nested
/// values with dotted paths.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Running,
    Paused,
    Completed,
}

impl CampaignStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

impl Display for CampaignStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Failed,
    Skipped,
}

impl RecipientStatus {
    /// Sent, failed and skipped are terminal
    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl Display for RecipientStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub user_id: UserId,
    pub name: String,
    pub template_id: TemplateId,
    pub contact_list_id: ContactListId,
    pub sender_account_id: SenderAccountId,
    pub status: CampaignStatus,
    /// Maximum recipients processed by a single dispatch invocation
    pub batch_size: u32,
    /// Send-rate ceiling, shared by every campaign of the same user
    pub per_minute_limit: u32,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub const DEFAULT_BATCH_SIZE: u32 = 50;
    pub const DEFAULT_PER_MINUTE_LIMIT: u32 = 60;

    /// Create a draft campaign with default throughput settings
    #[must_use]
    pub fn draft(
        user_id: UserId,
        name: impl Into<String>,
        template_id: TemplateId,
        contact_list_id: ContactListId,
        sender_account_id: SenderAccountId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CampaignId::generate(),
            user_id,
            name: name.into(),
            template_id,
            contact_list_id,
            sender_account_id,
            status: CampaignStatus::Draft,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            per_minute_limit: Self::DEFAULT_PER_MINUTE_LIMIT,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub const fn with_per_minute_limit(mut self, per_minute_limit: u32) -> Self {
        self.per_minute_limit = per_minute_limit;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub user_id: UserId,
    /// Unique per owning user
    pub email: String,
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default)]
    pub unsubscribed: bool,
}

impl Contact {
    #[must_use]
    pub fn new(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            id: ContactId::generate(),
            user_id,
            email: email.into(),
            fields: FieldMap::new(),
            unsubscribed: false,
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactList {
    pub id: ContactListId,
    pub user_id: UserId,
    pub name: String,
    pub contact_ids: Vec<ContactId>,
}

/// A versioned email template.
///
/// `version` increases on every edit and is part of the idempotency key, so a
/// re-render after an edit is a distinct send while a repeat of the same
/// rendering is suppressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub user_id: UserId,
    pub name: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub version: u32,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    #[must_use]
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        subject: impl Into<String>,
        html: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: TemplateId::generate(),
            user_id,
            name: name.into(),
            subject: subject.into(),
            html: html.into(),
            text: text.into(),
            version: 1,
            updated_at: Utc::now(),
        }
    }

    /// Replace the content and bump the version
    pub fn edit(
        &mut self,
        subject: impl Into<String>,
        html: impl Into<String>,
        text: impl Into<String>,
    ) {
        self.subject = subject.into();
        self.html = html.into();
        self.text = text.into();
        self.version = self.version.saturating_add(1);
        self.updated_at = Utc::now();
    }
}

/// A connected mailbox that messages are sent from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderAccount {
    pub id: SenderAccountId,
    pub user_id: UserId,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl SenderAccount {
    #[must_use]
    pub fn new(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            id: SenderAccountId::generate(),
            user_id,
            email: email.into(),
            display_name: None,
        }
    }

    /// `"Name <addr>"` when a display name is set, otherwise the bare address
    #[must_use]
    pub fn from_header(&self) -> String {
        self.display_name.as_ref().map_or_else(
            || self.email.clone(),
            |name| format!("{name} <{}>", self.email),
        )
    }
}

/// Rendered subject/html/text as it was handed to the transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedContent {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Terminal outcome for a recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Sent {
        message_id: String,
        content: RenderedContent,
        attempts: u32,
    },
    Failed {
        error: String,
        attempts: u32,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Recipient {id} is already {status}")]
pub struct AlreadySettled {
    pub id: RecipientId,
    pub status: RecipientStatus,
}

/// One campaign x contact unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRecipient {
    pub id: RecipientId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    /// Address at materialization time, kept for audit after contact deletion
    pub email: String,
    pub status: RecipientStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub provider_message_id: Option<String>,
    pub content: Option<RenderedContent>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CampaignRecipient {
    #[must_use]
    pub fn pending(id: RecipientId, campaign_id: CampaignId, contact: &Contact) -> Self {
        Self {
            id,
            campaign_id,
            contact_id: contact.id,
            email: contact.email.clone(),
            status: RecipientStatus::Pending,
            attempts: 0,
            last_error: None,
            provider_message_id: None,
            content: None,
            last_attempt_at: None,
            created_at: Utc::now(),
        }
    }

    /// Move this recipient to a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadySettled`] if the recipient has already left `Pending`;
    /// statuses never move backwards or sideways.
    pub fn settle(&mut self, settlement: Settlement, at: DateTime<Utc>) -> Result<(), AlreadySettled> {
        if self.status.is_settled() {
            return Err(AlreadySettled {
                id: self.id,
                status: self.status,
            });
        }

        match settlement {
            Settlement::Sent {
                message_id,
                content,
                attempts,
            } => {
                self.status = RecipientStatus::Sent;
                self.provider_message_id = Some(message_id);
                self.content = Some(content);
                self.attempts = self.attempts.saturating_add(attempts);
                self.last_error = None;
                self.last_attempt_at = Some(at);
            }
            Settlement::Failed { error, attempts } => {
                self.status = RecipientStatus::Failed;
                self.attempts = self.attempts.saturating_add(attempts);
                self.last_error = Some(error);
                self.last_attempt_at = Some(at);
            }
            Settlement::Skipped { reason } => {
                self.status = RecipientStatus::Skipped;
                self.last_error = Some(reason);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn recipient() -> CampaignRecipient {
        let contact = Contact::new(UserId::generate(), "ada@example.com");
        CampaignRecipient::pending(RecipientId(1), CampaignId::generate(), &contact)
    }

    #[test]
    fn test_settle_sent_records_snapshot() {
        let mut r = recipient();
        let content = RenderedContent {
            subject: "Hi".to_string(),
            html: "<p>Hi</p>".to_string(),
            text: "Hi".to_string(),
        };

        r.settle(
            Settlement::Sent {
                message_id: "msg-1".to_string(),
                content: content.clone(),
                attempts: 2,
            },
            Utc::now(),
        )
        .unwrap();

        assert_eq!(r.status, RecipientStatus::Sent);
        assert_eq!(r.provider_message_id.as_deref(), Some("msg-1"));
        assert_eq!(r.content, Some(content));
        assert_eq!(r.attempts, 2);
        assert!(r.last_attempt_at.is_some());
    }

    #[test]
    fn test_settle_is_one_way() {
        let mut r = recipient();
        r.settle(
            Settlement::Skipped {
                reason: "unsubscribed".to_string(),
            },
            Utc::now(),
        )
        .unwrap();

        let err = r
            .settle(
                Settlement::Failed {
                    error: "boom".to_string(),
                    attempts: 1,
                },
                Utc::now(),
            )
            .unwrap_err();

        assert_eq!(err.status, RecipientStatus::Skipped);
        assert_eq!(r.status, RecipientStatus::Skipped);
        assert_eq!(r.attempts, 0);
    }

    #[test]
    fn test_template_edit_bumps_version() {
        let mut template = Template::new(UserId::generate(), "welcome", "Hi", "<p>Hi</p>", "Hi");
        assert_eq!(template.version, 1);

        template.edit("Hello", "<p>Hello</p>", "Hello");
        assert_eq!(template.version, 2);
        assert_eq!(template.subject, "Hello");
    }

    #[test]
    fn test_sender_from_header() {
        let mut sender = SenderAccount::new(UserId::generate(), "news@example.com");
        assert_eq!(sender.from_header(), "news@example.com");

        sender.display_name = Some("Example News".to_string());
        assert_eq!(sender.from_header(), "Example News <news@example.com>");
    }

    #[test]
    fn test_status_display_is_snake_case() {
        assert_eq!(CampaignStatus::Running.to_string(), "running");
        assert_eq!(RecipientStatus::Skipped.to_string(), "skipped");
        assert!(!RecipientStatus::Pending.is_settled());
        assert!(RecipientStatus::Failed.is_settled());
    }
}
