//! Typed error handling for dispatch and lifecycle operations.
//!
//! Dispatch distinguishes between:
//! - engine-level faults ([`DispatchError`]) that abort a whole invocation
//! - per-recipient transport failures ([`crate::TransportError`]) that only
//!   settle one recipient and never surface here
//!
//! Rate limiting and unsubscribed contacts are not errors at all.

use chrono::{DateTime, Utc};
use missive_common::{
    LifecycleError,
    ids::{CampaignId, ContactListId, SenderAccountId, TemplateId},
};
use missive_store::StoreError;
use thiserror::Error;

use crate::quota::QuotaError;

/// Failure of a dispatch invocation.
///
/// Recipients settled before the fault keep their status and the cursor
/// never points past an unsettled recipient.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Something the campaign depends on is missing or unusable.
    #[error("System error: {0}")]
    System(#[from] SystemError),

    /// The key-value or relational store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The campaign changed state underneath the invocation.
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    #[error("Template {template} for campaign {campaign} is missing")]
    TemplateMissing {
        campaign: CampaignId,
        template: TemplateId,
    },

    #[error("Sender account {sender} for campaign {campaign} is missing")]
    SenderMissing {
        campaign: CampaignId,
        sender: SenderAccountId,
    },

    /// A key-value entry could not be decoded.
    #[error("Corrupt state at {key}: {reason}")]
    CorruptState { key: String, reason: String },

    #[error("Quota service error: {0}")]
    Quota(#[from] QuotaError),
}

impl DispatchError {
    /// Returns `true` if retrying the invocation later may succeed without
    /// operator intervention.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::Unavailable(_)) | Self::System(SystemError::Quota(_))
        )
    }
}

/// Failure of a user-driven lifecycle request (launch, schedule, pause).
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("Campaign not found: {0}")]
    NotFound(CampaignId),

    #[error("Conflict: {0}")]
    Conflict(#[from] LifecycleError),

    /// The contact list was deleted, so no recipients can be derived.
    #[error("Contact list {0} no longer exists")]
    ContactSourceMissing(ContactListId),

    #[error("Quota exceeded: {reason}")]
    QuotaExceeded { reason: String },

    #[error("Scheduled time {0} is not in the future")]
    ScheduleInPast(DateTime<Utc>),

    #[error("Quota service error: {0}")]
    Quota(#[from] QuotaError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CampaignError {
    /// Returns `true` for errors the caller cannot fix by retrying the same
    /// request.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::ContactSourceMissing(_) | Self::ScheduleInPast(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use missive_common::{CampaignAction, CampaignStatus};

    use super::*;

    #[test]
    fn test_store_outage_is_transient() {
        let err = DispatchError::from(StoreError::Unavailable("down".to_string()));
        assert!(err.is_transient());

        let err = DispatchError::from(SystemError::TemplateMissing {
            campaign: CampaignId::generate(),
            template: TemplateId::generate(),
        });
        assert!(!err.is_transient());
    }

    #[test]
    fn test_conflict_names_current_status() {
        let err = CampaignError::from(LifecycleError::Conflict {
            current: CampaignStatus::Completed,
            action: CampaignAction::Launch,
        });
        assert_eq!(
            err.to_string(),
            "Conflict: Cannot launch a campaign that is completed"
        );
        assert!(!err.is_terminal());
    }

    #[test]
    fn test_missing_contact_source_is_terminal() {
        let err = CampaignError::ContactSourceMissing(ContactListId::generate());
        assert!(err.is_terminal());
    }
}
