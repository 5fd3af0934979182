//! Read-only view of campaign progress, for dashboards and exports.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use missive_common::{
    CampaignRecipient, CampaignStatus, RecipientStatus,
    ids::{CampaignId, RecipientId},
};
use missive_store::CampaignRepository;
use serde::Serialize;

use crate::{
    error::{DispatchError, SystemError},
    ledger::IdempotencyLedger,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignProgress {
    pub campaign: CampaignId,
    pub status: CampaignStatus,
    pub total: usize,
    pub pending: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Last settled recipient, if dispatch has started
    pub cursor: Option<RecipientId>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CampaignProgress {
    /// Settled recipients as a fraction of all recipients
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction_settled(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.total - self.pending) as f64 / self.total as f64
    }
}

#[derive(Debug, Clone)]
pub struct CampaignQueryService {
    repository: Arc<dyn CampaignRepository>,
    ledger: IdempotencyLedger,
}

impl CampaignQueryService {
    #[must_use]
    pub fn new(repository: Arc<dyn CampaignRepository>, ledger: IdempotencyLedger) -> Self {
        Self { repository, ledger }
    }

    /// # Errors
    ///
    /// Fails if the campaign does not exist or a store is unreachable.
    pub async fn campaign_progress(&self, id: CampaignId) -> Result<CampaignProgress, DispatchError> {
        let campaign = self
            .repository
            .campaign(id)
            .await?
            .ok_or(SystemError::CampaignNotFound(id))?;

        let recipients = self.repository.recipients(id).await?;
        let count = |status| recipients.iter().filter(|r| r.status == status).count();

        Ok(CampaignProgress {
            campaign: id,
            status: campaign.status,
            total: recipients.len(),
            pending: count(RecipientStatus::Pending),
            sent: count(RecipientStatus::Sent),
            failed: count(RecipientStatus::Failed),
            skipped: count(RecipientStatus::Skipped),
            cursor: self.ledger.read_cursor(id).await?,
            started_at: campaign.started_at,
            completed_at: campaign.completed_at,
        })
    }

    /// Recipients of a campaign in id order, optionally only those in `status`
    ///
    /// # Errors
    ///
    /// Fails if the campaign does not exist or the store is unreachable.
    pub async fn recipients(
        &self,
        id: CampaignId,
        status: Option<RecipientStatus>,
    ) -> Result<Vec<CampaignRecipient>, DispatchError> {
        if self.repository.campaign(id).await?.is_none() {
            return Err(SystemError::CampaignNotFound(id).into());
        }

        let mut recipients = self.repository.recipients(id).await?;
        if let Some(status) = status {
            recipients.retain(|r| r.status == status);
        }
        Ok(recipients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_settled() {
        let progress = CampaignProgress {
            campaign: CampaignId::generate(),
            status: CampaignStatus::Running,
            total: 4,
            pending: 1,
            sent: 2,
            failed: 0,
            skipped: 1,
            cursor: Some(RecipientId(3)),
            started_at: None,
            completed_at: None,
        };
        assert!((progress.fraction_settled() - 0.75).abs() < f64::EPSILON);

        let empty = CampaignProgress {
            total: 0,
            pending: 0,
            ..progress
        };
        assert!((empty.fraction_settled() - 1.0).abs() < f64::EPSILON);
    }
}
