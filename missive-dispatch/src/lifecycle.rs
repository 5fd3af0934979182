//! Side-effecting half of the campaign lifecycle.
//!
//! The pure transition table lives on [`CampaignStatus`]; this service adds
//! the quota gate, recipient materialization and timestamps around it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use missive_common::{
    Campaign, CampaignAction, CampaignStatus, LifecycleError, internal,
    ids::CampaignId,
    traits::fsm::FiniteStateMachine,
};
use missive_store::CampaignRepository;

use crate::{clock::Clock, error::CampaignError, quota::QuotaService};

/// Apply `action` to `campaign` in place, stamping the lifecycle timestamps.
///
/// `started_at` is only set on the first entry into running, so a paused and
/// relaunched campaign keeps its original start time.
pub(crate) fn apply(
    campaign: &mut Campaign,
    action: CampaignAction,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    let next = campaign.status.transition(action)?;

    if next == CampaignStatus::Running && campaign.started_at.is_none() {
        campaign.started_at = Some(now);
    }
    if next == CampaignStatus::Completed {
        campaign.completed_at = Some(now);
    }

    campaign.status = next;
    campaign.updated_at = now;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LifecycleService {
    repository: Arc<dyn CampaignRepository>,
    quota: Arc<dyn QuotaService>,
    clock: Arc<dyn Clock>,
}

impl LifecycleService {
    #[must_use]
    pub fn new(
        repository: Arc<dyn CampaignRepository>,
        quota: Arc<dyn QuotaService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            quota,
            clock,
        }
    }

    async fn load(&self, id: CampaignId) -> Result<Campaign, CampaignError> {
        self.repository
            .campaign(id)
            .await?
            .ok_or(CampaignError::NotFound(id))
    }

    /// Arrange for a draft campaign to start at `at`.
    ///
    /// # Errors
    ///
    /// Fails if the campaign is not a draft or `at` is not in the future.
    pub async fn schedule(&self, id: CampaignId, at: DateTime<Utc>) -> Result<Campaign, CampaignError> {
        let mut campaign = self.load(id).await?;
        let now = self.clock.now();

        campaign.status.transition(CampaignAction::Schedule)?;
        if at <= now {
            return Err(CampaignError::ScheduleInPast(at));
        }

        apply(&mut campaign, CampaignAction::Schedule, now)?;
        campaign.scheduled_at = Some(at);
        self.repository.put_campaign(&campaign).await?;

        internal!(level = INFO, "Campaign {id} scheduled for {at}");
        Ok(campaign)
    }

    /// Start (or resume) sending a draft or paused campaign.
    ///
    /// The first launch creates one pending recipient per subscribed contact,
    /// after checking the owner's quota covers all of them.
    ///
    /// # Errors
    ///
    /// Fails with [`CampaignError::Conflict`] from any other status,
    /// [`CampaignError::ContactSourceMissing`] if the contact list is gone and
    /// [`CampaignError::QuotaExceeded`] if the plan cannot cover the send.
    pub async fn launch(&self, id: CampaignId) -> Result<Campaign, CampaignError> {
        self.start(id, CampaignAction::Launch).await
    }

    /// Stop dispatching a running campaign. Recipients keep their status.
    ///
    /// # Errors
    ///
    /// Fails with [`CampaignError::Conflict`] unless the campaign is running.
    pub async fn pause(&self, id: CampaignId) -> Result<Campaign, CampaignError> {
        let mut campaign = self.load(id).await?;
        apply(&mut campaign, CampaignAction::Pause, self.clock.now())?;
        self.repository.put_campaign(&campaign).await?;

        internal!(level = INFO, "Campaign {id} paused");
        Ok(campaign)
    }

    /// Promote every scheduled campaign whose start time has passed.
    ///
    /// A campaign that cannot be started stays scheduled and is retried on the
    /// next call. Returns the ids that are now running.
    ///
    /// # Errors
    ///
    /// Fails only if the due campaigns cannot be listed.
    pub async fn activate_due(&self) -> Result<Vec<CampaignId>, CampaignError> {
        let due = self
            .repository
            .due_scheduled_campaigns(self.clock.now())
            .await?;

        let mut activated = Vec::with_capacity(due.len());
        for campaign in due {
            match self.start(campaign.id, CampaignAction::Activate).await {
                Ok(_) => activated.push(campaign.id),
                Err(err) => tracing::warn!(
                    campaign = %campaign.id,
                    error = %err,
                    "Scheduled campaign could not be started"
                ),
            }
        }

        Ok(activated)
    }

    async fn start(&self, id: CampaignId, action: CampaignAction) -> Result<Campaign, CampaignError> {
        let mut campaign = self.load(id).await?;

        // Reject illegal transitions before touching quota or recipients
        campaign.status.transition(action)?;

        if self.repository.count_recipients(id).await? == 0 {
            let created = self.materialize(&campaign).await?;
            internal!(level = INFO, "Campaign {id} materialized {created} recipients");
        }

        apply(&mut campaign, action, self.clock.now())?;
        self.repository.put_campaign(&campaign).await?;

        internal!(level = INFO, "Campaign {id} is running ({action})");
        Ok(campaign)
    }

    async fn materialize(&self, campaign: &Campaign) -> Result<usize, CampaignError> {
        let contacts = self
            .repository
            .list_contacts(campaign.contact_list_id)
            .await?
            .ok_or(CampaignError::ContactSourceMissing(campaign.contact_list_id))?;

        let candidates: Vec<_> = contacts
            .into_iter()
            .filter(|contact| !contact.unsubscribed)
            .collect();

        let count = u64::try_from(candidates.len()).unwrap_or(u64::MAX);
        let decision = self
            .quota
            .can_send_emails(campaign.user_id, count)
            .await?;
        if !decision.allowed {
            return Err(CampaignError::QuotaExceeded {
                reason: decision
                    .reason
                    .unwrap_or_else(|| "monthly email quota exceeded".to_string()),
            });
        }

        Ok(self
            .repository
            .insert_recipients(campaign.id, &candidates)
            .await?)
    }
}
