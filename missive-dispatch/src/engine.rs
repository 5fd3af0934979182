//! One dispatch invocation: process the next slice of a running campaign.
//!
//! Recipients are handled strictly one at a time, in id order:
//! 1. Re-check the contact (deleted or unsubscribed → skipped)
//! 2. Check the idempotency ledger (already sent → skipped)
//! 3. Take a rate-limit token (none left → stop the batch here)
//! 4. Render, decorate and send with bounded retries
//! 5. Settle the recipient, then advance the cursor past it
//!
//! The cursor only ever points at a settled recipient. A batch cut short by
//! the rate limiter leaves the current recipient pending and the cursor just
//! before it.

use std::{sync::Arc, time::Duration};

use missive_common::{
    Campaign, CampaignAction, CampaignRecipient, CampaignStatus, Contact, RecipientStatus,
    SenderAccount, Template, dispatch,
    ids::{CampaignId, RecipientId},
    model::{FieldMap, RenderedContent, Settlement},
};
use missive_store::{CampaignRepository, KeyValueStore};

use crate::{
    clock::{Clock, SystemClock},
    config::DispatchConfig,
    decorate::{
        UnsubscribeLinks, append_unsubscribe_link, append_unsubscribe_text, decorate_for_branding,
    },
    error::{DispatchError, SystemError},
    ledger::IdempotencyLedger,
    lifecycle,
    metrics::DispatchMetrics,
    policy::{RetryPolicy, SendOutcome, SendStep},
    quota::{PlanLimits, QuotaService},
    rate_limiter::RateLimiter,
    template::render,
    transport::{DeliveryClient, OutboundMessage},
};

/// What one invocation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Recipients settled by this invocation
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// The batch stopped early because the owner's bucket was empty
    pub rate_limited: bool,
    /// This invocation moved the campaign to completed
    pub completed: bool,
}

impl BatchSummary {
    fn record(&mut self, status: RecipientStatus) {
        match status {
            RecipientStatus::Sent => self.sent += 1,
            RecipientStatus::Failed => self.failed += 1,
            RecipientStatus::Skipped => self.skipped += 1,
            RecipientStatus::Pending => return,
        }
        self.processed += 1;
    }
}

enum RecipientOutcome {
    Settled(RecipientStatus),
    /// An overlapping invocation settled the row first and owns its count
    Superseded(RecipientStatus),
    RateLimited,
}

/// Everything a batch needs that does not change between recipients
struct BatchContext<'a> {
    campaign: &'a Campaign,
    template: &'a Template,
    sender: &'a SenderAccount,
    plan: PlanLimits,
}

#[derive(Debug, Clone)]
pub struct DispatchEngine {
    repository: Arc<dyn CampaignRepository>,
    kv: Arc<dyn KeyValueStore>,
    transport: Arc<dyn DeliveryClient>,
    quota: Arc<dyn QuotaService>,
    clock: Arc<dyn Clock>,
    rate_limiter: RateLimiter,
    ledger: IdempotencyLedger,
    retry: RetryPolicy,
    unsubscribe: UnsubscribeLinks,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl DispatchEngine {
    #[must_use]
    pub fn new(
        repository: Arc<dyn CampaignRepository>,
        kv: Arc<dyn KeyValueStore>,
        transport: Arc<dyn DeliveryClient>,
        quota: Arc<dyn QuotaService>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let config = DispatchConfig::default();

        Self {
            rate_limiter: RateLimiter::new(kv.clone(), clock.clone()),
            ledger: IdempotencyLedger::with_ttl(kv.clone(), config.idempotency_ttl()),
            unsubscribe: UnsubscribeLinks::from(&config.unsubscribe),
            retry: config.retry,
            repository,
            kv,
            transport,
            quota,
            clock,
            metrics: None,
        }
    }

    /// Apply the tunables from `config`
    #[must_use]
    pub fn with_config(self, config: &DispatchConfig) -> Self {
        self.with_retry_policy(config.retry.clone())
            .with_idempotency_ttl(config.idempotency_ttl())
            .with_unsubscribe_links(UnsubscribeLinks::from(&config.unsubscribe))
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.rate_limiter = RateLimiter::new(self.kv.clone(), clock.clone());
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_idempotency_ttl(mut self, ttl: Duration) -> Self {
        self.ledger = IdempotencyLedger::with_ttl(self.kv.clone(), ttl);
        self
    }

    #[must_use]
    pub fn with_unsubscribe_links(mut self, links: UnsubscribeLinks) -> Self {
        self.unsubscribe = links;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub const fn ledger(&self) -> &IdempotencyLedger {
        &self.ledger
    }

    #[must_use]
    pub const fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Process up to `batch_size` pending recipients of `id`.
    ///
    /// A campaign that is not running is a no-op. A campaign with nothing
    /// left to send is completed.
    ///
    /// # Errors
    ///
    /// Missing template or sender account, an unreachable store or quota
    /// service. Recipients settled before the fault keep their status.
    #[tracing::instrument(level = "debug", skip(self), fields(campaign = %id))]
    pub async fn process_next_batch(&self, id: CampaignId) -> Result<BatchSummary, DispatchError> {
        let result = self.run_batch(id).await;

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(summary) => metrics.record_batch(summary),
                Err(_) => metrics.record_error(),
            }
        }

        result
    }

    async fn run_batch(&self, id: CampaignId) -> Result<BatchSummary, DispatchError> {
        let campaign = self
            .repository
            .campaign(id)
            .await?
            .ok_or(SystemError::CampaignNotFound(id))?;

        let mut summary = BatchSummary::default();
        if campaign.status != CampaignStatus::Running {
            dispatch!("Campaign {id} is {}, nothing to do", campaign.status);
            return Ok(summary);
        }

        let template = self
            .repository
            .template(campaign.template_id)
            .await?
            .ok_or(SystemError::TemplateMissing {
                campaign: id,
                template: campaign.template_id,
            })?;
        let sender = self
            .repository
            .sender_account(campaign.sender_account_id)
            .await?
            .ok_or(SystemError::SenderMissing {
                campaign: id,
                sender: campaign.sender_account_id,
            })?;
        let plan = self
            .quota
            .plan_limits(campaign.user_id)
            .await
            .map_err(SystemError::from)?;

        let mut cursor = self.ledger.read_cursor(id).await?;
        let limit = usize::try_from(campaign.batch_size.max(1)).unwrap_or(usize::MAX);
        let batch = self
            .repository
            .pending_recipients_after(id, cursor, limit)
            .await?;

        if batch.is_empty() {
            summary.completed = self.complete(id).await?;
            return Ok(summary);
        }

        let ctx = BatchContext {
            campaign: &campaign,
            template: &template,
            sender: &sender,
            plan,
        };

        for recipient in batch {
            match self.process_recipient(&ctx, &recipient).await? {
                RecipientOutcome::RateLimited => {
                    summary.rate_limited = true;
                    break;
                }
                RecipientOutcome::Settled(status) => {
                    summary.record(status);
                    cursor = Some(self.ledger.advance_cursor(id, recipient.id).await?);
                }
                RecipientOutcome::Superseded(status) => {
                    dispatch!("Recipient {} was already {status}, not counted", recipient.id);
                    cursor = Some(self.ledger.advance_cursor(id, recipient.id).await?);
                }
            }
        }

        // Finish in the same invocation when the batch drained the campaign
        if !summary.rate_limited
            && self
                .repository
                .pending_recipients_after(id, cursor, 1)
                .await?
                .is_empty()
        {
            summary.completed = self.complete(id).await?;
        }

        tracing::info!(
            campaign = %id,
            processed = summary.processed,
            sent = summary.sent,
            failed = summary.failed,
            skipped = summary.skipped,
            rate_limited = summary.rate_limited,
            completed = summary.completed,
            "Dispatch batch finished"
        );

        Ok(summary)
    }

    async fn process_recipient(
        &self,
        ctx: &BatchContext<'_>,
        recipient: &CampaignRecipient,
    ) -> Result<RecipientOutcome, DispatchError> {
        let campaign = ctx.campaign;

        let contact = match self.repository.contact(recipient.contact_id).await? {
            Some(contact) if contact.unsubscribed => {
                return self.skip(recipient.id, "Contact unsubscribed").await;
            }
            Some(contact) => contact,
            None => return self.skip(recipient.id, "Contact no longer exists").await,
        };

        if self
            .ledger
            .already_sent(campaign.id, contact.id, ctx.template.version)
            .await?
        {
            return self.skip(recipient.id, "Already sent").await;
        }

        if !self
            .rate_limiter
            .try_acquire(campaign.user_id, campaign.per_minute_limit)
            .await?
        {
            return Ok(RecipientOutcome::RateLimited);
        }

        let (content, message) = self.compose(ctx, &contact);

        let outcome = self.send_with_retry(ctx.sender, &message, recipient.id).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_attempts(outcome.attempts());
        }

        let settlement = match outcome {
            SendOutcome::Sent {
                message_id,
                attempts,
            } => {
                // Best effort: the marker only narrows the duplicate window
                if let Err(err) = self
                    .ledger
                    .mark_sent(campaign.id, contact.id, ctx.template.version)
                    .await
                {
                    tracing::warn!(
                        campaign = %campaign.id,
                        recipient = %recipient.id,
                        error = %err,
                        "Failed to record idempotency marker"
                    );
                }

                Settlement::Sent {
                    message_id,
                    content,
                    attempts,
                }
            }
            SendOutcome::Failed { error, attempts } => Settlement::Failed {
                error: error.to_string(),
                attempts,
            },
        };

        let sent = matches!(settlement, Settlement::Sent { .. });
        let outcome = self.settle(recipient.id, settlement).await?;

        // The message went out either way, so it counts against the plan
        if sent && let Err(err) = self.quota.increment_email_usage(campaign.user_id, 1).await {
            tracing::warn!(
                user = %campaign.user_id,
                error = %err,
                "Failed to report email usage"
            );
        }

        Ok(outcome)
    }

    fn compose(&self, ctx: &BatchContext<'_>, contact: &Contact) -> (RenderedContent, OutboundMessage) {
        let fields = render_context(contact);
        let link = self.unsubscribe.link(ctx.campaign.id, contact.id);

        let html = decorate_for_branding(
            &render(&ctx.template.html, &fields),
            ctx.plan.custom_branding,
        );
        let content = RenderedContent {
            subject: render(&ctx.template.subject, &fields),
            html: append_unsubscribe_link(&html, &link),
            text: append_unsubscribe_text(&render(&ctx.template.text, &fields), &link),
        };

        let message = OutboundMessage {
            to: contact.email.clone(),
            subject: content.subject.clone(),
            html: content.html.clone(),
            text: content.text.clone(),
            list_unsubscribe: format!("<{link}>"),
            idempotency_key: IdempotencyLedger::sent_key(
                ctx.campaign.id,
                contact.id,
                ctx.template.version,
            ),
        };

        (content, message)
    }

    async fn send_with_retry(
        &self,
        sender: &SenderAccount,
        message: &OutboundMessage,
        recipient: RecipientId,
    ) -> SendOutcome {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.transport.send(sender, message).await;

            match self.retry.step(attempt, result) {
                SendStep::Done(outcome) => return outcome,
                SendStep::RetryAfter(delay) => {
                    tracing::debug!(
                        %recipient,
                        attempt,
                        remaining = self.retry.remaining_attempts(attempt),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Retriable send failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn skip(&self, id: RecipientId, reason: &str) -> Result<RecipientOutcome, DispatchError> {
        self.settle(
            id,
            Settlement::Skipped {
                reason: reason.to_string(),
            },
        )
        .await
    }

    /// Write a terminal status against the freshest copy of the row.
    ///
    /// If an overlapping invocation settled it first, that status wins and
    /// comes back as [`RecipientOutcome::Superseded`].
    async fn settle(&self, id: RecipientId, settlement: Settlement) -> Result<RecipientOutcome, DispatchError> {
        let mut recipient = self
            .repository
            .recipient(id)
            .await?
            .ok_or_else(|| missive_store::StoreError::not_found("Recipient", id))?;

        if let Err(settled) = recipient.settle(settlement, self.clock.now()) {
            tracing::warn!(recipient = %id, status = %settled.status, "Recipient settled concurrently");
            return Ok(RecipientOutcome::Superseded(settled.status));
        }

        self.repository.update_recipient(&recipient).await?;

        tracing::info!(
            campaign = %recipient.campaign_id,
            recipient = %id,
            status = %recipient.status,
            attempts = recipient.attempts,
            error = recipient.last_error.as_deref().unwrap_or_default(),
            "Recipient settled"
        );

        Ok(RecipientOutcome::Settled(recipient.status))
    }

    /// Mark the campaign completed if it is still running.
    ///
    /// A pause issued while the batch ran wins over completion.
    async fn complete(&self, id: CampaignId) -> Result<bool, DispatchError> {
        let mut campaign = self
            .repository
            .campaign(id)
            .await?
            .ok_or(SystemError::CampaignNotFound(id))?;

        if campaign.status != CampaignStatus::Running {
            dispatch!("Campaign {id} became {} during the batch", campaign.status);
            return Ok(false);
        }

        lifecycle::apply(&mut campaign, CampaignAction::Complete, self.clock.now())?;
        self.repository.put_campaign(&campaign).await?;

        dispatch!(level = INFO, "Campaign {id} completed");
        Ok(true)
    }
}

/// Contact fields plus `email`, unless the contact already defines one
fn render_context(contact: &Contact) -> FieldMap {
    let mut fields = contact.fields.clone();
    fields
        .entry("email")
        .or_insert_with(|| serde_json::Value::String(contact.email.clone()));
    fields
}
