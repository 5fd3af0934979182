//! Idempotency markers and resume cursors.
//!
//! Both live in the shared key-value store:
//! - `sent:{campaign}:{contact}:{template_version}` marks a confirmed send
//! - `cursor:{campaign}` holds the id of the last settled recipient
//!
//! Neither is authoritative. Recipient status is the source of truth; the
//! marker narrows the duplicate-send window left open when a process dies
//! between a confirmed send and the status write, and the cursor only saves
//! rescanning settled rows.

use std::{sync::Arc, time::Duration};

use missive_common::ids::{CampaignId, ContactId, RecipientId};
use missive_store::KeyValueStore;

use crate::error::{DispatchError, SystemError};

/// How long markers and cursors are kept by default
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct IdempotencyLedger {
    kv: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl IdempotencyLedger {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(kv, DEFAULT_TTL)
    }

    #[must_use]
    pub fn with_ttl(kv: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// Marker key for one rendering of one message
    #[must_use]
    pub fn sent_key(campaign: CampaignId, contact: ContactId, template_version: u32) -> String {
        format!("sent:{campaign}:{contact}:{template_version}")
    }

    fn cursor_key(campaign: CampaignId) -> String {
        format!("cursor:{campaign}")
    }

    /// # Errors
    ///
    /// Fails if the key-value store is unreachable.
    pub async fn already_sent(
        &self,
        campaign: CampaignId,
        contact: ContactId,
        template_version: u32,
    ) -> Result<bool, DispatchError> {
        let key = Self::sent_key(campaign, contact, template_version);
        Ok(self.kv.get(&key).await?.is_some())
    }

    /// # Errors
    ///
    /// Fails if the key-value store is unreachable.
    pub async fn mark_sent(
        &self,
        campaign: CampaignId,
        contact: ContactId,
        template_version: u32,
    ) -> Result<(), DispatchError> {
        let key = Self::sent_key(campaign, contact, template_version);
        self.kv.set(&key, "1".to_string(), Some(self.ttl)).await?;
        Ok(())
    }

    /// The last settled recipient of `campaign`, if any
    ///
    /// # Errors
    ///
    /// Fails if the key-value store is unreachable or the stored value is not
    /// a recipient id.
    pub async fn read_cursor(&self, campaign: CampaignId) -> Result<Option<RecipientId>, DispatchError> {
        let key = Self::cursor_key(campaign);
        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(None);
        };

        raw.parse::<RecipientId>().map(Some).map_err(|err| {
            SystemError::CorruptState {
                key,
                reason: err.to_string(),
            }
            .into()
        })
    }

    /// Move the cursor forward to `to`.
    ///
    /// A cursor already at or past `to` is left alone, so a late or duplicate
    /// invocation can never move it backwards. Returns the cursor in effect.
    ///
    /// # Errors
    ///
    /// Fails if the key-value store is unreachable.
    pub async fn advance_cursor(
        &self,
        campaign: CampaignId,
        to: RecipientId,
    ) -> Result<RecipientId, DispatchError> {
        if let Some(current) = self.read_cursor(campaign).await?
            && current >= to
        {
            return Ok(current);
        }

        self.kv
            .set(&Self::cursor_key(campaign), to.to_string(), Some(self.ttl))
            .await?;
        Ok(to)
    }
}
