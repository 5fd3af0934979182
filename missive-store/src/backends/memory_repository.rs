use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use missive_common::{
    Campaign, CampaignRecipient, CampaignStatus, Contact, ContactList, RecipientStatus,
    SenderAccount, Template,
    ids::{CampaignId, ContactId, ContactListId, RecipientId, SenderAccountId, TemplateId},
};
use parking_lot::RwLock;

use crate::{StoreError, repository::CampaignRepository};

#[derive(Debug, Default)]
struct Tables {
    campaigns: HashMap<CampaignId, Campaign>,
    templates: HashMap<TemplateId, Template>,
    senders: HashMap<SenderAccountId, SenderAccount>,
    contacts: HashMap<ContactId, Contact>,
    lists: HashMap<ContactListId, ContactList>,
    recipients: BTreeMap<RecipientId, CampaignRecipient>,
    by_campaign: HashMap<CampaignId, BTreeSet<RecipientId>>,
    pairs: HashSet<(CampaignId, ContactId)>,
}

/// In-memory relational store.
///
/// Recipient ids come from a single `AtomicU64` sequence so they are unique
/// and strictly increasing across all campaigns, like a database sequence.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    tables: Arc<RwLock<Tables>>,
    sequence: Arc<AtomicU64>,
    offline: Arc<AtomicBool>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            sequence: Arc::new(AtomicU64::new(1)),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`]
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> crate::Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(
                "memory repository is offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CampaignRepository for MemoryRepository {
    async fn campaign(&self, id: CampaignId) -> crate::Result<Option<Campaign>> {
        self.ensure_online()?;
        Ok(self.tables.read().campaigns.get(&id).cloned())
    }

    async fn put_campaign(&self, campaign: &Campaign) -> crate::Result<()> {
        self.ensure_online()?;
        self.tables
            .write()
            .campaigns
            .insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn campaigns_with_status(&self, status: CampaignStatus) -> crate::Result<Vec<Campaign>> {
        self.ensure_online()?;
        let mut campaigns: Vec<_> = self
            .tables
            .read()
            .campaigns
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect();
        campaigns.sort_by_key(|c| c.id);
        Ok(campaigns)
    }

    async fn due_scheduled_campaigns(&self, now: DateTime<Utc>) -> crate::Result<Vec<Campaign>> {
        self.ensure_online()?;
        let mut campaigns: Vec<_> = self
            .tables
            .read()
            .campaigns
            .values()
            .filter(|c| {
                c.status == CampaignStatus::Scheduled && c.scheduled_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        campaigns.sort_by_key(|c| c.scheduled_at);
        Ok(campaigns)
    }

    async fn template(&self, id: TemplateId) -> crate::Result<Option<Template>> {
        self.ensure_online()?;
        Ok(self.tables.read().templates.get(&id).cloned())
    }

    async fn put_template(&self, template: &Template) -> crate::Result<()> {
        self.ensure_online()?;
        self.tables
            .write()
            .templates
            .insert(template.id, template.clone());
        Ok(())
    }

    async fn sender_account(&self, id: SenderAccountId) -> crate::Result<Option<SenderAccount>> {
        self.ensure_online()?;
        Ok(self.tables.read().senders.get(&id).cloned())
    }

    async fn put_sender_account(&self, account: &SenderAccount) -> crate::Result<()> {
        self.ensure_online()?;
        self.tables
            .write()
            .senders
            .insert(account.id, account.clone());
        Ok(())
    }

    async fn contact(&self, id: ContactId) -> crate::Result<Option<Contact>> {
        self.ensure_online()?;
        Ok(self.tables.read().contacts.get(&id).cloned())
    }

    async fn put_contact(&self, contact: &Contact) -> crate::Result<()> {
        self.ensure_online()?;
        let mut tables = self.tables.write();

        if let Some(clash) = tables.contacts.values().find(|c| {
            c.id != contact.id && c.user_id == contact.user_id && c.email.eq_ignore_ascii_case(&contact.email)
        }) {
            return Err(StoreError::Internal(format!(
                "Contact email {} already used by {}",
                contact.email, clash.id
            )));
        }

        tables.contacts.insert(contact.id, contact.clone());
        Ok(())
    }

    async fn delete_contact(&self, id: ContactId) -> crate::Result<()> {
        self.ensure_online()?;
        self.tables.write().contacts.remove(&id);
        Ok(())
    }

    async fn put_contact_list(&self, list: &ContactList) -> crate::Result<()> {
        self.ensure_online()?;
        self.tables.write().lists.insert(list.id, list.clone());
        Ok(())
    }

    async fn delete_contact_list(&self, id: ContactListId) -> crate::Result<()> {
        self.ensure_online()?;
        self.tables.write().lists.remove(&id);
        Ok(())
    }

    async fn list_contacts(&self, id: ContactListId) -> crate::Result<Option<Vec<Contact>>> {
        self.ensure_online()?;
        let tables = self.tables.read();

        Ok(tables.lists.get(&id).map(|list| {
            list.contact_ids
                .iter()
                .filter_map(|contact_id| tables.contacts.get(contact_id).cloned())
                .collect()
        }))
    }

    async fn count_recipients(&self, campaign: CampaignId) -> crate::Result<usize> {
        self.ensure_online()?;
        Ok(self
            .tables
            .read()
            .by_campaign
            .get(&campaign)
            .map_or(0, BTreeSet::len))
    }

    async fn insert_recipients(
        &self,
        campaign: CampaignId,
        contacts: &[Contact],
    ) -> crate::Result<usize> {
        self.ensure_online()?;
        let mut tables = self.tables.write();
        let mut created = 0;

        for contact in contacts {
            if !tables.pairs.insert((campaign, contact.id)) {
                continue;
            }

            let id = RecipientId(self.sequence.fetch_add(1, Ordering::SeqCst));
            tables
                .recipients
                .insert(id, CampaignRecipient::pending(id, campaign, contact));
            tables.by_campaign.entry(campaign).or_default().insert(id);
            created += 1;
        }

        Ok(created)
    }

    async fn pending_recipients_after(
        &self,
        campaign: CampaignId,
        after: Option<RecipientId>,
        limit: usize,
    ) -> crate::Result<Vec<CampaignRecipient>> {
        self.ensure_online()?;
        let tables = self.tables.read();
        let Some(ids) = tables.by_campaign.get(&campaign) else {
            return Ok(Vec::new());
        };

        let range = match after {
            Some(cursor) => ids.range((std::ops::Bound::Excluded(cursor), std::ops::Bound::Unbounded)),
            None => ids.range(..),
        };

        Ok(range
            .filter_map(|id| tables.recipients.get(id))
            .filter(|r| r.status == RecipientStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn recipient(&self, id: RecipientId) -> crate::Result<Option<CampaignRecipient>> {
        self.ensure_online()?;
        Ok(self.tables.read().recipients.get(&id).cloned())
    }

    async fn update_recipient(&self, recipient: &CampaignRecipient) -> crate::Result<()> {
        self.ensure_online()?;
        let mut tables = self.tables.write();
        let Some(row) = tables.recipients.get_mut(&recipient.id) else {
            return Err(StoreError::not_found("Recipient", recipient.id));
        };
        *row = recipient.clone();
        Ok(())
    }

    async fn recipients(&self, campaign: CampaignId) -> crate::Result<Vec<CampaignRecipient>> {
        self.ensure_online()?;
        let tables = self.tables.read();
        Ok(tables
            .by_campaign
            .get(&campaign)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.recipients.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }
}
