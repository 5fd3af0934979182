use async_trait::async_trait;
use chrono::{DateTime, Utc};
use missive_common::{
    Campaign, CampaignRecipient, CampaignStatus, Contact, ContactList, SenderAccount, Template,
    ids::{CampaignId, ContactId, ContactListId, RecipientId, SenderAccountId, TemplateId},
};

/// Row storage for campaigns and everything they reference.
///
/// Every mutation is a single-row write; the dispatch path never needs a
/// multi-row transaction.
#[async_trait]
pub trait CampaignRepository: Send + Sync + std::fmt::Debug {
    async fn campaign(&self, id: CampaignId) -> crate::Result<Option<Campaign>>;

    async fn put_campaign(&self, campaign: &Campaign) -> crate::Result<()>;

    /// All campaigns currently in `status`
    async fn campaigns_with_status(&self, status: CampaignStatus) -> crate::Result<Vec<Campaign>>;

    /// Scheduled campaigns whose `scheduled_at` is at or before `now`
    async fn due_scheduled_campaigns(&self, now: DateTime<Utc>) -> crate::Result<Vec<Campaign>>;

    async fn template(&self, id: TemplateId) -> crate::Result<Option<Template>>;

    async fn put_template(&self, template: &Template) -> crate::Result<()>;

    async fn sender_account(&self, id: SenderAccountId) -> crate::Result<Option<SenderAccount>>;

    async fn put_sender_account(&self, account: &SenderAccount) -> crate::Result<()>;

    async fn contact(&self, id: ContactId) -> crate::Result<Option<Contact>>;

    async fn put_contact(&self, contact: &Contact) -> crate::Result<()>;

    async fn delete_contact(&self, id: ContactId) -> crate::Result<()>;

    async fn put_contact_list(&self, list: &ContactList) -> crate::Result<()>;

    async fn delete_contact_list(&self, id: ContactListId) -> crate::Result<()>;

    /// Contacts of a list that still exist.
    ///
    /// `None` means the list itself is gone, which is different from an empty
    /// list.
    async fn list_contacts(&self, id: ContactListId) -> crate::Result<Option<Vec<Contact>>>;

    async fn count_recipients(&self, campaign: CampaignId) -> crate::Result<usize>;

    /// Create one pending recipient per contact, in the given order.
    ///
    /// Contacts that already have a recipient row for this campaign are
    /// ignored. Returns the number of rows created.
    async fn insert_recipients(
        &self,
        campaign: CampaignId,
        contacts: &[Contact],
    ) -> crate::Result<usize>;

    /// Pending recipients with `id > after`, ascending by id, at most `limit`
    async fn pending_recipients_after(
        &self,
        campaign: CampaignId,
        after: Option<RecipientId>,
        limit: usize,
    ) -> crate::Result<Vec<CampaignRecipient>>;

    async fn recipient(&self, id: RecipientId) -> crate::Result<Option<CampaignRecipient>>;

    async fn update_recipient(&self, recipient: &CampaignRecipient) -> crate::Result<()>;

    /// Every recipient of a campaign, ascending by id
    async fn recipients(&self, campaign: CampaignId) -> crate::Result<Vec<CampaignRecipient>>;
}
