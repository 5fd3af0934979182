//! Campaigns declared in the configuration file and loaded at startup.
//!
//! The daemon ships without an API, so seeding is how a campaign gets into
//! the in-memory stores:
//!
//! ```ron
//! seed: [
//!     (
//!         user: "01HZY3N6J8Q4V2W9X0A1B2C3D4",
//!         name: "Spring launch",
//!         sender: "news@example.com",
//!         subject: "Hello {{first_name}}",
//!         html: "<html><body><p>Hi {{first_name}}</p></body></html>",
//!         text: "Hi {{first_name}}",
//!         contacts: [
//!             (email: "ada@example.com", fields: { "first_name": "Ada" }),
//!         ],
//!         per_minute_limit: 30,
//!         start_after_secs: Some(60),
//!     ),
//! ]
//! ```

use chrono::{DateTime, Utc};
use missive_common::{
    Campaign, Contact, ContactList, SenderAccount, Template, internal,
    ids::{CampaignId, ContactListId, UserId},
    model::FieldMap,
};
use missive_dispatch::LifecycleService;
use missive_store::CampaignRepository;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SeedContact {
    pub email: String,
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default)]
    pub unsubscribed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedCampaign {
    /// Owner; a fresh user is generated when omitted
    #[serde(default = "UserId::generate")]
    pub user: UserId,
    pub name: String,
    pub sender: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub subject: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub contacts: Vec<SeedContact>,
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default)]
    pub per_minute_limit: Option<u32>,
    /// Schedule the campaign this far in the future instead of launching it
    #[serde(default)]
    pub start_after_secs: Option<u64>,
}

impl SeedCampaign {
    /// Store everything the campaign references, then launch or schedule it.
    ///
    /// # Errors
    ///
    /// Fails if a contact email repeats for the same user, the store is
    /// unreachable, or the launch is refused (for example over quota).
    pub async fn install(
        &self,
        repository: &dyn CampaignRepository,
        lifecycle: &LifecycleService,
        now: DateTime<Utc>,
    ) -> anyhow::Result<CampaignId> {
        let template = Template::new(
            self.user,
            self.name.as_str(),
            self.subject.as_str(),
            self.html.as_str(),
            self.text.as_str(),
        );
        repository.put_template(&template).await?;

        let mut sender = SenderAccount::new(self.user, self.sender.as_str());
        sender.display_name.clone_from(&self.sender_name);
        repository.put_sender_account(&sender).await?;

        let mut contact_ids = Vec::with_capacity(self.contacts.len());
        for seed in &self.contacts {
            let mut contact = Contact::new(self.user, seed.email.as_str());
            contact.fields.clone_from(&seed.fields);
            contact.unsubscribed = seed.unsubscribed;
            repository.put_contact(&contact).await?;
            contact_ids.push(contact.id);
        }

        let list = ContactList {
            id: ContactListId::generate(),
            user_id: self.user,
            name: format!("{} recipients", self.name),
            contact_ids,
        };
        repository.put_contact_list(&list).await?;

        let mut campaign = Campaign::draft(self.user, self.name.as_str(), template.id, list.id, sender.id);
        if let Some(batch_size) = self.batch_size {
            campaign = campaign.with_batch_size(batch_size);
        }
        if let Some(limit) = self.per_minute_limit {
            campaign = campaign.with_per_minute_limit(limit);
        }
        repository.put_campaign(&campaign).await?;

        match self.start_after_secs {
            Some(secs) => {
                let at = now + chrono::Duration::seconds(i64::try_from(secs)?);
                lifecycle.schedule(campaign.id, at).await?;
            }
            None => {
                lifecycle.launch(campaign.id).await?;
            }
        }

        internal!(
            level = INFO,
            "Seeded campaign {} ({}) with {} contacts",
            campaign.id,
            self.name,
            self.contacts.len()
        );

        Ok(campaign.id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use missive_common::{CampaignStatus, RecipientStatus};
    use missive_dispatch::{ManualClock, MemoryQuota, PlanLimits};
    use missive_store::MemoryRepository;
    use pretty_assertions::assert_eq;

    use super::*;

    const SEED: &str = r#"(
        name: "Spring launch",
        sender: "news@example.com",
        sender_name: Some("Newsroom"),
        subject: "Hello {{first_name}}",
        html: "<p>Hi {{first_name}}</p>",
        contacts: [
            (email: "ada@example.com", fields: { "first_name": "Ada" }),
            (email: "grace@example.com", unsubscribed: true),
        ],
        batch_size: Some(10),
    )"#;

    fn services() -> (Arc<MemoryRepository>, LifecycleService) {
        let repository = Arc::new(MemoryRepository::new());
        let lifecycle = LifecycleService::new(
            repository.clone(),
            Arc::new(MemoryQuota::new(PlanLimits::default())),
            Arc::new(ManualClock::default()),
        );
        (repository, lifecycle)
    }

    #[tokio::test]
    async fn test_seed_launches_immediately() {
        let seed: SeedCampaign = ron::from_str(SEED).unwrap();
        let (repository, lifecycle) = services();

        let id = seed
            .install(repository.as_ref(), &lifecycle, Utc::now())
            .await
            .unwrap();

        let campaign = repository.campaign(id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Running);
        assert_eq!(campaign.batch_size, 10);
        assert_eq!(campaign.per_minute_limit, Campaign::DEFAULT_PER_MINUTE_LIMIT);

        let sender = repository
            .sender_account(campaign.sender_account_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sender.from_header(), "Newsroom <news@example.com>");

        // The unsubscribed contact is never materialized
        let recipients = repository.recipients(id).await.unwrap();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].email, "ada@example.com");
        assert_eq!(recipients[0].status, RecipientStatus::Pending);
    }

    #[tokio::test]
    async fn test_seed_with_delay_is_scheduled() {
        let mut seed: SeedCampaign = ron::from_str(SEED).unwrap();
        seed.start_after_secs = Some(120);
        let (repository, lifecycle) = services();
        let now = Utc::now();

        let id = seed
            .install(repository.as_ref(), &lifecycle, now)
            .await
            .unwrap();

        let campaign = repository.campaign(id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Scheduled);
        assert_eq!(campaign.scheduled_at, Some(now + chrono::Duration::seconds(120)));
        assert!(repository.recipients(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_contact_email_is_rejected() {
        let mut seed: SeedCampaign = ron::from_str(SEED).unwrap();
        seed.contacts.push(seed.contacts[0].clone());
        let (repository, lifecycle) = services();

        assert!(
            seed.install(repository.as_ref(), &lifecycle, Utc::now())
                .await
                .is_err()
        );
    }
}
