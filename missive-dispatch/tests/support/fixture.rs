//! Wiring for dispatch scenarios against the in-memory stores
//!
//! Time only moves when a test advances the shared [`ManualClock`], and the
//! retry policy never sleeps, so every scenario is deterministic.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use chrono::Utc;
use missive_common::{
    Campaign, CampaignRecipient, Contact, ContactList, SenderAccount, Template,
    ids::{CampaignId, ContactListId, UserId},
};
use missive_dispatch::{
    CampaignProgress, CampaignQueryService, DispatchConfig, DispatchEngine, DispatchScheduler,
    LifecycleService, ManualClock, MemoryQuota, PlanLimits, RetryPolicy,
};
use missive_store::{CampaignRepository, KeyValueStore, MemoryKeyValueStore, MemoryRepository};

use super::transport::ScriptedTransport;

pub struct Harness {
    pub repository: Arc<MemoryRepository>,
    pub kv: Arc<MemoryKeyValueStore>,
    pub quota: Arc<MemoryQuota>,
    pub clock: ManualClock,
    pub transport: Arc<ScriptedTransport>,
    pub engine: Arc<DispatchEngine>,
    pub lifecycle: LifecycleService,
    pub query: CampaignQueryService,
    pub user: UserId,
    seeds: AtomicUsize,
}

/// A draft campaign and everything it references, already stored
pub struct Seeded {
    pub campaign: CampaignId,
    pub list: ContactListId,
    pub template: Template,
    pub sender: SenderAccount,
    pub contacts: Vec<Contact>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_transport(ScriptedTransport::succeeding())
    }

    pub fn with_transport(transport: Arc<ScriptedTransport>) -> Self {
        Self::build(transport, PlanLimits::default())
    }

    pub fn build(transport: Arc<ScriptedTransport>, plan: PlanLimits) -> Self {
        let repository = Arc::new(MemoryRepository::new());
        let kv = Arc::new(MemoryKeyValueStore::new());
        let quota = Arc::new(MemoryQuota::new(plan));
        let clock = ManualClock::new(Utc::now());

        let engine = DispatchEngine::new(
            repository.clone(),
            kv.clone(),
            transport.clone(),
            quota.clone(),
        )
        .with_clock(Arc::new(clock.clone()))
        .with_retry_policy(RetryPolicy::immediate(5));

        let lifecycle =
            LifecycleService::new(repository.clone(), quota.clone(), Arc::new(clock.clone()));
        let query = CampaignQueryService::new(repository.clone(), engine.ledger().clone());

        Self {
            repository,
            kv,
            quota,
            clock,
            transport,
            engine: Arc::new(engine),
            lifecycle,
            query,
            user: UserId::generate(),
            seeds: AtomicUsize::new(0),
        }
    }

    pub fn scheduler(&self, config: &DispatchConfig) -> DispatchScheduler {
        DispatchScheduler::new(
            self.engine.clone(),
            self.lifecycle.clone(),
            self.repository.clone(),
            config,
        )
    }

    /// Store a template, sender, `contacts` contacts in one list and a draft
    /// campaign over them
    pub async fn seed(&self, contacts: usize, batch_size: u32, per_minute_limit: u32) -> Seeded {
        let template = Template::new(
            self.user,
            "Welcome",
            "Hello {{first_name}}",
            "<html><body><p>Hi {{first_name}} from {{company.name}}</p></body></html>",
            "Hi {{first_name}}",
        );
        self.repository.put_template(&template).await.unwrap();

        let sender = SenderAccount::new(self.user, "news@example.com");
        self.repository.put_sender_account(&sender).await.unwrap();

        // Emails stay unique per user across several seeded campaigns
        let seed = self.seeds.fetch_add(1, Ordering::SeqCst);
        let mut stored = Vec::with_capacity(contacts);
        for n in 0..contacts {
            let contact = Contact::new(self.user, format!("contact{n}@list{seed}.example.com"))
                .with_field("first_name", format!("Contact{n}"))
                .with_field("company", serde_json::json!({ "name": "Acme" }));
            self.repository.put_contact(&contact).await.unwrap();
            stored.push(contact);
        }

        let list = ContactList {
            id: ContactListId::generate(),
            user_id: self.user,
            name: "Everyone".to_string(),
            contact_ids: stored.iter().map(|c| c.id).collect(),
        };
        self.repository.put_contact_list(&list).await.unwrap();

        let campaign = Campaign::draft(self.user, "Launch", template.id, list.id, sender.id)
            .with_batch_size(batch_size)
            .with_per_minute_limit(per_minute_limit);
        self.repository.put_campaign(&campaign).await.unwrap();

        Seeded {
            campaign: campaign.id,
            list: list.id,
            template,
            sender,
            contacts: stored,
        }
    }

    /// Seed and launch in one go
    pub async fn running(&self, contacts: usize, batch_size: u32, per_minute_limit: u32) -> Seeded {
        let seeded = self.seed(contacts, batch_size, per_minute_limit).await;
        self.lifecycle.launch(seeded.campaign).await.unwrap();
        seeded
    }

    pub async fn campaign(&self, id: CampaignId) -> Campaign {
        self.repository.campaign(id).await.unwrap().unwrap()
    }

    pub async fn recipients(&self, id: CampaignId) -> Vec<CampaignRecipient> {
        self.repository.recipients(id).await.unwrap()
    }

    pub async fn progress(&self, id: CampaignId) -> CampaignProgress {
        self.query.campaign_progress(id).await.unwrap()
    }

    pub async fn unsubscribe(&self, contact: &Contact) {
        let mut contact = contact.clone();
        contact.unsubscribed = true;
        self.repository.put_contact(&contact).await.unwrap();
    }

    pub async fn kv_get(&self, key: &str) -> Option<String> {
        self.kv.get(key).await.unwrap()
    }
}
