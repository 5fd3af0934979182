#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use missive::controller::Missive;
use missive_common::{CampaignStatus, RecipientStatus};
use missive_dispatch::{DispatchEngine, LifecycleService, SystemClock};
use missive_store::CampaignRepository;
use pretty_assertions::assert_eq;

const SAMPLE: &str = include_str!("../../missive.config.ron");

#[test]
fn test_sample_config_parses() {
    let missive: Missive = ron::from_str(SAMPLE).unwrap();

    assert_eq!(missive.dispatch.max_concurrent_campaigns, 8);
    assert_eq!(missive.dispatch.retry.max_jitter_ms, 500);
    assert_eq!(missive.seeds.len(), 1);
    assert_eq!(missive.seeds[0].contacts.len(), 3);
    assert!(missive.seeds[0].contacts[2].unsubscribed);
}

#[tokio::test]
async fn test_sample_seed_dispatches_through_log_transport() {
    let missive: Missive = ron::from_str(SAMPLE).unwrap();
    let stores = missive.store.build();
    let quota = Arc::new(missive.quota.build());

    let engine = DispatchEngine::new(
        stores.repository.clone(),
        stores.kv.clone(),
        Arc::new(missive::transport::LogTransport),
        quota.clone(),
    )
    .with_config(&missive.dispatch);
    let lifecycle = LifecycleService::new(stores.repository.clone(), quota, Arc::new(SystemClock));

    let id = missive.seeds[0]
        .install(stores.repository.as_ref(), &lifecycle, chrono::Utc::now())
        .await
        .unwrap();

    // Batch size two over two subscribed contacts drains in one invocation
    let summary = engine.process_next_batch(id).await.unwrap();
    assert_eq!(summary.sent, 2);
    assert!(summary.completed);

    let campaign = stores.repository.campaign(id).await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);

    let recipients = stores.repository.recipients(id).await.unwrap();
    assert!(recipients.iter().all(|r| r.status == RecipientStatus::Sent));
    let subject = &recipients[0].content.as_ref().unwrap().subject;
    assert_eq!(subject, "Welcome aboard, Ada");
}
