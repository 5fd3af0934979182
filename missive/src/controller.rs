use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};

use missive_common::{Signal, internal, ids::UserId, logging};
use missive_dispatch::{
    DispatchConfig, DispatchEngine, DispatchMetrics, DispatchScheduler, LifecycleService,
    MemoryQuota, PlanLimits, SystemClock,
};
use missive_store::StoreConfig;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::{seed::SeedCampaign, transport::LogTransport};

/// Plan table for the in-process quota service
///
/// ```ron
/// quota: (
///     default_plan: (emails_per_month: 1000, custom_branding: false),
///     plans: {
///         "01HZY3N6J8Q4V2W9X0A1B2C3D4": (emails_per_month: 50000, custom_branding: true),
///     },
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct QuotaConfig {
    #[serde(default)]
    pub default_plan: PlanLimits,
    #[serde(default)]
    pub plans: HashMap<UserId, PlanLimits>,
}

impl QuotaConfig {
    #[must_use]
    pub fn build(&self) -> MemoryQuota {
        let quota = MemoryQuota::new(self.default_plan);
        for (user, plan) in &self.plans {
            quota.set_plan(*user, *plan);
        }
        quota
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Missive {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(alias = "seed", default)]
    pub seeds: Vec<SeedCampaign>,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

impl Missive {
    /// Run the dispatcher until it is told to stop
    ///
    /// # Errors
    ///
    /// This function will return an error if a seeded campaign cannot be
    /// installed, the signal handlers cannot be registered, or the scheduler
    /// stops on its own with an error.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        internal!(level = INFO, "Controller running");

        let stores = self.store.build();
        let quota = Arc::new(self.quota.build());
        let clock = Arc::new(SystemClock);

        let engine = DispatchEngine::new(
            stores.repository.clone(),
            stores.kv.clone(),
            Arc::new(LogTransport),
            quota.clone(),
        )
        .with_config(&self.dispatch)
        .with_metrics(Arc::new(DispatchMetrics::new()));

        let lifecycle = LifecycleService::new(stores.repository.clone(), quota, clock);

        let now = chrono::Utc::now();
        for seed in &self.seeds {
            seed.install(stores.repository.as_ref(), &lifecycle, now)
                .await?;
        }

        let scheduler = Arc::new(DispatchScheduler::new(
            Arc::new(engine),
            lifecycle,
            stores.repository,
            &self.dispatch,
        ));

        let mut serving = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            let receiver = SHUTDOWN_BROADCAST.subscribe();
            async move { scheduler.serve(receiver).await }
        });

        tokio::select! {
            joined = &mut serving => {
                // The scheduler only returns early if something went badly wrong
                joined??;
                return Ok(());
            }
            r = shutdown() => {
                r?;
            }
        };

        internal!(level = INFO, "Shutting down...");

        let timeout = self.dispatch.shutdown_timeout();
        tokio::select! {
            joined = tokio::time::timeout(timeout, &mut serving) => {
                if let Ok(joined) = joined {
                    joined??;
                } else {
                    tracing::warn!(
                        "In-flight batches did not finish within {}s, abandoning them",
                        timeout.as_secs()
                    );
                    serving.abort();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                internal!(level = WARN, "Forced shutdown");
                serving.abort();
            }
        }

        Ok(())
    }
}
