//! The periodic trigger that drives running campaigns forward.
//!
//! Each tick promotes due scheduled campaigns, then invokes the engine once
//! per running campaign. Campaigns are processed in parallel, but a campaign
//! that still has a batch in flight is never invoked a second time.

use std::{sync::Arc, time::Duration};

use dashmap::DashSet;
use missive_common::{CampaignStatus, Signal, internal, ids::CampaignId};
use missive_store::CampaignRepository;
use tokio::{sync::broadcast, task::JoinSet};

use crate::{
    config::DispatchConfig,
    engine::{BatchSummary, DispatchEngine},
    error::DispatchError,
    lifecycle::LifecycleService,
};

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Scheduled campaigns that started running
    pub activated: usize,
    /// Engine invocations that returned normally
    pub dispatched: usize,
    /// Campaigns completed during this tick
    pub completed: usize,
    /// Engine invocations that returned an error
    pub failed: usize,
    /// Running campaigns left alone because a batch was still in flight
    pub busy: usize,
}

/// Removes a campaign from the in-flight set when its task ends, however it ends
struct InFlight {
    set: Arc<DashSet<CampaignId>>,
    id: CampaignId,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

#[derive(Debug)]
pub struct DispatchScheduler {
    engine: Arc<DispatchEngine>,
    lifecycle: LifecycleService,
    repository: Arc<dyn CampaignRepository>,
    tick_interval: Duration,
    max_concurrent_campaigns: usize,
    in_flight: Arc<DashSet<CampaignId>>,
}

impl DispatchScheduler {
    #[must_use]
    pub fn new(
        engine: Arc<DispatchEngine>,
        lifecycle: LifecycleService,
        repository: Arc<dyn CampaignRepository>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            engine,
            lifecycle,
            repository,
            tick_interval: config.tick_interval(),
            max_concurrent_campaigns: config.max_concurrent_campaigns.max(1),
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Run one trigger cycle.
    ///
    /// Engine errors are logged and counted, never returned.
    ///
    /// # Errors
    ///
    /// Fails if the running campaigns cannot be listed.
    pub async fn tick(&self) -> Result<TickReport, DispatchError> {
        let mut report = TickReport::default();

        match self.lifecycle.activate_due().await {
            Ok(activated) => report.activated = activated.len(),
            Err(err) => tracing::error!(error = %err, "Failed to activate scheduled campaigns"),
        }

        let running = self
            .repository
            .campaigns_with_status(CampaignStatus::Running)
            .await?;

        let mut ready = Vec::with_capacity(running.len());
        for campaign in running {
            if self.in_flight.insert(campaign.id) {
                ready.push(InFlight {
                    set: Arc::clone(&self.in_flight),
                    id: campaign.id,
                });
            } else {
                tracing::debug!(campaign = %campaign.id, "Batch still in flight, skipping");
                report.busy += 1;
            }
        }

        if ready.is_empty() {
            return Ok(report);
        }

        tracing::debug!(
            campaigns = ready.len(),
            max_concurrent = self.max_concurrent_campaigns,
            "Dispatching running campaigns"
        );

        let mut join_set = JoinSet::new();
        let mut ready = ready.into_iter();

        for guard in ready.by_ref().take(self.max_concurrent_campaigns) {
            self.spawn(&mut join_set, guard);
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_, Ok(summary))) => {
                    report.dispatched += 1;
                    if summary.completed {
                        report.completed += 1;
                    }
                }
                Ok((id, Err(err))) => {
                    report.failed += 1;
                    tracing::error!(
                        campaign = %id,
                        error = %err,
                        transient = err.is_transient(),
                        "Dispatch invocation failed"
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(error = %err, "Dispatch task panicked or was cancelled");
                }
            }

            if let Some(guard) = ready.next() {
                self.spawn(&mut join_set, guard);
            }
        }

        Ok(report)
    }

    fn spawn(
        &self,
        join_set: &mut JoinSet<(CampaignId, Result<BatchSummary, DispatchError>)>,
        guard: InFlight,
    ) {
        let engine = Arc::clone(&self.engine);
        join_set.spawn(async move {
            let id = guard.id;
            let result = engine.process_next_batch(id).await;
            drop(guard);
            (id, result)
        });
    }

    /// Tick until a shutdown signal arrives.
    ///
    /// A tick that is underway when the signal arrives runs to completion
    /// first, so no batch is abandoned halfway.
    ///
    /// # Errors
    ///
    /// Currently infallible; failed ticks are logged and the loop carries on.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), DispatchError> {
        internal!(
            level = INFO,
            "Dispatch scheduler starting (tick every {}s, {} campaigns in parallel)",
            self.tick_interval.as_secs(),
            self.max_concurrent_campaigns
        );

        let mut timer = tokio::time::interval(self.tick_interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match self.tick().await {
                        Ok(report) if report == TickReport::default() => {
                            tracing::trace!("Dispatch tick, nothing running");
                        }
                        Ok(report) => {
                            tracing::debug!(
                                activated = report.activated,
                                dispatched = report.dispatched,
                                completed = report.completed,
                                failed = report.failed,
                                busy = report.busy,
                                "Dispatch tick finished"
                            );
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "Dispatch tick failed");
                        }
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!(level = INFO, "Dispatch scheduler received shutdown signal");
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "Dispatch scheduler shutdown channel error");
                        }
                    }
                    break;
                }
            }
        }

        internal!(level = INFO, "Dispatch scheduler shutdown complete");
        Ok(())
    }
}
