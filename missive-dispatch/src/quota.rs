//! Plan limits and email usage, consumed from the billing side.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use missive_common::ids::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanLimits {
    pub emails_per_month: u64,
    /// Whether the platform footer may be omitted
    pub custom_branding: bool,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            emails_per_month: 1_000,
            custom_branding: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl QuotaDecision {
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct QuotaError(pub String);

#[async_trait]
pub trait QuotaService: Send + Sync + std::fmt::Debug {
    async fn plan_limits(&self, user: UserId) -> Result<PlanLimits, QuotaError>;

    /// Whether `user` may send `count` more emails this period
    async fn can_send_emails(&self, user: UserId, count: u64) -> Result<QuotaDecision, QuotaError>;

    async fn increment_email_usage(&self, user: UserId, count: u64) -> Result<(), QuotaError>;
}

/// In-process plan table with usage counters.
///
/// Users without an explicit plan get `default_plan`. The check and the
/// increment are separate calls, so two concurrent launches can both pass
/// the check.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuota {
    default_plan: PlanLimits,
    plans: Arc<DashMap<UserId, PlanLimits>>,
    usage: Arc<DashMap<UserId, u64>>,
}

impl MemoryQuota {
    #[must_use]
    pub fn new(default_plan: PlanLimits) -> Self {
        Self {
            default_plan,
            ..Self::default()
        }
    }

    pub fn set_plan(&self, user: UserId, plan: PlanLimits) {
        self.plans.insert(user, plan);
    }

    #[must_use]
    pub fn usage(&self, user: UserId) -> u64 {
        self.usage.get(&user).map_or(0, |used| *used)
    }

    fn plan(&self, user: UserId) -> PlanLimits {
        self.plans.get(&user).map_or(self.default_plan, |plan| *plan)
    }
}

#[async_trait]
impl QuotaService for MemoryQuota {
    async fn plan_limits(&self, user: UserId) -> Result<PlanLimits, QuotaError> {
        Ok(self.plan(user))
    }

    async fn can_send_emails(&self, user: UserId, count: u64) -> Result<QuotaDecision, QuotaError> {
        let limit = self.plan(user).emails_per_month;
        let used = self.usage(user);
        let remaining = limit.saturating_sub(used);

        if count <= remaining {
            Ok(QuotaDecision::allow())
        } else {
            Ok(QuotaDecision::deny(format!(
                "{count} emails requested but only {remaining} of {limit} remain this month"
            )))
        }
    }

    async fn increment_email_usage(&self, user: UserId, count: u64) -> Result<(), QuotaError> {
        let mut used = self.usage.entry(user).or_insert(0);
        *used = used.saturating_add(count);
        Ok(())
    }
}
