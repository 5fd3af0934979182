//! Campaign dispatch engine
//!
//! Turns a running campaign into a stream of individually rendered,
//! rate-limited, retried and idempotent sends:
//! - [`DispatchEngine`] processes one slice of a campaign per invocation
//! - [`LifecycleService`] launches, schedules and pauses campaigns
//! - [`DispatchScheduler`] is the periodic trigger that drives running campaigns
//! - [`RateLimiter`] and [`IdempotencyLedger`] hold all cross-invocation state
//!   in the shared key-value store

pub mod clock;
pub mod config;
pub mod decorate;
mod engine;
mod error;
mod ledger;
mod lifecycle;
pub mod metrics;
pub mod policy;
pub mod quota;
mod rate_limiter;
mod scheduler;
mod service;
pub mod template;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DispatchConfig, UnsubscribeConfig};
pub use decorate::UnsubscribeLinks;
pub use engine::{BatchSummary, DispatchEngine};
pub use error::{CampaignError, DispatchError, SystemError};
pub use ledger::IdempotencyLedger;
pub use lifecycle::LifecycleService;
pub use metrics::DispatchMetrics;
pub use policy::{RetryPolicy, SendOutcome, SendStep};
pub use quota::{MemoryQuota, PlanLimits, QuotaDecision, QuotaError, QuotaService};
pub use rate_limiter::{RateLimitStats, RateLimiter};
pub use scheduler::{DispatchScheduler, TickReport};
pub use service::{CampaignProgress, CampaignQueryService};
pub use transport::{DeliveryClient, OutboundMessage, TransportError};
