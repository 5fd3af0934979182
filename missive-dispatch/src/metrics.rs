//! Dispatch metrics
//!
//! Counters are created against the global meter, so they are no-ops until a
//! meter provider is installed by the embedding process.

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

use crate::engine::BatchSummary;

#[derive(Debug)]
pub struct DispatchMetrics {
    /// Dispatch invocations by outcome
    batches_total: Counter<u64>,

    /// Recipients settled, by status
    recipients_total: Counter<u64>,

    /// Transport attempts per settled send
    attempts: Histogram<u64>,

    /// Batches that stopped early on the rate limiter
    rate_limited_total: Counter<u64>,

    campaigns_completed: Counter<u64>,
}

impl DispatchMetrics {
    #[must_use]
    pub fn new() -> Self {
        let meter = meter();

        let batches_total = meter
            .u64_counter("missive.dispatch.batches.total")
            .with_description("Total number of dispatch invocations by outcome")
            .build();

        let recipients_total = meter
            .u64_counter("missive.dispatch.recipients.total")
            .with_description("Total number of recipients settled by status")
            .build();

        let attempts = meter
            .u64_histogram("missive.dispatch.attempts")
            .with_description("Distribution of transport attempts per recipient")
            .build();

        let rate_limited_total = meter
            .u64_counter("missive.dispatch.rate_limited.total")
            .with_description("Total number of batches halted by the rate limiter")
            .build();

        let campaigns_completed = meter
            .u64_counter("missive.dispatch.campaigns.completed.total")
            .with_description("Total number of campaigns completed by dispatch")
            .build();

        Self {
            batches_total,
            recipients_total,
            attempts,
            rate_limited_total,
            campaigns_completed,
        }
    }

    pub fn record_batch(&self, summary: &BatchSummary) {
        self.batches_total
            .add(1, &[KeyValue::new("outcome", "ok")]);

        for (status, count) in [
            ("sent", summary.sent),
            ("failed", summary.failed),
            ("skipped", summary.skipped),
        ] {
            if count > 0 {
                self.recipients_total.add(
                    u64::try_from(count).unwrap_or(u64::MAX),
                    &[KeyValue::new("status", status)],
                );
            }
        }

        if summary.rate_limited {
            self.rate_limited_total.add(1, &[]);
        }

        if summary.completed {
            self.campaigns_completed.add(1, &[]);
        }
    }

    pub fn record_error(&self) {
        self.batches_total
            .add(1, &[KeyValue::new("outcome", "error")]);
    }

    pub fn record_attempts(&self, attempts: u32) {
        self.attempts.record(u64::from(attempts), &[]);
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn meter() -> Meter {
    opentelemetry::global::meter("missive.dispatch")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_provider_is_noop() {
        let metrics = DispatchMetrics::new();
        metrics.record_batch(&BatchSummary {
            processed: 3,
            sent: 2,
            failed: 1,
            ..BatchSummary::default()
        });
        metrics.record_attempts(4);
        metrics.record_error();
    }
}
