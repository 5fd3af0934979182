//! Scripted delivery client for dispatch scenarios
//!
//! Replies are taken from a queue in order; once the queue is empty every send
//! succeeds. Every attempt is recorded so tests can assert on exactly what was
//! handed to the transport. A held transport parks each send on a gate until
//! the test releases it, which keeps an invocation in flight on demand.
//!
//! ```rust,no_run
//! let transport = ScriptedTransport::builder()
//!     .then_fail(TransportError::Timeout("slow".into()))
//!     .then_succeed()
//!     .build();
//! ```

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use missive_common::SenderAccount;
use missive_dispatch::{DeliveryClient, OutboundMessage, TransportError};
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Option<TransportError>>>,
    /// Applied to every send after the script runs out
    fallback: Mutex<Option<TransportError>>,
    attempts: Mutex<Vec<OutboundMessage>>,
    delivered: Mutex<Vec<OutboundMessage>>,
    counter: AtomicUsize,
    gate: Option<Arc<Notify>>,
    entered: Notify,
}

#[derive(Debug, Default)]
pub struct ScriptedTransportBuilder {
    script: VecDeque<Option<TransportError>>,
    fallback: Option<TransportError>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedTransportBuilder {
    #[must_use]
    pub fn then_succeed(mut self) -> Self {
        self.script.push_back(None);
        self
    }

    #[must_use]
    pub fn then_fail(mut self, error: TransportError) -> Self {
        self.script.push_back(Some(error));
        self
    }

    /// Fail every send once the scripted replies are used up
    #[must_use]
    pub fn always_fail(mut self, error: TransportError) -> Self {
        self.fallback = Some(error);
        self
    }

    /// Park every send until `gate` is notified
    #[must_use]
    pub fn hold_until(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn build(self) -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport {
            script: Mutex::new(self.script),
            fallback: Mutex::new(self.fallback),
            gate: self.gate,
            ..ScriptedTransport::default()
        })
    }
}

impl ScriptedTransport {
    pub fn builder() -> ScriptedTransportBuilder {
        ScriptedTransportBuilder::default()
    }

    pub fn succeeding() -> Arc<Self> {
        Self::builder().build()
    }

    /// Every message handed to `send`, including failed attempts
    pub fn attempts(&self) -> Vec<OutboundMessage> {
        self.attempts.lock().clone()
    }

    /// Messages the provider accepted
    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered.lock().clone()
    }

    pub fn delivered_to(&self) -> Vec<String> {
        self.delivered.lock().iter().map(|m| m.to.clone()).collect()
    }

    /// Resolves once a send has reached the transport
    pub async fn entered(&self) {
        self.entered.notified().await;
    }
}

#[async_trait]
impl DeliveryClient for ScriptedTransport {
    async fn send(
        &self,
        _sender: &SenderAccount,
        message: &OutboundMessage,
    ) -> Result<String, TransportError> {
        self.attempts.lock().push(message.clone());
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let reply = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().clone());

        match reply {
            Some(error) => Err(error),
            None => {
                self.delivered.lock().push(message.clone());
                let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("provider-{n}"))
            }
        }
    }
}
