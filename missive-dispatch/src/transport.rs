//! The single "send one message" primitive and its error classification.
//!
//! Transport errors fall into two groups:
//! - **retriable**: rate limits, quota pushback, timeouts, connection loss and
//!   5xx-style provider faults; retried with backoff inside the invocation
//! - **terminal**: rejected recipients, auth failures, malformed messages and
//!   other 4xx-style answers; the recipient is marked failed immediately

use async_trait::async_trait;
use missive_common::SenderAccount;
use thiserror::Error;

/// A fully rendered message ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    /// Value for a `List-Unsubscribe` header
    pub list_unsubscribe: String,
    /// Deterministic per (campaign, contact, template version).
    ///
    /// Providers that support idempotent submission can use it to drop a
    /// duplicate that slipped past the ledger.
    pub idempotency_key: String,
}

/// Sends exactly one message through a sender account.
#[async_trait]
pub trait DeliveryClient: Send + Sync + std::fmt::Debug {
    /// Attempt a single transport-level send.
    ///
    /// # Errors
    ///
    /// Returns a classified [`TransportError`]; callers decide on retries.
    async fn send(
        &self,
        sender: &SenderAccount,
        message: &OutboundMessage,
    ) -> Result<String, TransportError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Provider quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    /// Provider-side fault (5xx-style).
    #[error("Provider error {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Recipient rejected: {0}")]
    RecipientRejected(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Any other client-side (4xx-style) refusal.
    #[error("Rejected {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl TransportError {
    /// Map an HTTP-style provider status onto the taxonomy.
    ///
    /// - **429** → rate limited (retry)
    /// - **401/403** → authentication (terminal)
    /// - **5xx** → provider fault (retry)
    /// - **other 4xx** → rejected (terminal)
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => Self::RateLimited(message),
            401 | 403 => Self::Authentication(message),
            408 | 504 => Self::Timeout(message),
            500..=599 => Self::Provider { status, message },
            _ => Self::Rejected { status, message },
        }
    }

    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_)
                | Self::QuotaExceeded(_)
                | Self::Timeout(_)
                | Self::Connection(_)
                | Self::Provider { .. }
        )
    }
}
