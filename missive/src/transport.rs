//! A delivery client that writes each message to the log instead of sending it.

use async_trait::async_trait;
use missive_common::SenderAccount;
use missive_dispatch::{DeliveryClient, OutboundMessage, TransportError};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl DeliveryClient for LogTransport {
    async fn send(
        &self,
        sender: &SenderAccount,
        message: &OutboundMessage,
    ) -> Result<String, TransportError> {
        if !is_plausible_address(&message.to) {
            return Err(TransportError::RecipientRejected(format!(
                "{} is not a deliverable address",
                message.to
            )));
        }
        if message.subject.trim().is_empty() {
            return Err(TransportError::InvalidMessage(
                "subject is empty".to_string(),
            ));
        }

        let message_id = format!("log-{}", ulid::Ulid::new());

        tracing::info!(
            target: "missive::transport",
            from = %sender.from_header(),
            to = %message.to,
            subject = %message.subject,
            html_bytes = message.html.len(),
            text_bytes = message.text.len(),
            idempotency_key = %message.idempotency_key,
            message_id = %message_id,
            "Message delivered"
        );

        Ok(message_id)
    }
}

fn is_plausible_address(address: &str) -> bool {
    address
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
}
