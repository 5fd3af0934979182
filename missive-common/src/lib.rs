//! Shared building blocks for the missive campaign dispatcher.
//!
//! Holds the domain model that every other crate speaks, the lifecycle state
//! machine for campaigns, and the logging bootstrap.

pub mod ids;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod traits;

pub use lifecycle::{CampaignAction, LifecycleError};
pub use model::{
    Campaign, CampaignRecipient, CampaignStatus, Contact, ContactList, RecipientStatus,
    SenderAccount, Template,
};
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
