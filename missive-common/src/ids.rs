//! Strongly typed identifiers.
//!
//! Entity ids are ULIDs: globally unique and sortable by creation time.
//! Recipient ids are plain monotonic integers because dispatch pages through
//! them with `id > cursor`, which needs a total order that never reuses a value.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(ulid::Ulid);

        impl $name {
            /// Generate a fresh identifier
            #[must_use]
            pub fn generate() -> Self {
                Self(ulid::Ulid::new())
            }

            #[must_use]
            pub const fn new(id: ulid::Ulid) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn ulid(&self) -> ulid::Ulid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ulid::Ulid::from_string(s).map(Self)
            }
        }
    };
}

ulid_id!(
    /// Account that owns campaigns, contacts and quota
    UserId
);
ulid_id!(CampaignId);
ulid_id!(ContactId);
ulid_id!(
    /// A contact list; the source recipients are materialized from
    ContactListId
);
ulid_id!(TemplateId);
ulid_id!(
    /// A connected mailbox that campaigns send through
    SenderAccountId
);

/// Identifier of a campaign recipient row.
///
/// Assigned from a store-wide sequence, so ordering by id is stable even when
/// many rows share a creation timestamp.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecipientId(pub u64);

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecipientId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}
