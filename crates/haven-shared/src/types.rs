use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row id of a [`crate::field::Field`] definition.
pub type FieldId = i64;

/// Row id of a lookup list definition (`list_controls`).
pub type ListControlId = i64;

/// Row id of an entry inside a concrete lookup table.
pub type ListEntryId = i64;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// A tenant. Every field, person and link belongs to exactly one crew.
    CrewId
);
uuid_id!(
    /// A tracked individual (the subject of the case file).
    PersonId
);
uuid_id!(
    /// A directed relationship between two persons.
    LinkId
);
uuid_id!(
    /// An operator account.
    UserId
);
uuid_id!(
    /// A provenance record of one API call.
    ApiLogId
);
