//! Integer entity identifiers.
//!
//! Each entity kind gets its own newtype so a workflow id can never be passed where a state id
//! is expected. Ids serialise as bare integers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Behaviour shared by all entity id newtypes.
pub trait EntityId: Copy + Ord {
    /// The id handed out when a table is empty.
    const FIRST: Self;

    fn successor(self) -> Self;
}

macro_rules! entity_id {
    ($($(#[$meta:meta])* $name:ident;)+) => {$(
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn get(self) -> u32 {
                self.0
            }
        }

        impl EntityId for $name {
            const FIRST: Self = Self(1);

            fn successor(self) -> Self {
                Self(self.0.saturating_add(1))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    )+};
}

entity_id! {
    PatientId;
    ConceptId;
    ConceptSourceId;
    ProgramId;
    WorkflowId;
    StateId;
    PatientProgramId;
    PatientStateId;
    EncounterId;
    LocationId;
    ProviderId;
}

/// Next free key of a table: one past the largest existing key.
pub(crate) fn next_key<K: EntityId, V>(table: &BTreeMap<K, V>) -> K {
    table
        .keys()
        .next_back()
        .map_or(K::FIRST, |last| last.successor())
}
