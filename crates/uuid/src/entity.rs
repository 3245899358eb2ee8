//! Canonical entity UUID wrapper.

use crate::{UuidError, UuidResult};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// Length of a canonical hyphenated UUID.
const CANONICAL_LEN: usize = 36;

/// Byte offsets of the hyphens in the canonical layout.
const HYPHEN_POSITIONS: [usize; 4] = [8, 13, 18, 23];

/// An entity UUID guaranteed to be in canonical (lowercase hyphenated) form.
///
/// # Construction
/// - [`EntityUuid::new`] generates a fresh random v4 UUID, used when an entity is created by a
///   form submission or loaded from a fixture that omits its uuid.
/// - [`EntityUuid::parse`] validates an externally supplied identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityUuid(Uuid);

impl Default for EntityUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityUuid {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses a UUID string that must already be canonical.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is not canonical.
    pub fn parse(input: &str) -> UuidResult<Self> {
        if !Self::is_canonical(input) {
            return Err(UuidError::InvalidInput(format!(
                "UUID must be 36 lowercase characters in 8-4-4-4-12 form, got: '{input}'"
            )));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| UuidError::InvalidInput(format!("'{input}': {e}")))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true if `input` is in canonical form.
    ///
    /// This is a purely syntactic check, cheap enough to decide whether a template attribute
    /// should be treated as a UUID before falling back to name or code lookups.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == CANONICAL_LEN
            && input.bytes().enumerate().all(|(i, b)| {
                if HYPHEN_POSITIONS.contains(&i) {
                    b == b'-'
                } else {
                    matches!(b, b'0'..=b'9' | b'a'..=b'f')
                }
            })
    }
}

impl fmt::Display for EntityUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for EntityUuid {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityUuid::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for EntityUuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for EntityUuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EntityUuid::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_canonical() {
        let id = EntityUuid::new();
        assert!(EntityUuid::is_canonical(&id.to_string()));
    }

    #[test]
    fn parse_accepts_canonical_workflow_uuid() {
        let id = EntityUuid::parse("72a90efc-5140-11e1-a3e3-00248140a5eb").expect("canonical");
        assert_eq!(id.to_string(), "72a90efc-5140-11e1-a3e3-00248140a5eb");
    }

    #[test]
    fn parse_rejects_non_canonical_forms() {
        for input in [
            "72A90EFC-5140-11E1-A3E3-00248140A5EB",
            "72a90efc514011e1a3e300248140a5eb",
            "{72a90efc-5140-11e1-a3e3-00248140a5eb}",
            "72a90efc-5140-11e1-a3e3-00248140a5e",
            "72a90efc_5140-11e1-a3e3-00248140a5eb",
            "",
        ] {
            assert!(EntityUuid::parse(input).is_err(), "should reject {input:?}");
        }
    }

    #[test]
    fn is_canonical_does_not_match_numeric_ids() {
        assert!(!EntityUuid::is_canonical("200"));
        assert!(!EntityUuid::is_canonical("SNOMED CT:Test Code"));
    }

    #[test]
    fn serde_round_trip_preserves_value() {
        let id = EntityUuid::parse("6de7ed10-53ad-11e1-8cb6-00248140a5eb").expect("canonical");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"6de7ed10-53ad-11e1-8cb6-00248140a5eb\"");
        let back: EntityUuid = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn deserialize_rejects_uppercase() {
        let err = serde_json::from_str::<EntityUuid>("\"6DE7ED10-53AD-11E1-8CB6-00248140A5EB\"")
            .expect_err("uppercase rejected");
        assert!(err.to_string().contains("lowercase"));
    }
}
