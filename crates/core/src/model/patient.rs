//! Patients, encounters and the places and people an encounter refers to.

use super::ids::{EncounterId, LocationId, PatientId, ProviderId};
use super::is_false;
use crate::NonEmptyText;
use chrono::NaiveDate;
use formentry_uuid::EntityUuid;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Patient {
    pub id: PatientId,
    #[serde(default)]
    pub uuid: EntityUuid,
    pub given_name: NonEmptyText,
    pub family_name: NonEmptyText,
    #[serde(default, skip_serializing_if = "is_false")]
    pub voided: bool,
}

impl fmt::Display for Patient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.given_name, self.family_name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Location {
    pub id: LocationId,
    #[serde(default)]
    pub uuid: EntityUuid,
    pub name: NonEmptyText,
    #[serde(default, skip_serializing_if = "is_false")]
    pub retired: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Provider {
    pub id: ProviderId,
    #[serde(default)]
    pub uuid: EntityUuid,
    pub name: NonEmptyText,
    #[serde(default, skip_serializing_if = "is_false")]
    pub retired: bool,
}

/// A clinical contact recorded by submitting a form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Encounter {
    pub id: EncounterId,
    #[serde(default)]
    pub uuid: EntityUuid,
    pub patient: PatientId,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    /// Name of the form the encounter was entered with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub voided: bool,
}
