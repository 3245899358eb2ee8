use crate::model::{Encounter, EncounterId, Location, LocationId, PatientId, Provider, ProviderId};
use crate::store::DataStore;

#[derive(Clone, Debug)]
pub struct EncounterRepository {
    store: DataStore,
}

impl EncounterRepository {
    pub fn new(store: DataStore) -> Self {
        Self { store }
    }

    pub fn get_encounter(&self, id: EncounterId) -> Option<Encounter> {
        self.store.read(|d| d.encounter(id).cloned())
    }

    /// Non-voided encounters of `patient`, oldest first.
    pub fn encounters_for_patient(&self, patient: PatientId) -> Vec<Encounter> {
        let mut encounters: Vec<Encounter> = self.store.read(|d| {
            d.encounters
                .values()
                .filter(|e| e.patient == patient && !e.voided)
                .cloned()
                .collect()
        });
        encounters.sort_by_key(|e| (e.date, e.id));
        encounters
    }

    pub fn get_location(&self, id: LocationId) -> Option<Location> {
        self.store.read(|d| d.locations.get(&id).cloned())
    }

    /// Locations that can be chosen on a form.
    pub fn locations(&self) -> Vec<Location> {
        self.store.read(|d| {
            d.locations
                .values()
                .filter(|l| !l.retired)
                .cloned()
                .collect()
        })
    }

    pub fn get_provider(&self, id: ProviderId) -> Option<Provider> {
        self.store.read(|d| d.providers.get(&id).cloned())
    }

    /// Providers that can be chosen on a form.
    pub fn providers(&self) -> Vec<Provider> {
        self.store.read(|d| {
            d.providers
                .values()
                .filter(|p| !p.retired)
                .cloned()
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encounters_sorted_by_date() {
        let store = DataStore::from_yaml(
            r#"
patients:
  - { id: 2, given_name: John, family_name: Doe }
locations:
  - { id: 1, name: Old Clinic, retired: true }
  - { id: 2, name: Xanadu }
encounters:
  - { id: 1, patient: 2, date: 2010-05-01, location: 2 }
  - { id: 2, patient: 2, date: 2009-01-01 }
  - { id: 3, patient: 2, date: 2008-01-01, voided: true }
"#,
        )
        .expect("store");
        let repo = EncounterRepository::new(store);

        let ids: Vec<EncounterId> = repo
            .encounters_for_patient(PatientId(2))
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![EncounterId(2), EncounterId(1)]);
        assert_eq!(repo.locations().len(), 1);
        assert!(repo.get_location(LocationId(1)).is_some());
        assert!(repo.providers().is_empty());
    }
}
