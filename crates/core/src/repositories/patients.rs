use crate::model::{Patient, PatientId};
use crate::store::DataStore;

#[derive(Clone, Debug)]
pub struct PatientRepository {
    store: DataStore,
}

impl PatientRepository {
    pub fn new(store: DataStore) -> Self {
        Self { store }
    }

    /// Returns the patient, voided or not.
    pub fn get_patient(&self, id: PatientId) -> Option<Patient> {
        self.store.read(|d| d.patient(id).cloned())
    }

    /// Non-voided patients ordered by id.
    pub fn list_patients(&self) -> Vec<Patient> {
        self.store.read(|d| {
            d.patients
                .values()
                .filter(|p| !p.voided)
                .cloned()
                .collect()
        })
    }
}
