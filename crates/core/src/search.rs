//! Search facade with a pluggable index and a database fallback.
//!
//! An external index backend (when one is wired in) gets the first shot at a
//! query and returns matching row ids. If no backend is configured, or the
//! backend errors, the facade silently falls back to bounded LIKE queries
//! against the store, so search degrades rather than breaks when the index
//! is down.

use crate::repositories::patients::{Patient, PatientService};
use crate::repositories::pharmacy::{PharmacyService, Prescription};
use crate::repositories::wounds::{WoundCase, WoundService};
use crate::repositories::appointments::Appointment;
use crate::{HmisResult, Store};
use rusqlite::params;
use std::sync::Arc;

pub const PATIENT_LIMIT: usize = 10;
pub const WOUND_LIMIT: usize = 10;
pub const APPOINTMENT_LIMIT: usize = 20;
pub const PRESCRIPTION_LIMIT: usize = 10;

/// The entity families the facade can search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEntity {
    Patients,
    WoundCases,
    Appointments,
    Prescriptions,
}

/// An external full-text index. Implementations return primary keys in
/// relevance order; the facade hydrates them from the store.
pub trait SearchBackend: Send + Sync {
    fn search(
        &self,
        entity: SearchEntity,
        query: &str,
        limit: usize,
    ) -> Result<Vec<i64>, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Clone)]
pub struct SearchService {
    store: Store,
    backend: Option<Arc<dyn SearchBackend>>,
    patients: PatientService,
    wounds: WoundService,
    pharmacy: PharmacyService,
}

impl SearchService {
    pub fn new(store: Store, wounds: WoundService) -> Self {
        Self {
            patients: PatientService::new(store.clone()),
            pharmacy: PharmacyService::new(store.clone()),
            wounds,
            store,
            backend: None,
        }
    }

    /// Attach an external index backend.
    pub fn with_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Search patients by name, record number, phone or national id.
    pub fn patients(&self, query: &str) -> HmisResult<Vec<Patient>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(ids) = self.try_backend(SearchEntity::Patients, query, PATIENT_LIMIT) {
            return ids.iter().map(|id| self.patients.get(*id)).collect();
        }
        let ids = self.fallback_ids(
            "SELECT id FROM patients
             WHERE is_active = 1 AND (
                 first_name LIKE ?1 OR last_name LIKE ?1 OR middle_name LIKE ?1
                 OR medical_record_number LIKE ?1 OR phone LIKE ?1 OR national_id LIKE ?1)
             ORDER BY last_name, first_name LIMIT ?2",
            query,
            PATIENT_LIMIT,
        )?;
        ids.iter().map(|id| self.patients.get(*id)).collect()
    }

    /// Search wound cases by identifier, notes or the patient's name.
    pub fn wound_cases(&self, query: &str) -> HmisResult<Vec<WoundCase>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(ids) = self.try_backend(SearchEntity::WoundCases, query, WOUND_LIMIT) {
            return ids.iter().map(|id| self.wounds.get(*id)).collect();
        }
        let ids = self.fallback_ids(
            "SELECT w.id FROM wound_cases w
             JOIN patients p ON p.id = w.patient_id
             WHERE w.is_active = 1 AND (
                 w.wound_id LIKE ?1 OR w.clinical_notes LIKE ?1
                 OR p.first_name LIKE ?1 OR p.last_name LIKE ?1)
             ORDER BY w.assessment_date DESC LIMIT ?2",
            query,
            WOUND_LIMIT,
        )?;
        ids.iter().map(|id| self.wounds.get(*id)).collect()
    }

    /// Search appointments by the patient's name or the booking notes.
    pub fn appointments(&self, query: &str) -> HmisResult<Vec<Appointment>> {
        use crate::repositories::appointments::AppointmentService;
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let svc = AppointmentService::new(self.store.clone(), crate::events::EventBus::new());
        if let Some(ids) = self.try_backend(SearchEntity::Appointments, query, APPOINTMENT_LIMIT) {
            return ids.iter().map(|id| svc.get(*id)).collect();
        }
        let ids = self.fallback_ids(
            "SELECT a.id FROM appointments a
             JOIN patients p ON p.id = a.patient_id
             WHERE p.first_name LIKE ?1 OR p.last_name LIKE ?1 OR a.notes LIKE ?1
             ORDER BY a.scheduled_at DESC LIMIT ?2",
            query,
            APPOINTMENT_LIMIT,
        )?;
        ids.iter().map(|id| svc.get(*id)).collect()
    }

    /// Search prescriptions by number, diagnosis or the patient's name.
    pub fn prescriptions(&self, query: &str) -> HmisResult<Vec<Prescription>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(ids) = self.try_backend(SearchEntity::Prescriptions, query, PRESCRIPTION_LIMIT) {
            return ids.iter().map(|id| self.pharmacy.prescription(*id)).collect();
        }
        let ids = self.fallback_ids(
            "SELECT r.id FROM prescriptions r
             JOIN patients p ON p.id = r.patient_id
             WHERE r.prescription_number LIKE ?1 OR r.diagnosis LIKE ?1
                 OR p.first_name LIKE ?1 OR p.last_name LIKE ?1
             ORDER BY r.prescribed_at DESC LIMIT ?2",
            query,
            PRESCRIPTION_LIMIT,
        )?;
        ids.iter().map(|id| self.pharmacy.prescription(*id)).collect()
    }

    fn try_backend(&self, entity: SearchEntity, query: &str, limit: usize) -> Option<Vec<i64>> {
        let backend = self.backend.as_ref()?;
        match backend.search(entity, query, limit) {
            Ok(ids) => Some(ids),
            Err(e) => {
                tracing::warn!("search backend failed for {entity:?}, using fallback: {e}");
                None
            }
        }
    }

    fn fallback_ids(&self, sql: &str, query: &str, limit: usize) -> HmisResult<Vec<i64>> {
        let pattern = format!("%{query}%");
        let conn = self.store.conn();
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt
            .query_map(params![pattern, limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::repositories::patients::{sample_input, PatientService};
    use crate::repositories::wounds::test_support::case_input;
    use crate::repositories::wounds::WoundService;

    fn service() -> (SearchService, Store) {
        let store = Store::open_in_memory().unwrap();
        let wounds = WoundService::new(store.clone(), EventBus::new());
        (SearchService::new(store.clone(), wounds), store)
    }

    #[test]
    fn patient_fallback_matches_name_and_mrn() {
        let (search, store) = service();
        let patients = PatientService::new(store);
        patients.create(&sample_input("MRN-0001")).unwrap();
        let mut other = sample_input("MRN-0002");
        other.first_name = "Joseph".into();
        other.last_name = "Banda".into();
        patients.create(&other).unwrap();

        assert_eq!(search.patients("mulenga").unwrap().len(), 1);
        assert_eq!(search.patients("MRN-000").unwrap().len(), 2);
        assert_eq!(search.patients("  ").unwrap().len(), 0);
        assert!(search.patients("nobody").unwrap().is_empty());
    }

    #[test]
    fn patient_results_are_capped() {
        let (search, store) = service();
        let patients = PatientService::new(store);
        for i in 0..15 {
            patients.create(&sample_input(&format!("MRN-{i:04}"))).unwrap();
        }
        assert_eq!(search.patients("Mulenga").unwrap().len(), PATIENT_LIMIT);
    }

    #[test]
    fn wound_fallback_matches_wound_id() {
        let (search, store) = service();
        let patients = PatientService::new(store.clone());
        let patient = patients.create(&sample_input("MRN-0001")).unwrap();
        let wounds = WoundService::new(store, EventBus::new());
        wounds.create(&case_input(patient.id)).unwrap();

        assert_eq!(search.wound_cases("WND-00001").unwrap().len(), 1);
        // Patient-name matches find their wounds too.
        assert_eq!(search.wound_cases("Mulenga").unwrap().len(), 1);
    }

    struct FailingBackend;

    impl SearchBackend for FailingBackend {
        fn search(
            &self,
            _entity: SearchEntity,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<i64>, Box<dyn std::error::Error + Send + Sync>> {
            Err("index unavailable".into())
        }
    }

    #[test]
    fn backend_failure_falls_back_to_store() {
        let (search, store) = service();
        let search = search.with_backend(Arc::new(FailingBackend));
        PatientService::new(store).create(&sample_input("MRN-0001")).unwrap();
        assert_eq!(search.patients("Chanda").unwrap().len(), 1);
    }

    struct FixedBackend(Vec<i64>);

    impl SearchBackend for FixedBackend {
        fn search(
            &self,
            _entity: SearchEntity,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<i64>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn backend_hits_are_hydrated_from_store() {
        let (search, store) = service();
        let patient = PatientService::new(store)
            .create(&sample_input("MRN-0001"))
            .unwrap();
        let search = search.with_backend(Arc::new(FixedBackend(vec![patient.id])));
        // The query text does not match in SQL terms; only the backend finds it.
        let hits = search.patients("zzz").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, patient.id);
    }
}
