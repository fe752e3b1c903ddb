//! Bedside clinical records: vitals, nursing notes, outpatient visits.
//!
//! BMI and the blood-pressure display string are derived at the write
//! boundary; visit numbers come from the shared sequence allocator.

use crate::db::now_rfc3339;
use crate::repositories::appointments::require_row;
use crate::sequence::{self, SequenceKind};
use crate::{derived, HmisError, HmisResult, Store};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalSigns {
    pub id: i64,
    pub patient_id: i64,
    pub nurse_profile_id: i64,
    pub temperature: Option<f64>,
    pub temperature_unit: String,
    pub bp_systolic: Option<u32>,
    pub bp_diastolic: Option<u32>,
    pub heart_rate: Option<u32>,
    pub respiratory_rate: Option<u32>,
    pub oxygen_saturation: Option<f64>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub bmi: Option<f64>,
    pub recorded_at: String,
}

impl VitalSigns {
    /// "120/80" when both readings are present.
    pub fn blood_pressure(&self) -> Option<String> {
        derived::blood_pressure_display(self.bp_systolic, self.bp_diastolic)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VitalSignsInput {
    pub patient_id: i64,
    pub nurse_profile_id: i64,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default = "default_temp_unit")]
    pub temperature_unit: String,
    #[serde(default)]
    pub bp_systolic: Option<u32>,
    #[serde(default)]
    pub bp_diastolic: Option<u32>,
    #[serde(default)]
    pub heart_rate: Option<u32>,
    #[serde(default)]
    pub respiratory_rate: Option<u32>,
    #[serde(default)]
    pub oxygen_saturation: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

fn default_temp_unit() -> String {
    "C".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NursingNote {
    pub id: i64,
    pub patient_id: i64,
    pub nurse_profile_id: i64,
    pub note_type: String,
    pub note: String,
    pub recorded_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutpatientVisit {
    pub id: i64,
    pub visit_number: String,
    pub patient_id: i64,
    pub doctor_profile_id: i64,
    pub appointment_id: Option<i64>,
    pub chief_complaint: String,
    pub history_of_present_illness: String,
    pub past_medical_history: String,
    pub physical_examination: String,
    pub assessment: String,
    pub diagnosis: String,
    pub treatment_plan: String,
    pub follow_up_date: Option<NaiveDate>,
    pub visit_date: String,
    pub next_visit_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisitInput {
    pub patient_id: i64,
    pub doctor_profile_id: i64,
    #[serde(default)]
    pub appointment_id: Option<i64>,
    pub chief_complaint: String,
    pub history_of_present_illness: String,
    #[serde(default)]
    pub past_medical_history: String,
    pub physical_examination: String,
    pub assessment: String,
    pub diagnosis: String,
    pub treatment_plan: String,
    #[serde(default)]
    pub follow_up_date: Option<NaiveDate>,
    #[serde(default)]
    pub next_visit_date: Option<NaiveDate>,
}

#[derive(Clone)]
pub struct ClinicalService {
    store: Store,
}

impl ClinicalService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Record a set of vital signs. BMI is computed here when both weight
    /// and height are given, and stored.
    pub fn record_vitals(&self, input: &VitalSignsInput) -> HmisResult<VitalSigns> {
        if let Some(saturation) = input.oxygen_saturation {
            if !(0.0..=100.0).contains(&saturation) {
                return Err(HmisError::InvalidInput(
                    "oxygen saturation must be between 0 and 100".into(),
                ));
            }
        }
        let bmi = match (input.weight, input.height) {
            (Some(w), Some(h)) if h > 0.0 => {
                let metres = h / 100.0;
                Some(w / (metres * metres))
            }
            _ => None,
        };
        let conn = self.store.conn();
        require_row(&conn, "patients", "patient", input.patient_id)?;
        require_row(&conn, "user_profiles", "user profile", input.nurse_profile_id)?;
        conn.execute(
            "INSERT INTO vital_signs
                 (patient_id, nurse_profile_id, temperature, temperature_unit, bp_systolic,
                  bp_diastolic, heart_rate, respiratory_rate, oxygen_saturation, weight,
                  height, bmi, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                input.patient_id,
                input.nurse_profile_id,
                input.temperature,
                input.temperature_unit,
                input.bp_systolic,
                input.bp_diastolic,
                input.heart_rate,
                input.respiratory_rate,
                input.oxygen_saturation,
                input.weight,
                input.height,
                bmi,
                now_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.vitals(id)
    }

    pub fn vitals(&self, id: i64) -> HmisResult<VitalSigns> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {VITALS_COLUMNS} FROM vital_signs WHERE id = ?1"),
                params![id],
                vitals_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("vital signs", id))
    }

    /// Most recent first.
    pub fn vitals_for_patient(&self, patient_id: i64) -> HmisResult<Vec<VitalSigns>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {VITALS_COLUMNS} FROM vital_signs
             WHERE patient_id = ?1 ORDER BY recorded_at DESC"
        ))?;
        let rows = stmt
            .query_map(params![patient_id], vitals_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn add_note(
        &self,
        patient_id: i64,
        nurse_profile_id: i64,
        note_type: &str,
        note: &str,
    ) -> HmisResult<NursingNote> {
        if note.trim().is_empty() {
            return Err(HmisError::InvalidInput("note text is required".into()));
        }
        let conn = self.store.conn();
        require_row(&conn, "patients", "patient", patient_id)?;
        require_row(&conn, "user_profiles", "user profile", nurse_profile_id)?;
        conn.execute(
            "INSERT INTO nursing_notes (patient_id, nurse_profile_id, note_type, note, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![patient_id, nurse_profile_id, note_type, note, now_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        let created = conn.query_row(
            "SELECT id, patient_id, nurse_profile_id, note_type, note, recorded_at
             FROM nursing_notes WHERE id = ?1",
            params![id],
            note_row,
        )?;
        Ok(created)
    }

    pub fn notes_for_patient(&self, patient_id: i64) -> HmisResult<Vec<NursingNote>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id, patient_id, nurse_profile_id, note_type, note, recorded_at
             FROM nursing_notes WHERE patient_id = ?1 ORDER BY recorded_at DESC",
        )?;
        let rows = stmt
            .query_map(params![patient_id], note_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Open an outpatient visit, allocating its VIS identifier. A visit may
    /// claim at most one appointment.
    pub fn create_visit(&self, input: &VisitInput) -> HmisResult<OutpatientVisit> {
        if input.chief_complaint.trim().is_empty() {
            return Err(HmisError::InvalidInput("chief complaint is required".into()));
        }
        let mut conn = self.store.conn();
        require_row(&conn, "patients", "patient", input.patient_id)?;
        require_row(&conn, "user_profiles", "user profile", input.doctor_profile_id)?;
        if let Some(appointment_id) = input.appointment_id {
            require_row(&conn, "appointments", "appointment", appointment_id)?;
        }
        let visit_number = sequence::allocate_on(&mut conn, SequenceKind::OutPatientVisit)?;
        conn.execute(
            "INSERT INTO outpatient_visits
                 (visit_number, patient_id, doctor_profile_id, appointment_id, chief_complaint,
                  history_of_present_illness, past_medical_history, physical_examination,
                  assessment, diagnosis, treatment_plan, follow_up_date, visit_date,
                  next_visit_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                visit_number,
                input.patient_id,
                input.doctor_profile_id,
                input.appointment_id,
                input.chief_complaint,
                input.history_of_present_illness,
                input.past_medical_history,
                input.physical_examination,
                input.assessment,
                input.diagnosis,
                input.treatment_plan,
                input.follow_up_date,
                now_rfc3339(),
                input.next_visit_date,
            ],
        )
        .map_err(|e| {
            if HmisError::is_unique_violation(&e) {
                HmisError::InvalidInput("appointment already has a visit".into())
            } else {
                HmisError::Sqlite(e)
            }
        })?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.visit(id)
    }

    pub fn visit(&self, id: i64) -> HmisResult<OutpatientVisit> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {VISIT_COLUMNS} FROM outpatient_visits WHERE id = ?1"),
                params![id],
                visit_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("outpatient visit", id))
    }

    pub fn visits_for_patient(&self, patient_id: i64) -> HmisResult<Vec<OutpatientVisit>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {VISIT_COLUMNS} FROM outpatient_visits
             WHERE patient_id = ?1 ORDER BY visit_date DESC"
        ))?;
        let rows = stmt
            .query_map(params![patient_id], visit_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

const VITALS_COLUMNS: &str = "id, patient_id, nurse_profile_id, temperature, temperature_unit, \
                              bp_systolic, bp_diastolic, heart_rate, respiratory_rate, \
                              oxygen_saturation, weight, height, bmi, recorded_at";

fn vitals_row(row: &rusqlite::Row) -> rusqlite::Result<VitalSigns> {
    Ok(VitalSigns {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        nurse_profile_id: row.get(2)?,
        temperature: row.get(3)?,
        temperature_unit: row.get(4)?,
        bp_systolic: row.get(5)?,
        bp_diastolic: row.get(6)?,
        heart_rate: row.get(7)?,
        respiratory_rate: row.get(8)?,
        oxygen_saturation: row.get(9)?,
        weight: row.get(10)?,
        height: row.get(11)?,
        bmi: row.get(12)?,
        recorded_at: row.get(13)?,
    })
}

fn note_row(row: &rusqlite::Row) -> rusqlite::Result<NursingNote> {
    Ok(NursingNote {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        nurse_profile_id: row.get(2)?,
        note_type: row.get(3)?,
        note: row.get(4)?,
        recorded_at: row.get(5)?,
    })
}

const VISIT_COLUMNS: &str = "id, visit_number, patient_id, doctor_profile_id, appointment_id, \
                             chief_complaint, history_of_present_illness, past_medical_history, \
                             physical_examination, assessment, diagnosis, treatment_plan, \
                             follow_up_date, visit_date, next_visit_date";

fn visit_row(row: &rusqlite::Row) -> rusqlite::Result<OutpatientVisit> {
    Ok(OutpatientVisit {
        id: row.get(0)?,
        visit_number: row.get(1)?,
        patient_id: row.get(2)?,
        doctor_profile_id: row.get(3)?,
        appointment_id: row.get(4)?,
        chief_complaint: row.get(5)?,
        history_of_present_illness: row.get(6)?,
        past_medical_history: row.get(7)?,
        physical_examination: row.get(8)?,
        assessment: row.get(9)?,
        diagnosis: row.get(10)?,
        treatment_plan: row.get(11)?,
        follow_up_date: row.get(12)?,
        visit_date: row.get(13)?,
        next_visit_date: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::Role;
    use crate::repositories::identity::{IdentityService, NewStaff};
    use crate::repositories::patients::{sample_input, PatientService};

    fn fixture() -> (ClinicalService, i64, i64) {
        let store = Store::open_in_memory().unwrap();
        let patient = PatientService::new(store.clone())
            .create(&sample_input("MRN-0001"))
            .unwrap();
        let nurse = IdentityService::new(store.clone())
            .create_staff(&NewStaff {
                username: "nurse".into(),
                password: "longenough".into(),
                email: String::new(),
                first_name: "N".into(),
                last_name: "K".into(),
                role: Role::Nurse,
                employee_id: Some("EMP-001".into()),
                department_id: None,
                phone: String::new(),
                specialization: String::new(),
            })
            .unwrap();
        (ClinicalService::new(store), patient.id, nurse.profile.id)
    }

    fn vitals_input(patient_id: i64, nurse_id: i64) -> VitalSignsInput {
        VitalSignsInput {
            patient_id,
            nurse_profile_id: nurse_id,
            temperature: Some(36.8),
            temperature_unit: "C".into(),
            bp_systolic: Some(120),
            bp_diastolic: Some(80),
            heart_rate: Some(72),
            respiratory_rate: None,
            oxygen_saturation: Some(98.0),
            weight: Some(72.0),
            height: Some(170.0),
        }
    }

    #[test]
    fn bmi_computed_from_weight_and_height() {
        let (svc, patient_id, nurse_id) = fixture();
        let vitals = svc.record_vitals(&vitals_input(patient_id, nurse_id)).unwrap();
        let bmi = vitals.bmi.unwrap();
        assert!((bmi - 24.913).abs() < 0.01);
        assert_eq!(vitals.blood_pressure().as_deref(), Some("120/80"));
    }

    #[test]
    fn bmi_absent_without_height() {
        let (svc, patient_id, nurse_id) = fixture();
        let mut input = vitals_input(patient_id, nurse_id);
        input.height = None;
        let vitals = svc.record_vitals(&input).unwrap();
        assert!(vitals.bmi.is_none());
    }

    #[test]
    fn saturation_is_bounded() {
        let (svc, patient_id, nurse_id) = fixture();
        let mut input = vitals_input(patient_id, nurse_id);
        input.oxygen_saturation = Some(130.0);
        assert!(svc.record_vitals(&input).is_err());
    }

    #[test]
    fn notes_listed_for_patient() {
        let (svc, patient_id, nurse_id) = fixture();
        svc.add_note(patient_id, nurse_id, "general", "Dressing changed").unwrap();
        svc.add_note(patient_id, nurse_id, "medication", "Analgesia given").unwrap();
        assert_eq!(svc.notes_for_patient(patient_id).unwrap().len(), 2);
        assert!(svc.add_note(patient_id, nurse_id, "general", "  ").is_err());
    }

    #[test]
    fn visit_numbers_are_sequential() {
        let (svc, patient_id, doctor_id) = fixture();
        let input = VisitInput {
            patient_id,
            doctor_profile_id: doctor_id,
            appointment_id: None,
            chief_complaint: "Leg wound".into(),
            history_of_present_illness: "Two weeks".into(),
            past_medical_history: String::new(),
            physical_examination: "Ulcer on left shin".into(),
            assessment: "Venous ulcer".into(),
            diagnosis: "Venous ulcer".into(),
            treatment_plan: "Compression".into(),
            follow_up_date: None,
            next_visit_date: None,
        };
        let first = svc.create_visit(&input).unwrap();
        let second = svc.create_visit(&input).unwrap();
        assert_eq!(first.visit_number, "VIS-00001");
        assert_eq!(second.visit_number, "VIS-00002");
        assert_eq!(svc.visits_for_patient(patient_id).unwrap().len(), 2);
    }
}
