//! Inpatient admissions and radiology requests.

use crate::db::now_rfc3339;
use crate::repositories::appointments::require_row;
use crate::repositories::enum_value;
use crate::sequence::{self, SequenceKind};
use crate::{HmisError, HmisResult, Store};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    Admitted,
    Discharged,
    Transferred,
}

impl AdmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AdmissionStatus::Admitted => "admitted",
            AdmissionStatus::Discharged => "discharged",
            AdmissionStatus::Transferred => "transferred",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admitted" => Some(AdmissionStatus::Admitted),
            "discharged" => Some(AdmissionStatus::Discharged),
            "transferred" => Some(AdmissionStatus::Transferred),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admission {
    pub id: i64,
    pub admission_number: String,
    pub patient_id: i64,
    pub doctor_profile_id: i64,
    pub ward: String,
    pub bed_number: String,
    pub admission_date: String,
    pub discharge_date: Option<String>,
    pub diagnosis: String,
    pub status: AdmissionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadiologyStatus {
    Requested,
    Scheduled,
    Completed,
    Cancelled,
}

impl RadiologyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RadiologyStatus::Requested => "requested",
            RadiologyStatus::Scheduled => "scheduled",
            RadiologyStatus::Completed => "completed",
            RadiologyStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(RadiologyStatus::Requested),
            "scheduled" => Some(RadiologyStatus::Scheduled),
            "completed" => Some(RadiologyStatus::Completed),
            "cancelled" => Some(RadiologyStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadiologyRequest {
    pub id: i64,
    pub request_number: String,
    pub patient_id: i64,
    pub doctor_profile_id: i64,
    pub examination_type: String,
    pub clinical_info: String,
    pub status: RadiologyStatus,
    pub requested_at: String,
}

#[derive(Clone)]
pub struct InpatientService {
    store: Store,
}

impl InpatientService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Admit a patient, allocating the ADM number. A patient may hold only
    /// one open admission at a time.
    pub fn admit(
        &self,
        patient_id: i64,
        doctor_profile_id: i64,
        ward: &str,
        bed_number: &str,
        diagnosis: &str,
    ) -> HmisResult<Admission> {
        if ward.trim().is_empty() || bed_number.trim().is_empty() {
            return Err(HmisError::InvalidInput("ward and bed are required".into()));
        }
        let mut conn = self.store.conn();
        require_row(&conn, "patients", "patient", patient_id)?;
        require_row(&conn, "user_profiles", "user profile", doctor_profile_id)?;
        let open: i64 = conn.query_row(
            "SELECT COUNT(*) FROM inpatient_admissions WHERE patient_id = ?1 AND status = 'admitted'",
            params![patient_id],
            |row| row.get(0),
        )?;
        if open > 0 {
            return Err(HmisError::InvalidInput(format!(
                "patient {patient_id} already has an open admission"
            )));
        }
        let number = sequence::allocate_on(&mut conn, SequenceKind::Admission)?;
        conn.execute(
            "INSERT INTO inpatient_admissions
                 (admission_number, patient_id, doctor_profile_id, ward, bed_number,
                  admission_date, diagnosis)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![number, patient_id, doctor_profile_id, ward, bed_number, now_rfc3339(), diagnosis],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.admission(id)
    }

    pub fn admission(&self, id: i64) -> HmisResult<Admission> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {ADMISSION_COLUMNS} FROM inpatient_admissions WHERE id = ?1"),
                params![id],
                admission_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("admission", id))
    }

    pub fn discharge(&self, id: i64) -> HmisResult<Admission> {
        let admission = self.admission(id)?;
        if admission.status != AdmissionStatus::Admitted {
            return Err(HmisError::InvalidInput(format!(
                "{} is not an open admission",
                admission.admission_number
            )));
        }
        self.store.conn().execute(
            "UPDATE inpatient_admissions SET status = 'discharged', discharge_date = ?1 WHERE id = ?2",
            params![now_rfc3339(), id],
        )?;
        self.admission(id)
    }

    pub fn open_admissions(&self) -> HmisResult<Vec<Admission>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ADMISSION_COLUMNS} FROM inpatient_admissions
             WHERE status = 'admitted' ORDER BY admission_date"
        ))?;
        let rows = stmt
            .query_map([], admission_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Request an imaging examination, allocating the RAD number.
    pub fn request_imaging(
        &self,
        patient_id: i64,
        doctor_profile_id: i64,
        examination_type: &str,
        clinical_info: &str,
    ) -> HmisResult<RadiologyRequest> {
        if examination_type.trim().is_empty() {
            return Err(HmisError::InvalidInput("examination type is required".into()));
        }
        let mut conn = self.store.conn();
        require_row(&conn, "patients", "patient", patient_id)?;
        require_row(&conn, "user_profiles", "user profile", doctor_profile_id)?;
        let number = sequence::allocate_on(&mut conn, SequenceKind::RadiologyRequest)?;
        conn.execute(
            "INSERT INTO radiology_requests
                 (request_number, patient_id, doctor_profile_id, examination_type, clinical_info,
                  requested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![number, patient_id, doctor_profile_id, examination_type, clinical_info, now_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.imaging_request(id)
    }

    pub fn imaging_request(&self, id: i64) -> HmisResult<RadiologyRequest> {
        self.store
            .conn()
            .query_row(
                "SELECT id, request_number, patient_id, doctor_profile_id, examination_type,
                        clinical_info, status, requested_at
                 FROM radiology_requests WHERE id = ?1",
                params![id],
                radiology_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("radiology request", id))
    }

    pub fn set_imaging_status(&self, id: i64, status: &str) -> HmisResult<RadiologyRequest> {
        let next = enum_value("status", status, RadiologyStatus::parse)?;
        self.imaging_request(id)?;
        self.store.conn().execute(
            "UPDATE radiology_requests SET status = ?1 WHERE id = ?2",
            params![next.as_str(), id],
        )?;
        self.imaging_request(id)
    }

    pub fn imaging_for_patient(&self, patient_id: i64) -> HmisResult<Vec<RadiologyRequest>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id, request_number, patient_id, doctor_profile_id, examination_type,
                    clinical_info, status, requested_at
             FROM radiology_requests WHERE patient_id = ?1 ORDER BY requested_at DESC",
        )?;
        let rows = stmt
            .query_map(params![patient_id], radiology_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

const ADMISSION_COLUMNS: &str = "id, admission_number, patient_id, doctor_profile_id, ward, \
                                 bed_number, admission_date, discharge_date, diagnosis, status";

fn admission_row(row: &rusqlite::Row) -> rusqlite::Result<Admission> {
    let status: String = row.get(9)?;
    Ok(Admission {
        id: row.get(0)?,
        admission_number: row.get(1)?,
        patient_id: row.get(2)?,
        doctor_profile_id: row.get(3)?,
        ward: row.get(4)?,
        bed_number: row.get(5)?,
        admission_date: row.get(6)?,
        discharge_date: row.get(7)?,
        diagnosis: row.get(8)?,
        status: AdmissionStatus::parse(&status).unwrap_or(AdmissionStatus::Admitted),
    })
}

fn radiology_row(row: &rusqlite::Row) -> rusqlite::Result<RadiologyRequest> {
    let status: String = row.get(6)?;
    Ok(RadiologyRequest {
        id: row.get(0)?,
        request_number: row.get(1)?,
        patient_id: row.get(2)?,
        doctor_profile_id: row.get(3)?,
        examination_type: row.get(4)?,
        clinical_info: row.get(5)?,
        status: RadiologyStatus::parse(&status).unwrap_or(RadiologyStatus::Requested),
        requested_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::Role;
    use crate::repositories::identity::{IdentityService, NewStaff};
    use crate::repositories::patients::{sample_input, PatientService};

    fn fixture() -> (InpatientService, i64, i64) {
        let store = Store::open_in_memory().unwrap();
        let patient = PatientService::new(store.clone())
            .create(&sample_input("MRN-0001"))
            .unwrap();
        let doctor = IdentityService::new(store.clone())
            .create_staff(&NewStaff {
                username: "doc".into(),
                password: "longenough".into(),
                email: String::new(),
                first_name: "A".into(),
                last_name: "B".into(),
                role: Role::Doctor,
                employee_id: Some("EMP-001".into()),
                department_id: None,
                phone: String::new(),
                specialization: String::new(),
            })
            .unwrap();
        (InpatientService::new(store), patient.id, doctor.profile.id)
    }

    #[test]
    fn one_open_admission_per_patient() {
        let (svc, patient_id, doctor_id) = fixture();
        let admission = svc
            .admit(patient_id, doctor_id, "Ward 3", "B12", "Sepsis")
            .unwrap();
        assert_eq!(admission.admission_number, "ADM-00001");
        assert!(svc.admit(patient_id, doctor_id, "Ward 3", "B13", "Sepsis").is_err());

        svc.discharge(admission.id).unwrap();
        assert!(svc.open_admissions().unwrap().is_empty());
        // A discharged patient can be readmitted.
        let next = svc
            .admit(patient_id, doctor_id, "Ward 1", "A01", "Review")
            .unwrap();
        assert_eq!(next.admission_number, "ADM-00002");
    }

    #[test]
    fn discharge_requires_open_admission() {
        let (svc, patient_id, doctor_id) = fixture();
        let admission = svc
            .admit(patient_id, doctor_id, "Ward 3", "B12", "Sepsis")
            .unwrap();
        svc.discharge(admission.id).unwrap();
        assert!(svc.discharge(admission.id).is_err());
    }

    #[test]
    fn imaging_request_lifecycle() {
        let (svc, patient_id, doctor_id) = fixture();
        let request = svc
            .request_imaging(patient_id, doctor_id, "X-ray left foot", "Rule out osteomyelitis")
            .unwrap();
        assert_eq!(request.request_number, "RAD-00001");
        assert_eq!(request.status, RadiologyStatus::Requested);
        let done = svc.set_imaging_status(request.id, "completed").unwrap();
        assert_eq!(done.status, RadiologyStatus::Completed);
        assert!(svc.set_imaging_status(request.id, "bogus").is_err());
    }
}
