//! Laboratory: test catalogue, requests and results.
//!
//! A request carries one or more catalogue tests; results are entered per
//! test and the request moves through requested -> collected -> processing
//! -> completed. Completion is derived: the request completes when every
//! ordered test has a result.

use crate::db::now_rfc3339;
use crate::events::EventBus;
use crate::rbac::Role;
use crate::repositories::appointments::require_row;
use crate::repositories::enum_value;
use crate::repositories::notifications::{NotificationContent, NotificationService};
use crate::sequence::{self, SequenceKind};
use crate::{HmisError, HmisResult, Store};
use hmis_types::Money;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabRequestStatus {
    Requested,
    Collected,
    Processing,
    Completed,
    Cancelled,
}

impl LabRequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LabRequestStatus::Requested => "requested",
            LabRequestStatus::Collected => "collected",
            LabRequestStatus::Processing => "processing",
            LabRequestStatus::Completed => "completed",
            LabRequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(LabRequestStatus::Requested),
            "collected" => Some(LabRequestStatus::Collected),
            "processing" => Some(LabRequestStatus::Processing),
            "completed" => Some(LabRequestStatus::Completed),
            "cancelled" => Some(LabRequestStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabTest {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub normal_range: String,
    pub unit: String,
    pub category: String,
    pub turnaround_time: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabRequest {
    pub id: i64,
    pub request_number: String,
    pub patient_id: i64,
    pub doctor_profile_id: i64,
    pub priority: String,
    pub status: LabRequestStatus,
    pub clinical_info: String,
    pub requested_at: String,
    pub completed_at: Option<String>,
    pub technician_profile_id: Option<i64>,
    pub test_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabResult {
    pub id: i64,
    pub lab_request_id: i64,
    pub lab_test_id: i64,
    pub result: String,
    pub reference_range: String,
    pub flag: String,
    pub notes: String,
    pub technician_profile_id: i64,
    pub verified_by_profile_id: Option<i64>,
    pub verified_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabRequestInput {
    pub patient_id: i64,
    pub doctor_profile_id: i64,
    pub test_ids: Vec<i64>,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub clinical_info: String,
}

fn default_priority() -> String {
    "routine".into()
}

#[derive(Clone)]
pub struct LaboratoryService {
    store: Store,
    notifications: NotificationService,
}

impl LaboratoryService {
    pub fn new(store: Store, bus: EventBus) -> Self {
        let notifications = NotificationService::new(store.clone(), bus);
        Self { store, notifications }
    }

    pub fn ensure_test(
        &self,
        name: &str,
        category: &str,
        price: Money,
        normal_range: &str,
        unit: &str,
    ) -> HmisResult<i64> {
        let conn = self.store.conn();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM lab_tests WHERE name = ?1 AND category = ?2",
                params![name, category],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        conn.execute(
            "INSERT INTO lab_tests (name, category, price, normal_range, unit)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, category, price.minor(), normal_range, unit],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn tests(&self) -> HmisResult<Vec<LabTest>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, price, normal_range, unit, category,
                    turnaround_time, is_active
             FROM lab_tests WHERE is_active = 1 ORDER BY category, name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LabTest {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    price: Money::from_minor(row.get(3)?),
                    normal_range: row.get(4)?,
                    unit: row.get(5)?,
                    category: row.get(6)?,
                    turnaround_time: row.get(7)?,
                    is_active: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Order tests for a patient, allocating the LAB request number.
    pub fn create_request(&self, input: &LabRequestInput) -> HmisResult<LabRequest> {
        if input.test_ids.is_empty() {
            return Err(HmisError::InvalidInput(
                "a lab request needs at least one test".into(),
            ));
        }
        let mut conn = self.store.conn();
        require_row(&conn, "patients", "patient", input.patient_id)?;
        require_row(&conn, "user_profiles", "user profile", input.doctor_profile_id)?;
        for test_id in &input.test_ids {
            require_row(&conn, "lab_tests", "lab test", *test_id)?;
        }
        let request_number = sequence::allocate_on(&mut conn, SequenceKind::LabRequest)?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO lab_requests
                 (request_number, patient_id, doctor_profile_id, priority, clinical_info,
                  requested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                request_number,
                input.patient_id,
                input.doctor_profile_id,
                input.priority,
                input.clinical_info,
                now_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        for test_id in &input.test_ids {
            tx.execute(
                "INSERT OR IGNORE INTO lab_request_tests (lab_request_id, lab_test_id)
                 VALUES (?1, ?2)",
                params![id, test_id],
            )?;
        }
        tx.commit()?;
        drop(conn);
        self.request(id)
    }

    pub fn request(&self, id: i64) -> HmisResult<LabRequest> {
        let conn = self.store.conn();
        let mut request = conn
            .query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM lab_requests WHERE id = ?1"),
                params![id],
                request_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("lab request", id))?;
        let mut stmt = conn.prepare(
            "SELECT lab_test_id FROM lab_request_tests WHERE lab_request_id = ?1 ORDER BY lab_test_id",
        )?;
        request.test_ids = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(request)
    }

    pub fn requests_for_patient(&self, patient_id: i64) -> HmisResult<Vec<LabRequest>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id FROM lab_requests WHERE patient_id = ?1 ORDER BY requested_at DESC",
        )?;
        let ids = stmt
            .query_map(params![patient_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        drop(stmt);
        drop(conn);
        ids.into_iter().map(|id| self.request(id)).collect()
    }

    pub fn pending_requests(&self) -> HmisResult<Vec<LabRequest>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id FROM lab_requests
             WHERE status NOT IN ('completed', 'cancelled')
             ORDER BY requested_at",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        drop(stmt);
        drop(conn);
        ids.into_iter().map(|id| self.request(id)).collect()
    }

    pub fn set_status(
        &self,
        id: i64,
        status: &str,
        technician_profile_id: Option<i64>,
    ) -> HmisResult<LabRequest> {
        let next = enum_value("status", status, LabRequestStatus::parse)?;
        self.request(id)?;
        let completed_at = match next {
            LabRequestStatus::Completed => Some(now_rfc3339()),
            _ => None,
        };
        self.store.conn().execute(
            "UPDATE lab_requests
             SET status = ?1,
                 completed_at = COALESCE(?2, completed_at),
                 technician_profile_id = COALESCE(?3, technician_profile_id)
             WHERE id = ?4",
            params![next.as_str(), completed_at, technician_profile_id, id],
        )?;
        self.request(id)
    }

    /// Enter a result for one ordered test. When every ordered test has a
    /// result the request is marked completed.
    pub fn enter_result(
        &self,
        request_id: i64,
        test_id: i64,
        result: &str,
        flag: &str,
        notes: &str,
        technician_profile_id: i64,
    ) -> HmisResult<LabResult> {
        if result.trim().is_empty() {
            return Err(HmisError::InvalidInput("result value is required".into()));
        }
        let request = self.request(request_id)?;
        if !request.test_ids.contains(&test_id) {
            return Err(HmisError::InvalidInput(format!(
                "test {test_id} was not ordered on {}",
                request.request_number
            )));
        }
        let conn = self.store.conn();
        let reference_range: String = conn.query_row(
            "SELECT normal_range FROM lab_tests WHERE id = ?1",
            params![test_id],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO lab_results
                 (lab_request_id, lab_test_id, result, reference_range, flag, notes,
                  technician_profile_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                request_id,
                test_id,
                result,
                reference_range,
                flag,
                notes,
                technician_profile_id,
            ],
        )?;
        let result_id = conn.last_insert_rowid();

        let resulted: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT lab_test_id) FROM lab_results WHERE lab_request_id = ?1",
            params![request_id],
            |row| row.get(0),
        )?;
        let completed = resulted as usize >= request.test_ids.len();
        if completed {
            conn.execute(
                "UPDATE lab_requests
                 SET status = 'completed', completed_at = ?1,
                     technician_profile_id = COALESCE(technician_profile_id, ?2)
                 WHERE id = ?3",
                params![now_rfc3339(), technician_profile_id, request_id],
            )?;
        } else {
            conn.execute(
                "UPDATE lab_requests SET status = 'processing' WHERE id = ?1 AND status = 'requested'",
                params![request_id],
            )?;
        }

        let created = conn.query_row(
            &format!("SELECT {RESULT_COLUMNS} FROM lab_results WHERE id = ?1"),
            params![result_id],
            result_row,
        )?;
        drop(conn);

        if completed {
            let mut content = NotificationContent::new(
                "Lab results ready",
                format!("All results are in for {}", request.request_number),
            );
            content.notification_type = "lab_result".into();
            content.related_patient_id = Some(request.patient_id);
            if let Err(e) = self.notifications.send(request.doctor_profile_id, &content) {
                tracing::warn!("failed to notify requesting doctor: {e}");
            }
            self.notifications.notify_role(Role::LabTech, &content);
        }
        Ok(created)
    }

    pub fn results_for_request(&self, request_id: i64) -> HmisResult<Vec<LabResult>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESULT_COLUMNS} FROM lab_results WHERE lab_request_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![request_id], result_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn verify_result(&self, result_id: i64, verifier_profile_id: i64) -> HmisResult<()> {
        let changed = self.store.conn().execute(
            "UPDATE lab_results SET verified_by_profile_id = ?1, verified_at = ?2 WHERE id = ?3",
            params![verifier_profile_id, now_rfc3339(), result_id],
        )?;
        if changed == 0 {
            return Err(HmisError::not_found("lab result", result_id));
        }
        Ok(())
    }
}

const REQUEST_COLUMNS: &str = "id, request_number, patient_id, doctor_profile_id, priority, \
                               status, clinical_info, requested_at, completed_at, \
                               technician_profile_id";

fn request_row(row: &rusqlite::Row) -> rusqlite::Result<LabRequest> {
    let status: String = row.get(5)?;
    Ok(LabRequest {
        id: row.get(0)?,
        request_number: row.get(1)?,
        patient_id: row.get(2)?,
        doctor_profile_id: row.get(3)?,
        priority: row.get(4)?,
        status: LabRequestStatus::parse(&status).unwrap_or(LabRequestStatus::Requested),
        clinical_info: row.get(6)?,
        requested_at: row.get(7)?,
        completed_at: row.get(8)?,
        technician_profile_id: row.get(9)?,
        test_ids: Vec::new(),
    })
}

const RESULT_COLUMNS: &str = "id, lab_request_id, lab_test_id, result, reference_range, flag, \
                              notes, technician_profile_id, verified_by_profile_id, verified_at";

fn result_row(row: &rusqlite::Row) -> rusqlite::Result<LabResult> {
    Ok(LabResult {
        id: row.get(0)?,
        lab_request_id: row.get(1)?,
        lab_test_id: row.get(2)?,
        result: row.get(3)?,
        reference_range: row.get(4)?,
        flag: row.get(5)?,
        notes: row.get(6)?,
        technician_profile_id: row.get(7)?,
        verified_by_profile_id: row.get(8)?,
        verified_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::Role;
    use crate::repositories::identity::{IdentityService, NewStaff};
    use crate::repositories::patients::{sample_input, PatientService};

    struct Fixture {
        svc: LaboratoryService,
        store: Store,
        bus: EventBus,
        patient_id: i64,
        doctor_id: i64,
        fbc: i64,
        glucose: i64,
    }

    fn fixture() -> Fixture {
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
        let bus = EventBus::new();
        let svc = LaboratoryService::new(store.clone(), bus.clone());
        let fbc = svc
            .ensure_test("Full Blood Count", "haematology", Money::from_major(150), "", "")
            .unwrap();
        let glucose = svc
            .ensure_test("Fasting Glucose", "chemistry", Money::from_major(80), "3.9-5.5", "mmol/L")
            .unwrap();
        Fixture {
            svc,
            store,
            bus,
            patient_id: patient.id,
            doctor_id: doctor.profile.id,
            fbc,
            glucose,
        }
    }

    fn request(f: &Fixture, tests: Vec<i64>) -> LabRequest {
        f.svc
            .create_request(&LabRequestInput {
                patient_id: f.patient_id,
                doctor_profile_id: f.doctor_id,
                test_ids: tests,
                priority: "routine".into(),
                clinical_info: String::new(),
            })
            .unwrap()
    }

    #[test]
    fn request_numbers_use_lab_prefix() {
        let f = fixture();
        let req = request(&f, vec![f.fbc]);
        assert_eq!(req.request_number, "LAB-00001");
        assert_eq!(req.status, LabRequestStatus::Requested);
        assert_eq!(req.test_ids, vec![f.fbc]);
    }

    #[test]
    fn empty_test_list_rejected() {
        let f = fixture();
        let err = f
            .svc
            .create_request(&LabRequestInput {
                patient_id: f.patient_id,
                doctor_profile_id: f.doctor_id,
                test_ids: vec![],
                priority: "routine".into(),
                clinical_info: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, HmisError::InvalidInput(_)));
    }

    #[test]
    fn completion_derived_from_results() {
        let f = fixture();
        let req = request(&f, vec![f.fbc, f.glucose]);

        f.svc
            .enter_result(req.id, f.fbc, "normal", "", "", f.doctor_id)
            .unwrap();
        let partial = f.svc.request(req.id).unwrap();
        assert_eq!(partial.status, LabRequestStatus::Processing);
        assert!(partial.completed_at.is_none());

        let result = f
            .svc
            .enter_result(req.id, f.glucose, "5.1", "", "", f.doctor_id)
            .unwrap();
        assert_eq!(result.reference_range, "3.9-5.5");
        let done = f.svc.request(req.id).unwrap();
        assert_eq!(done.status, LabRequestStatus::Completed);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn completion_notifies_doctor_and_technicians() {
        let f = fixture();
        let tech = IdentityService::new(f.store.clone())
            .create_staff(&NewStaff {
                username: "tech".into(),
                password: "longenough".into(),
                email: String::new(),
                first_name: "T".into(),
                last_name: "B".into(),
                role: Role::LabTech,
                employee_id: Some("EMP-002".into()),
                department_id: None,
                phone: String::new(),
                specialization: String::new(),
            })
            .unwrap();
        let inbox = NotificationService::new(f.store.clone(), f.bus.clone());
        let req = request(&f, vec![f.fbc, f.glucose]);

        f.svc
            .enter_result(req.id, f.fbc, "normal", "", "", f.doctor_id)
            .unwrap();
        // Nothing goes out while results are still outstanding.
        assert_eq!(inbox.unread_count(f.doctor_id).unwrap(), 0);

        f.svc
            .enter_result(req.id, f.glucose, "5.1", "", "", f.doctor_id)
            .unwrap();
        let for_doctor = inbox.list_for(f.doctor_id, true).unwrap();
        assert_eq!(for_doctor.len(), 1);
        assert!(for_doctor[0].message.contains(&req.request_number));
        assert_eq!(inbox.unread_count(tech.profile.id).unwrap(), 1);
    }

    #[test]
    fn result_for_unordered_test_rejected() {
        let f = fixture();
        let req = request(&f, vec![f.fbc]);
        let err = f
            .svc
            .enter_result(req.id, f.glucose, "5.1", "", "", f.doctor_id)
            .unwrap_err();
        assert!(matches!(err, HmisError::InvalidInput(_)));
    }

    #[test]
    fn pending_excludes_terminal_requests() {
        let f = fixture();
        let a = request(&f, vec![f.fbc]);
        request(&f, vec![f.glucose]);
        f.svc.set_status(a.id, "cancelled", None).unwrap();
        assert_eq!(f.svc.pending_requests().unwrap().len(), 1);
        // The per-patient listing still shows both.
        assert_eq!(f.svc.requests_for_patient(f.patient_id).unwrap().len(), 2);
    }
}
