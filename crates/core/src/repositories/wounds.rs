//! Wound-care case management.
//!
//! Creating a case allocates its WND identifier, derives the one-shot
//! surface area and opens a zero-charge billing record in the same
//! transaction. Observers (doctors' notifications, the wound-updates topic)
//! are told afterwards, best-effort.

use crate::db::now_rfc3339;
use crate::derived;
use crate::events::{EventBus, WoundUpdate};
use crate::rbac::Role;
use crate::repositories::appointments::require_row;
use crate::repositories::enum_value;
use crate::repositories::notifications::{NotificationContent, NotificationService};
use crate::sequence::{self, SequenceKind};
use crate::{HmisError, HmisResult, Store};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WoundStatus {
    Active,
    Pending,
    Healing,
    Resolved,
    Closed,
}

impl WoundStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WoundStatus::Active => "active",
            WoundStatus::Pending => "pending",
            WoundStatus::Healing => "healing",
            WoundStatus::Resolved => "resolved",
            WoundStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(WoundStatus::Active),
            "pending" => Some(WoundStatus::Pending),
            "healing" => Some(WoundStatus::Healing),
            "resolved" => Some(WoundStatus::Resolved),
            "closed" => Some(WoundStatus::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WoundCase {
    pub id: i64,
    pub wound_id: String,
    pub patient_id: i64,
    pub wound_type_id: Option<i64>,
    pub body_part_id: Option<i64>,
    pub laterality: String,
    pub assessment_date: String,
    pub assessed_by_profile_id: Option<i64>,
    pub length_cm: Option<f64>,
    pub width_cm: Option<f64>,
    pub depth_cm: Option<f64>,
    pub surface_area_cm2: Option<f64>,
    pub appearance: String,
    pub exudate: String,
    pub exudate_amount: String,
    pub pain_level: Option<i64>,
    pub has_edema: bool,
    pub edema_grade: String,
    pub signs_of_infection: bool,
    pub infection_notes: String,
    pub status: WoundStatus,
    pub next_visit_date: Option<NaiveDate>,
    pub clinical_notes: String,
    pub treatment_plan: String,
    pub insurance_covers: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WoundCaseInput {
    pub patient_id: i64,
    #[serde(default)]
    pub wound_type_id: Option<i64>,
    #[serde(default)]
    pub body_part_id: Option<i64>,
    #[serde(default)]
    pub laterality: String,
    #[serde(default)]
    pub assessed_by_profile_id: Option<i64>,
    #[serde(default)]
    pub length_cm: Option<f64>,
    #[serde(default)]
    pub width_cm: Option<f64>,
    #[serde(default)]
    pub depth_cm: Option<f64>,
    #[serde(default)]
    pub appearance: String,
    #[serde(default)]
    pub exudate: String,
    #[serde(default)]
    pub exudate_amount: String,
    #[serde(default)]
    pub pain_level: Option<i64>,
    #[serde(default)]
    pub has_edema: bool,
    #[serde(default)]
    pub edema_grade: String,
    #[serde(default)]
    pub signs_of_infection: bool,
    #[serde(default)]
    pub infection_notes: String,
    #[serde(default)]
    pub next_visit_date: Option<NaiveDate>,
    #[serde(default)]
    pub clinical_notes: String,
    #[serde(default)]
    pub treatment_plan: String,
    #[serde(default)]
    pub insurance_covers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WoundTreatment {
    pub id: i64,
    pub wound_case_id: i64,
    pub procedure: String,
    pub dressing_type: String,
    pub medications_applied: String,
    pub performed_by_profile_id: Option<i64>,
    pub performed_at: String,
    pub notes: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreatmentInput {
    pub procedure: String,
    #[serde(default)]
    pub dressing_type: String,
    #[serde(default)]
    pub medications_applied: String,
    #[serde(default)]
    pub performed_by_profile_id: Option<i64>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WoundFollowup {
    pub id: i64,
    pub wound_case_id: i64,
    pub visit_date: String,
    pub length_cm: Option<f64>,
    pub width_cm: Option<f64>,
    pub depth_cm: Option<f64>,
    pub healing_progress: String,
    pub notes: String,
    pub next_visit_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowupInput {
    #[serde(default)]
    pub length_cm: Option<f64>,
    #[serde(default)]
    pub width_cm: Option<f64>,
    #[serde(default)]
    pub depth_cm: Option<f64>,
    #[serde(default)]
    pub healing_progress: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub next_visit_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WoundStats {
    pub total: i64,
    pub active: i64,
    pub healing: i64,
    pub resolved: i64,
    pub pending: i64,
    pub recent: i64,
}

#[derive(Clone)]
pub struct WoundService {
    store: Store,
    bus: EventBus,
    notifications: NotificationService,
}

impl WoundService {
    pub fn new(store: Store, bus: EventBus) -> Self {
        let notifications = NotificationService::new(store.clone(), bus.clone());
        Self {
            store,
            bus,
            notifications,
        }
    }

    /// Open a wound case.
    ///
    /// Allocates the WND identifier, derives the surface area from the
    /// initial dimensions and opens the paired zero-charge billing record.
    /// The case and its billing row commit together.
    pub fn create(&self, input: &WoundCaseInput) -> HmisResult<WoundCase> {
        validate(input)?;
        let mut conn = self.store.conn();
        require_row(&conn, "patients", "patient", input.patient_id)?;
        if let Some(id) = input.wound_type_id {
            require_row(&conn, "wound_types", "wound type", id)?;
        }
        if let Some(id) = input.body_part_id {
            require_row(&conn, "body_parts", "body part", id)?;
        }
        if let Some(id) = input.assessed_by_profile_id {
            require_row(&conn, "user_profiles", "user profile", id)?;
        }

        let wound_id = sequence::allocate_on(&mut conn, SequenceKind::WoundCase)?;
        let area = derived::one_shot_surface_area(input.length_cm, input.width_cm, None);
        let now = now_rfc3339();

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO wound_cases
                 (wound_id, patient_id, wound_type_id, body_part_id, laterality,
                  assessment_date, assessed_by_profile_id, length_cm, width_cm, depth_cm,
                  surface_area_cm2, appearance, exudate, exudate_amount, pain_level,
                  has_edema, edema_grade, signs_of_infection, infection_notes,
                  next_visit_date, clinical_notes, treatment_plan, insurance_covers)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
            params![
                wound_id,
                input.patient_id,
                input.wound_type_id,
                input.body_part_id,
                input.laterality,
                now,
                input.assessed_by_profile_id,
                input.length_cm,
                input.width_cm,
                input.depth_cm,
                area,
                input.appearance,
                input.exudate,
                input.exudate_amount,
                input.pain_level,
                input.has_edema,
                input.edema_grade,
                input.signs_of_infection,
                input.infection_notes,
                input.next_visit_date,
                input.clinical_notes,
                input.treatment_plan,
                input.insurance_covers,
            ],
        )?;
        let id = tx.last_insert_rowid();
        // Every case carries a billing record from birth, opened at zero.
        tx.execute(
            "INSERT INTO wound_billing (wound_case_id, updated_at) VALUES (?1, ?2)",
            params![id, now],
        )?;
        tx.commit()?;
        drop(conn);

        let case = self.get(id)?;
        self.publish(&case, "created");
        let mut content = NotificationContent::new(
            "New wound case",
            format!("{} opened for patient {}", case.wound_id, case.patient_id),
        );
        content.notification_type = "wound_case".into();
        content.related_wound_case_id = Some(case.id);
        content.related_patient_id = Some(case.patient_id);
        self.notifications.notify_role(Role::Doctor, &content);
        Ok(case)
    }

    pub fn get(&self, id: i64) -> HmisResult<WoundCase> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM wound_cases WHERE id = ?1"),
                params![id],
                wound_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("wound case", id))
    }

    pub fn get_by_wound_id(&self, wound_id: &str) -> HmisResult<Option<WoundCase>> {
        let found = self
            .store
            .conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM wound_cases WHERE wound_id = ?1"),
                params![wound_id],
                wound_row,
            )
            .optional()?;
        Ok(found)
    }

    /// Full update, last write wins. The surface area is one-shot: a stored
    /// value survives any later edits to the dimensions, and an unset value
    /// is derived now if both dimensions arrived.
    pub fn update(&self, id: i64, input: &WoundCaseInput) -> HmisResult<WoundCase> {
        validate(input)?;
        let current = self.get(id)?;
        let area = derived::one_shot_surface_area(
            input.length_cm,
            input.width_cm,
            current.surface_area_cm2,
        );
        self.store.conn().execute(
            "UPDATE wound_cases SET
                 wound_type_id = ?1, body_part_id = ?2, laterality = ?3,
                 assessed_by_profile_id = ?4, length_cm = ?5, width_cm = ?6, depth_cm = ?7,
                 surface_area_cm2 = ?8, appearance = ?9, exudate = ?10, exudate_amount = ?11,
                 pain_level = ?12, has_edema = ?13, edema_grade = ?14,
                 signs_of_infection = ?15, infection_notes = ?16, next_visit_date = ?17,
                 clinical_notes = ?18, treatment_plan = ?19, insurance_covers = ?20
             WHERE id = ?21",
            params![
                input.wound_type_id,
                input.body_part_id,
                input.laterality,
                input.assessed_by_profile_id,
                input.length_cm,
                input.width_cm,
                input.depth_cm,
                area,
                input.appearance,
                input.exudate,
                input.exudate_amount,
                input.pain_level,
                input.has_edema,
                input.edema_grade,
                input.signs_of_infection,
                input.infection_notes,
                input.next_visit_date,
                input.clinical_notes,
                input.treatment_plan,
                input.insurance_covers,
                id,
            ],
        )?;
        let case = self.get(id)?;
        self.publish(&case, "updated");
        Ok(case)
    }

    pub fn set_status(&self, id: i64, status: &str) -> HmisResult<WoundCase> {
        let next = enum_value("status", status, WoundStatus::parse)?;
        self.get(id)?;
        self.store.conn().execute(
            "UPDATE wound_cases SET status = ?1 WHERE id = ?2",
            params![next.as_str(), id],
        )?;
        let case = self.get(id)?;
        self.publish(&case, "status_changed");
        Ok(case)
    }

    pub fn list(&self) -> HmisResult<Vec<WoundCase>> {
        self.list_where("is_active = 1", params![])
    }

    pub fn list_for_patient(&self, patient_id: i64) -> HmisResult<Vec<WoundCase>> {
        self.list_where("patient_id = ?1 AND is_active = 1", params![patient_id])
    }

    pub fn add_treatment(
        &self,
        wound_case_id: i64,
        input: &TreatmentInput,
    ) -> HmisResult<WoundTreatment> {
        if input.procedure.trim().is_empty() {
            return Err(HmisError::InvalidInput("procedure is required".into()));
        }
        let case = self.get(wound_case_id)?;
        let conn = self.store.conn();
        if let Some(id) = input.performed_by_profile_id {
            require_row(&conn, "user_profiles", "user profile", id)?;
        }
        conn.execute(
            "INSERT INTO wound_treatments
                 (wound_case_id, procedure, dressing_type, medications_applied,
                  performed_by_profile_id, performed_at, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                wound_case_id,
                input.procedure,
                input.dressing_type,
                input.medications_applied,
                input.performed_by_profile_id,
                now_rfc3339(),
                input.notes,
            ],
        )?;
        let id = conn.last_insert_rowid();
        let created = conn.query_row(
            &format!("SELECT {TREATMENT_COLUMNS} FROM wound_treatments WHERE id = ?1"),
            params![id],
            treatment_row,
        )?;
        drop(conn);
        self.publish(&case, "treated");
        Ok(created)
    }

    pub fn treatments(&self, wound_case_id: i64) -> HmisResult<Vec<WoundTreatment>> {
        self.get(wound_case_id)?;
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TREATMENT_COLUMNS} FROM wound_treatments
             WHERE wound_case_id = ?1 ORDER BY performed_at DESC, id DESC"
        ))?;
        let rows = stmt
            .query_map(params![wound_case_id], treatment_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Record a follow-up visit. Follow-up measurements never touch the
    /// case's stored surface area.
    pub fn add_followup(
        &self,
        wound_case_id: i64,
        input: &FollowupInput,
    ) -> HmisResult<WoundFollowup> {
        let case = self.get(wound_case_id)?;
        let conn = self.store.conn();
        conn.execute(
            "INSERT INTO wound_followups
                 (wound_case_id, visit_date, length_cm, width_cm, depth_cm,
                  healing_progress, notes, next_visit_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                wound_case_id,
                now_rfc3339(),
                input.length_cm,
                input.width_cm,
                input.depth_cm,
                input.healing_progress,
                input.notes,
                input.next_visit_date,
            ],
        )?;
        let id = conn.last_insert_rowid();
        let created = conn.query_row(
            &format!("SELECT {FOLLOWUP_COLUMNS} FROM wound_followups WHERE id = ?1"),
            params![id],
            followup_row,
        )?;
        drop(conn);
        self.publish(&case, "followup");
        Ok(created)
    }

    pub fn followups(&self, wound_case_id: i64) -> HmisResult<Vec<WoundFollowup>> {
        self.get(wound_case_id)?;
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FOLLOWUP_COLUMNS} FROM wound_followups
             WHERE wound_case_id = ?1 ORDER BY visit_date DESC, id DESC"
        ))?;
        let rows = stmt
            .query_map(params![wound_case_id], followup_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Case counts by status plus cases assessed in the last 30 days.
    pub fn stats(&self) -> HmisResult<WoundStats> {
        let cutoff = (Utc::now() - chrono::Duration::days(30))
            .format("%Y-%m-%d")
            .to_string();
        let stats = self.store.conn().query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'active'), 0),
                    COALESCE(SUM(status = 'healing'), 0),
                    COALESCE(SUM(status = 'resolved'), 0),
                    COALESCE(SUM(status = 'pending'), 0),
                    COALESCE(SUM(assessment_date >= ?1), 0)
             FROM wound_cases WHERE is_active = 1",
            params![cutoff],
            |row| {
                Ok(WoundStats {
                    total: row.get(0)?,
                    active: row.get(1)?,
                    healing: row.get(2)?,
                    resolved: row.get(3)?,
                    pending: row.get(4)?,
                    recent: row.get(5)?,
                })
            },
        )?;
        Ok(stats)
    }

    fn list_where(
        &self,
        predicate: &str,
        params: impl rusqlite::Params,
    ) -> HmisResult<Vec<WoundCase>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM wound_cases WHERE {predicate} ORDER BY assessment_date DESC"
        ))?;
        let rows = stmt
            .query_map(params, wound_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn publish(&self, case: &WoundCase, kind: &'static str) {
        self.bus.publish_wound_update(&WoundUpdate {
            wound_case_id: case.id,
            wound_id: case.wound_id.clone(),
            patient_id: case.patient_id,
            status: case.status.as_str().into(),
            kind,
        });
    }
}

fn validate(input: &WoundCaseInput) -> HmisResult<()> {
    if let Some(pain) = input.pain_level {
        if !(0..=10).contains(&pain) {
            return Err(HmisError::InvalidInput(
                "pain level must be between 0 and 10".into(),
            ));
        }
    }
    for (field, value) in [
        ("length_cm", input.length_cm),
        ("width_cm", input.width_cm),
        ("depth_cm", input.depth_cm),
    ] {
        if let Some(v) = value {
            if v < 0.0 {
                return Err(HmisError::InvalidInput(format!("{field} cannot be negative")));
            }
        }
    }
    Ok(())
}

const COLUMNS: &str = "id, wound_id, patient_id, wound_type_id, body_part_id, laterality, \
                       assessment_date, assessed_by_profile_id, length_cm, width_cm, depth_cm, \
                       surface_area_cm2, appearance, exudate, exudate_amount, pain_level, \
                       has_edema, edema_grade, signs_of_infection, infection_notes, status, \
                       next_visit_date, clinical_notes, treatment_plan, insurance_covers, \
                       is_active";

fn wound_row(row: &rusqlite::Row) -> rusqlite::Result<WoundCase> {
    let status: String = row.get(20)?;
    Ok(WoundCase {
        id: row.get(0)?,
        wound_id: row.get(1)?,
        patient_id: row.get(2)?,
        wound_type_id: row.get(3)?,
        body_part_id: row.get(4)?,
        laterality: row.get(5)?,
        assessment_date: row.get(6)?,
        assessed_by_profile_id: row.get(7)?,
        length_cm: row.get(8)?,
        width_cm: row.get(9)?,
        depth_cm: row.get(10)?,
        surface_area_cm2: row.get(11)?,
        appearance: row.get(12)?,
        exudate: row.get(13)?,
        exudate_amount: row.get(14)?,
        pain_level: row.get(15)?,
        has_edema: row.get(16)?,
        edema_grade: row.get(17)?,
        signs_of_infection: row.get(18)?,
        infection_notes: row.get(19)?,
        status: WoundStatus::parse(&status).unwrap_or(WoundStatus::Active),
        next_visit_date: row.get(21)?,
        clinical_notes: row.get(22)?,
        treatment_plan: row.get(23)?,
        insurance_covers: row.get(24)?,
        is_active: row.get(25)?,
    })
}

const TREATMENT_COLUMNS: &str = "id, wound_case_id, procedure, dressing_type, \
                                 medications_applied, performed_by_profile_id, performed_at, notes";

fn treatment_row(row: &rusqlite::Row) -> rusqlite::Result<WoundTreatment> {
    Ok(WoundTreatment {
        id: row.get(0)?,
        wound_case_id: row.get(1)?,
        procedure: row.get(2)?,
        dressing_type: row.get(3)?,
        medications_applied: row.get(4)?,
        performed_by_profile_id: row.get(5)?,
        performed_at: row.get(6)?,
        notes: row.get(7)?,
    })
}

const FOLLOWUP_COLUMNS: &str = "id, wound_case_id, visit_date, length_cm, width_cm, depth_cm, \
                                healing_progress, notes, next_visit_date";

fn followup_row(row: &rusqlite::Row) -> rusqlite::Result<WoundFollowup> {
    Ok(WoundFollowup {
        id: row.get(0)?,
        wound_case_id: row.get(1)?,
        visit_date: row.get(2)?,
        length_cm: row.get(3)?,
        width_cm: row.get(4)?,
        depth_cm: row.get(5)?,
        healing_progress: row.get(6)?,
        notes: row.get(7)?,
        next_visit_date: row.get(8)?,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::rbac::Role;
    use crate::repositories::identity::{IdentityService, NewStaff};
    use crate::repositories::patients::{sample_input, PatientService};

    pub struct WoundFixture {
        pub store: Store,
        pub bus: EventBus,
        pub svc: WoundService,
        pub patient_id: i64,
        pub doctor_id: i64,
    }

    pub fn fixture() -> WoundFixture {
        let store = Store::open_in_memory().unwrap();
        let bus = EventBus::new();
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
        WoundFixture {
            svc: WoundService::new(store.clone(), bus.clone()),
            store,
            bus,
            patient_id: patient.id,
            doctor_id: doctor.profile.id,
        }
    }

    pub fn case_input(patient_id: i64) -> WoundCaseInput {
        WoundCaseInput {
            patient_id,
            wound_type_id: None,
            body_part_id: None,
            laterality: "left".into(),
            assessed_by_profile_id: None,
            length_cm: Some(4.0),
            width_cm: Some(3.0),
            depth_cm: Some(0.5),
            appearance: "granulating".into(),
            exudate: "serous".into(),
            exudate_amount: "moderate".into(),
            pain_level: Some(4),
            has_edema: false,
            edema_grade: String::new(),
            signs_of_infection: false,
            infection_notes: String::new(),
            next_visit_date: None,
            clinical_notes: String::new(),
            treatment_plan: "Daily dressing".into(),
            insurance_covers: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{case_input, fixture};
    use super::*;
    use hmis_types::Money;

    #[test]
    fn create_allocates_wnd_id_and_zero_billing() {
        let f = fixture();
        let case = f.svc.create(&case_input(f.patient_id)).unwrap();
        assert_eq!(case.wound_id, "WND-00001");
        assert_eq!(case.status, WoundStatus::Active);

        let (total, balance, status): (i64, i64, String) = f
            .store
            .conn()
            .query_row(
                "SELECT total_amount, balance, payment_status FROM wound_billing
                 WHERE wound_case_id = ?1",
                params![case.id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(Money::from_minor(total), Money::ZERO);
        assert_eq!(Money::from_minor(balance), Money::ZERO);
        assert_eq!(status, "pending");
    }

    #[test]
    fn surface_area_is_one_shot() {
        let f = fixture();
        let case = f.svc.create(&case_input(f.patient_id)).unwrap();
        assert_eq!(case.surface_area_cm2, Some(12.0));

        // Later edit grows the wound; stored area must not move.
        let mut input = case_input(f.patient_id);
        input.length_cm = Some(6.0);
        let updated = f.svc.update(case.id, &input).unwrap();
        assert_eq!(updated.length_cm, Some(6.0));
        assert_eq!(updated.surface_area_cm2, Some(12.0));
    }

    #[test]
    fn missing_dimension_defers_area_until_update() {
        let f = fixture();
        let mut input = case_input(f.patient_id);
        input.width_cm = None;
        let case = f.svc.create(&input).unwrap();
        assert_eq!(case.surface_area_cm2, None);

        // Both dimensions finally present: derive once, now.
        input.width_cm = Some(2.0);
        let updated = f.svc.update(case.id, &input).unwrap();
        assert_eq!(updated.surface_area_cm2, Some(8.0));
    }

    #[test]
    fn followup_measurements_leave_area_alone() {
        let f = fixture();
        let case = f.svc.create(&case_input(f.patient_id)).unwrap();
        f.svc
            .add_followup(
                case.id,
                &FollowupInput {
                    length_cm: Some(2.0),
                    width_cm: Some(1.5),
                    depth_cm: None,
                    healing_progress: "improving".into(),
                    notes: String::new(),
                    next_visit_date: None,
                },
            )
            .unwrap();
        assert_eq!(f.svc.get(case.id).unwrap().surface_area_cm2, Some(12.0));
        assert_eq!(f.svc.followups(case.id).unwrap().len(), 1);
    }

    #[test]
    fn create_notifies_doctors_and_publishes() {
        let f = fixture();
        let mut topic = f.bus.subscribe_wound_updates();
        let mut feed = f.bus.subscribe_user(f.doctor_id);

        let case = f.svc.create(&case_input(f.patient_id)).unwrap();
        let event = topic.try_recv().unwrap();
        assert!(event.contains(&case.wound_id));
        let push = feed.try_recv().unwrap();
        assert!(push.contains("New wound case"));
    }

    #[test]
    fn pain_level_bounded() {
        let f = fixture();
        let mut input = case_input(f.patient_id);
        input.pain_level = Some(11);
        assert!(matches!(
            f.svc.create(&input).unwrap_err(),
            HmisError::InvalidInput(_)
        ));
    }

    #[test]
    fn wnd_ids_are_sequential() {
        let f = fixture();
        let a = f.svc.create(&case_input(f.patient_id)).unwrap();
        let b = f.svc.create(&case_input(f.patient_id)).unwrap();
        assert_eq!(a.wound_id, "WND-00001");
        assert_eq!(b.wound_id, "WND-00002");
        assert_eq!(f.svc.list_for_patient(f.patient_id).unwrap().len(), 2);
    }

    #[test]
    fn status_change_publishes() {
        let f = fixture();
        let case = f.svc.create(&case_input(f.patient_id)).unwrap();
        let mut topic = f.bus.subscribe_wound_updates();
        let resolved = f.svc.set_status(case.id, "resolved").unwrap();
        assert_eq!(resolved.status, WoundStatus::Resolved);
        assert!(topic.try_recv().unwrap().contains("resolved"));
        let stats = f.svc.stats().unwrap();
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.recent, 1);
    }

    #[test]
    fn treatments_require_procedure() {
        let f = fixture();
        let case = f.svc.create(&case_input(f.patient_id)).unwrap();
        assert!(f
            .svc
            .add_treatment(case.id, &TreatmentInput {
                procedure: " ".into(),
                dressing_type: String::new(),
                medications_applied: String::new(),
                performed_by_profile_id: None,
                notes: String::new(),
            })
            .is_err());
        f.svc
            .add_treatment(case.id, &TreatmentInput {
                procedure: "Debridement".into(),
                dressing_type: "foam".into(),
                medications_applied: String::new(),
                performed_by_profile_id: Some(f.doctor_id),
                notes: String::new(),
            })
            .unwrap();
        assert_eq!(f.svc.treatments(case.id).unwrap().len(), 1);
    }
}
