//! Appointment scheduling.

use crate::db::now_rfc3339;
use crate::events::{AppointmentUpdate, EventBus};
use crate::repositories::enum_value;
use crate::repositories::notifications::{NotificationContent, NotificationService};
use crate::{HmisError, HmisResult, Store};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    CheckedIn,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::CheckedIn => "checked_in",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "checked_in" => Some(AppointmentStatus::CheckedIn),
            "in_progress" => Some(AppointmentStatus::InProgress),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "no_show" => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_profile_id: i64,
    pub clinic_id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub appointment_type: String,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentInput {
    pub patient_id: i64,
    pub doctor_profile_id: i64,
    pub clinic_id: i64,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default = "default_type")]
    pub appointment_type: String,
    #[serde(default)]
    pub notes: String,
}

fn default_type() -> String {
    "consultation".into()
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentStats {
    pub total: i64,
    pub today: i64,
    pub upcoming: i64,
    pub completed: i64,
    pub cancelled: i64,
}

#[derive(Clone)]
pub struct AppointmentService {
    store: Store,
    bus: EventBus,
    notifications: NotificationService,
}

impl AppointmentService {
    pub fn new(store: Store, bus: EventBus) -> Self {
        let notifications = NotificationService::new(store.clone(), bus.clone());
        Self {
            store,
            bus,
            notifications,
        }
    }

    /// Book an appointment. Referenced patient, doctor and clinic must exist;
    /// the slot must not be in the past.
    pub fn create(&self, input: &AppointmentInput) -> HmisResult<Appointment> {
        if input.scheduled_at < Utc::now() {
            return Err(HmisError::InvalidInput(
                "appointment cannot be scheduled in the past".into(),
            ));
        }
        let conn = self.store.conn();
        require_row(&conn, "patients", "patient", input.patient_id)?;
        require_row(&conn, "user_profiles", "user profile", input.doctor_profile_id)?;
        require_row(&conn, "clinics", "clinic", input.clinic_id)?;

        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO appointments
                 (patient_id, doctor_profile_id, clinic_id, scheduled_at, appointment_type,
                  notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                input.patient_id,
                input.doctor_profile_id,
                input.clinic_id,
                input.scheduled_at,
                input.appointment_type,
                input.notes,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        let appointment = self.get(id)?;
        self.publish(&appointment, "created");
        Ok(appointment)
    }

    pub fn get(&self, id: i64) -> HmisResult<Appointment> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM appointments WHERE id = ?1"),
                params![id],
                appointment_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("appointment", id))
    }

    /// Move an appointment to a new status. Any status may follow any other;
    /// front-desk corrections routinely reopen completed or no-show bookings.
    pub fn set_status(&self, id: i64, status: &str) -> HmisResult<Appointment> {
        let next = enum_value("status", status, AppointmentStatus::parse)?;
        self.get(id)?;
        self.store.conn().execute(
            "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![next.as_str(), now_rfc3339(), id],
        )?;
        let appointment = self.get(id)?;
        self.publish(&appointment, "status_changed");
        Ok(appointment)
    }

    /// Reschedule to a new future slot; resets a confirmed booking back to
    /// scheduled.
    pub fn reschedule(&self, id: i64, scheduled_at: DateTime<Utc>) -> HmisResult<Appointment> {
        if scheduled_at < Utc::now() {
            return Err(HmisError::InvalidInput(
                "appointment cannot be scheduled in the past".into(),
            ));
        }
        self.get(id)?;
        self.store.conn().execute(
            "UPDATE appointments SET scheduled_at = ?1, status = 'scheduled', updated_at = ?2
             WHERE id = ?3",
            params![scheduled_at, now_rfc3339(), id],
        )?;
        let appointment = self.get(id)?;
        self.publish(&appointment, "rescheduled");
        Ok(appointment)
    }

    /// Remind the doctor about a booking. The stored notification doubles as
    /// the reminder record.
    pub fn send_reminder(&self, id: i64) -> HmisResult<Appointment> {
        let appointment = self.get(id)?;
        let mut content = NotificationContent::new(
            "Appointment reminder",
            format!(
                "Patient {} is booked for {}",
                appointment.patient_id,
                appointment.scheduled_at.to_rfc3339()
            ),
        );
        content.notification_type = "appointment".into();
        content.related_appointment_id = Some(appointment.id);
        content.related_patient_id = Some(appointment.patient_id);
        self.notifications.send(appointment.doctor_profile_id, &content)?;
        Ok(appointment)
    }

    pub fn list_for_patient(&self, patient_id: i64) -> HmisResult<Vec<Appointment>> {
        self.list_where("patient_id = ?1", params![patient_id])
    }

    pub fn list_for_doctor(&self, doctor_profile_id: i64) -> HmisResult<Vec<Appointment>> {
        self.list_where("doctor_profile_id = ?1", params![doctor_profile_id])
    }

    pub fn list_today(&self) -> HmisResult<Vec<Appointment>> {
        let prefix = Utc::now().format("%Y-%m-%d").to_string();
        self.list_where("scheduled_at LIKE ?1 || '%'", params![prefix])
    }

    pub fn list(&self) -> HmisResult<Vec<Appointment>> {
        self.list_where("1 = 1", params![])
    }

    pub fn stats(&self) -> HmisResult<AppointmentStats> {
        let conn = self.store.conn();
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let now = now_rfc3339();
        let row = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(scheduled_at LIKE ?1 || '%'), 0),
                    COALESCE(SUM(scheduled_at > ?2 AND status IN ('scheduled', 'confirmed')), 0),
                    COALESCE(SUM(status = 'completed'), 0),
                    COALESCE(SUM(status = 'cancelled'), 0)
             FROM appointments",
            params![today, now],
            |row| {
                Ok(AppointmentStats {
                    total: row.get(0)?,
                    today: row.get(1)?,
                    upcoming: row.get(2)?,
                    completed: row.get(3)?,
                    cancelled: row.get(4)?,
                })
            },
        )?;
        Ok(row)
    }

    fn list_where(
        &self,
        predicate: &str,
        params: impl rusqlite::Params,
    ) -> HmisResult<Vec<Appointment>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM appointments WHERE {predicate} ORDER BY scheduled_at"
        ))?;
        let rows = stmt
            .query_map(params, appointment_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn publish(&self, appointment: &Appointment, kind: &'static str) {
        self.bus.publish_appointment_update(&AppointmentUpdate {
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            status: appointment.status.as_str().into(),
            kind,
        });
    }
}

pub(crate) fn require_row(
    conn: &rusqlite::Connection,
    table: &str,
    entity: &'static str,
    id: i64,
) -> HmisResult<()> {
    let exists: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE id = ?1"),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(HmisError::not_found(entity, id));
    }
    Ok(())
}

const COLUMNS: &str = "id, patient_id, doctor_profile_id, clinic_id, scheduled_at, status, \
                       appointment_type, notes, created_at, updated_at";

fn appointment_row(row: &rusqlite::Row) -> rusqlite::Result<Appointment> {
    let status: String = row.get(5)?;
    Ok(Appointment {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_profile_id: row.get(2)?,
        clinic_id: row.get(3)?,
        scheduled_at: row.get(4)?,
        status: AppointmentStatus::parse(&status).unwrap_or(AppointmentStatus::Scheduled),
        appointment_type: row.get(6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::Role;
    use crate::repositories::identity::{IdentityService, NewStaff};
    use crate::repositories::patients::{sample_input, PatientService};
    use crate::repositories::reference::ReferenceService;
    use chrono::Days;

    struct Fixture {
        svc: AppointmentService,
        store: Store,
        bus: EventBus,
        patient_id: i64,
        doctor_id: i64,
        clinic_id: i64,
    }

    fn fixture() -> Fixture {
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
        let reference = ReferenceService::new(store.clone());
        let dept = reference.ensure_department("Wound Care", "").unwrap();
        let clinic_id = reference.ensure_clinic("Walk-in", dept).unwrap();
        Fixture {
            svc: AppointmentService::new(store.clone(), bus.clone()),
            store,
            bus,
            patient_id: patient.id,
            doctor_id: doctor.profile.id,
            clinic_id,
        }
    }

    fn input(f: &Fixture, days_ahead: u64) -> AppointmentInput {
        AppointmentInput {
            patient_id: f.patient_id,
            doctor_profile_id: f.doctor_id,
            clinic_id: f.clinic_id,
            scheduled_at: Utc::now() + chrono::Duration::days(days_ahead as i64),
            appointment_type: "consultation".into(),
            notes: String::new(),
        }
    }

    #[test]
    fn create_defaults_to_scheduled() {
        let f = fixture();
        let appt = f.svc.create(&input(&f, 2)).unwrap();
        assert_eq!(appt.status, AppointmentStatus::Scheduled);
    }

    #[test]
    fn past_slot_rejected() {
        let f = fixture();
        let mut i = input(&f, 1);
        i.scheduled_at = Utc::now() - chrono::Duration::hours(1);
        assert!(matches!(
            f.svc.create(&i).unwrap_err(),
            HmisError::InvalidInput(_)
        ));
    }

    #[test]
    fn missing_patient_is_not_found() {
        let f = fixture();
        let mut i = input(&f, 1);
        i.patient_id = 999;
        assert!(matches!(
            f.svc.create(&i).unwrap_err(),
            HmisError::NotFound { entity: "patient", .. }
        ));
    }

    #[test]
    fn any_status_may_follow_any_other() {
        let f = fixture();
        let appt = f.svc.create(&input(&f, 2)).unwrap();
        f.svc.set_status(appt.id, "checked_in").unwrap();
        f.svc.set_status(appt.id, "completed").unwrap();
        // A completed booking can be reopened or moved; there is no terminal
        // state.
        let reopened = f.svc.set_status(appt.id, "scheduled").unwrap();
        assert_eq!(reopened.status, AppointmentStatus::Scheduled);
        f.svc.set_status(appt.id, "no_show").unwrap();
        let moved = f
            .svc
            .reschedule(appt.id, Utc::now() + chrono::Duration::days(3))
            .unwrap();
        assert_eq!(moved.status, AppointmentStatus::Scheduled);
    }

    #[test]
    fn status_change_publishes_event() {
        let f = fixture();
        let mut rx = f.svc.bus.subscribe_appointments();
        let appt = f.svc.create(&input(&f, 2)).unwrap();
        let created = rx.try_recv().unwrap();
        assert!(created.contains("\"created\""));
        f.svc.set_status(appt.id, "confirmed").unwrap();
        let changed = rx.try_recv().unwrap();
        assert!(changed.contains("\"confirmed\""));
    }

    #[test]
    fn reschedule_resets_to_scheduled() {
        let f = fixture();
        let appt = f.svc.create(&input(&f, 2)).unwrap();
        f.svc.set_status(appt.id, "confirmed").unwrap();
        let moved = f
            .svc
            .reschedule(appt.id, Utc::now() + Days::new(5))
            .unwrap();
        assert_eq!(moved.status, AppointmentStatus::Scheduled);
    }

    #[test]
    fn reminder_lands_in_doctors_inbox() {
        let f = fixture();
        let appt = f.svc.create(&input(&f, 2)).unwrap();
        let inbox = NotificationService::new(f.store.clone(), f.bus.clone());
        f.svc.send_reminder(appt.id).unwrap();
        let unread = inbox.list_for(f.doctor_id, true).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].title, "Appointment reminder");
        assert_eq!(unread[0].related_appointment_id, Some(appt.id));
        assert!(f.svc.send_reminder(999).is_err());
    }

    #[test]
    fn stats_bucket_by_status() {
        let f = fixture();
        let a = f.svc.create(&input(&f, 1)).unwrap();
        f.svc.create(&input(&f, 2)).unwrap();
        f.svc.set_status(a.id, "cancelled").unwrap();
        let stats = f.svc.stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.upcoming, 1);
    }
}
