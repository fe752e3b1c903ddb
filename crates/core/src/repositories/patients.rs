//! Patient registry.
//!
//! The medical record number is caller-supplied and unique; age is derived
//! from the date of birth at read time and never stored. Deletion is a soft
//! `is_active` flip so history stays referable.

use crate::db::now_rfc3339;
use crate::derived;
use crate::repositories::{enum_value, map_unique};
use crate::{HmisError, HmisResult, Store};
use chrono::{NaiveDate, Utc};
use hmis_types::NonEmptyText;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Other => "O",
        }
    }

    pub fn parse(s: &str) -> Option<Gender> {
        match s {
            "M" => Some(Gender::Male),
            "F" => Some(Gender::Female),
            "O" => Some(Gender::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub marital_status: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub emergency_contact_name: String,
    pub emergency_contact_phone: String,
    pub medical_record_number: String,
    pub national_id: String,
    pub insurance_provider_id: Option<i64>,
    pub medical_scheme_id: Option<i64>,
    pub registration_date: String,
    pub is_active: bool,
}

impl Patient {
    pub fn full_name(&self) -> String {
        if self.middle_name.is_empty() {
            format!("{} {}", self.first_name, self.last_name)
        } else {
            format!("{} {} {}", self.first_name, self.middle_name, self.last_name)
        }
    }

    /// Derived age in whole years, today.
    pub fn age(&self) -> i32 {
        derived::age_on(self.date_of_birth, Utc::now().date_naive())
    }
}

/// Input for creating or fully updating a patient record.
#[derive(Debug, Clone, Deserialize)]
pub struct PatientInput {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub middle_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    #[serde(default)]
    pub marital_status: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub emergency_contact_name: String,
    #[serde(default)]
    pub emergency_contact_phone: String,
    pub medical_record_number: String,
    #[serde(default)]
    pub national_id: String,
    #[serde(default)]
    pub insurance_provider_id: Option<i64>,
    #[serde(default)]
    pub medical_scheme_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientStats {
    pub total: i64,
    pub active: i64,
    pub male: i64,
    pub female: i64,
    pub registered_this_month: i64,
}

#[derive(Clone)]
pub struct PatientService {
    store: Store,
}

impl PatientService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Register a patient.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on missing names or a future date of birth,
    /// `InvalidEnum` on an unknown gender code, `Duplicate` on a taken
    /// medical record number.
    pub fn create(&self, input: &PatientInput) -> HmisResult<Patient> {
        let gender = validate(input)?;
        let mrn = input.medical_record_number.trim();
        let conn = self.store.conn();
        conn.execute(
            "INSERT INTO patients
                 (first_name, last_name, middle_name, date_of_birth, gender, marital_status,
                  phone, email, address, emergency_contact_name, emergency_contact_phone,
                  medical_record_number, national_id, insurance_provider_id, medical_scheme_id,
                  registration_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                input.first_name.trim(),
                input.last_name.trim(),
                input.middle_name.trim(),
                input.date_of_birth,
                gender.as_str(),
                input.marital_status,
                input.phone,
                input.email,
                input.address,
                input.emergency_contact_name,
                input.emergency_contact_phone,
                mrn,
                input.national_id,
                input.insurance_provider_id,
                input.medical_scheme_id,
                now_rfc3339(),
            ],
        )
        .map_err(|e| map_unique(e, "medical_record_number", mrn))?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.get(id)
    }

    pub fn get(&self, id: i64) -> HmisResult<Patient> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM patients WHERE id = ?1"),
                params![id],
                patient_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("patient", id))
    }

    pub fn get_by_mrn(&self, mrn: &str) -> HmisResult<Option<Patient>> {
        let found = self
            .store
            .conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM patients WHERE medical_record_number = ?1"),
                params![mrn],
                patient_row,
            )
            .optional()?;
        Ok(found)
    }

    /// Full update, last write wins. The medical record number may change as
    /// long as it stays unique.
    pub fn update(&self, id: i64, input: &PatientInput) -> HmisResult<Patient> {
        let gender = validate(input)?;
        let mrn = input.medical_record_number.trim();
        let changed = self
            .store
            .conn()
            .execute(
                "UPDATE patients SET
                     first_name = ?1, last_name = ?2, middle_name = ?3, date_of_birth = ?4,
                     gender = ?5, marital_status = ?6, phone = ?7, email = ?8, address = ?9,
                     emergency_contact_name = ?10, emergency_contact_phone = ?11,
                     medical_record_number = ?12, national_id = ?13,
                     insurance_provider_id = ?14, medical_scheme_id = ?15
                 WHERE id = ?16",
                params![
                    input.first_name.trim(),
                    input.last_name.trim(),
                    input.middle_name.trim(),
                    input.date_of_birth,
                    gender.as_str(),
                    input.marital_status,
                    input.phone,
                    input.email,
                    input.address,
                    input.emergency_contact_name,
                    input.emergency_contact_phone,
                    mrn,
                    input.national_id,
                    input.insurance_provider_id,
                    input.medical_scheme_id,
                    id,
                ],
            )
            .map_err(|e| map_unique(e, "medical_record_number", mrn))?;
        if changed == 0 {
            return Err(HmisError::not_found("patient", id));
        }
        self.get(id)
    }

    /// Soft delete. The record and everything referencing it survive.
    pub fn deactivate(&self, id: i64) -> HmisResult<()> {
        let changed = self
            .store
            .conn()
            .execute("UPDATE patients SET is_active = 0 WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(HmisError::not_found("patient", id));
        }
        Ok(())
    }

    pub fn list(&self, include_inactive: bool) -> HmisResult<Vec<Patient>> {
        let conn = self.store.conn();
        let sql = if include_inactive {
            format!("SELECT {COLUMNS} FROM patients ORDER BY last_name, first_name")
        } else {
            format!(
                "SELECT {COLUMNS} FROM patients WHERE is_active = 1 ORDER BY last_name, first_name"
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], patient_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn stats(&self) -> HmisResult<PatientStats> {
        let conn = self.store.conn();
        let (total, active, male, female): (i64, i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(is_active), 0),
                    COALESCE(SUM(gender = 'M'), 0),
                    COALESCE(SUM(gender = 'F'), 0)
             FROM patients",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        let month_prefix = Utc::now().format("%Y-%m").to_string();
        let registered_this_month: i64 = conn.query_row(
            "SELECT COUNT(*) FROM patients WHERE registration_date LIKE ?1 || '%'",
            params![month_prefix],
            |row| row.get(0),
        )?;
        Ok(PatientStats {
            total,
            active,
            male,
            female,
            registered_this_month,
        })
    }
}

fn validate(input: &PatientInput) -> HmisResult<Gender> {
    for (field, value) in [
        ("first name", &input.first_name),
        ("last name", &input.last_name),
        ("medical record number", &input.medical_record_number),
    ] {
        NonEmptyText::new(value)
            .map_err(|_| HmisError::InvalidInput(format!("{field} is required")))?;
    }
    if input.date_of_birth > Utc::now().date_naive() {
        return Err(HmisError::InvalidInput(
            "date of birth cannot be in the future".into(),
        ));
    }
    enum_value("gender", &input.gender, Gender::parse)
}

const COLUMNS: &str = "id, first_name, last_name, middle_name, date_of_birth, gender, \
                       marital_status, phone, email, address, emergency_contact_name, \
                       emergency_contact_phone, medical_record_number, national_id, \
                       insurance_provider_id, medical_scheme_id, registration_date, is_active";

fn patient_row(row: &rusqlite::Row) -> rusqlite::Result<Patient> {
    let gender: String = row.get(5)?;
    Ok(Patient {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        middle_name: row.get(3)?,
        date_of_birth: row.get(4)?,
        gender: Gender::parse(&gender).unwrap_or(Gender::Other),
        marital_status: row.get(6)?,
        phone: row.get(7)?,
        email: row.get(8)?,
        address: row.get(9)?,
        emergency_contact_name: row.get(10)?,
        emergency_contact_phone: row.get(11)?,
        medical_record_number: row.get(12)?,
        national_id: row.get(13)?,
        insurance_provider_id: row.get(14)?,
        medical_scheme_id: row.get(15)?,
        registration_date: row.get(16)?,
        is_active: row.get(17)?,
    })
}

#[cfg(test)]
pub(crate) fn sample_input(mrn: &str) -> PatientInput {
    PatientInput {
        first_name: "Chanda".into(),
        last_name: "Mulenga".into(),
        middle_name: String::new(),
        date_of_birth: NaiveDate::from_ymd_opt(1985, 3, 20).unwrap(),
        gender: "F".into(),
        marital_status: "married".into(),
        phone: "+260971234567".into(),
        email: String::new(),
        address: "Lusaka".into(),
        emergency_contact_name: String::new(),
        emergency_contact_phone: String::new(),
        medical_record_number: mrn.into(),
        national_id: String::new(),
        insurance_provider_id: None,
        medical_scheme_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> PatientService {
        PatientService::new(Store::open_in_memory().unwrap())
    }

    #[test]
    fn create_and_fetch() {
        let svc = service();
        let patient = svc.create(&sample_input("MRN-0001")).unwrap();
        assert_eq!(patient.full_name(), "Chanda Mulenga");
        assert!(patient.is_active);
        assert_eq!(svc.get(patient.id).unwrap().medical_record_number, "MRN-0001");
        assert!(svc.get_by_mrn("MRN-0001").unwrap().is_some());
    }

    #[test]
    fn mrn_is_unique() {
        let svc = service();
        svc.create(&sample_input("MRN-0001")).unwrap();
        let err = svc.create(&sample_input("MRN-0001")).unwrap_err();
        assert!(matches!(
            err,
            HmisError::Duplicate { field: "medical_record_number", .. }
        ));
    }

    #[test]
    fn unknown_gender_rejected() {
        let svc = service();
        let mut input = sample_input("MRN-0002");
        input.gender = "X".into();
        assert!(matches!(
            svc.create(&input).unwrap_err(),
            HmisError::InvalidEnum { .. }
        ));
    }

    #[test]
    fn future_dob_rejected() {
        let svc = service();
        let mut input = sample_input("MRN-0003");
        input.date_of_birth = Utc::now().date_naive() + chrono::Days::new(1);
        assert!(matches!(
            svc.create(&input).unwrap_err(),
            HmisError::InvalidInput(_)
        ));
    }

    #[test]
    fn deactivation_is_soft() {
        let svc = service();
        let patient = svc.create(&sample_input("MRN-0004")).unwrap();
        svc.deactivate(patient.id).unwrap();
        // Record still fetchable, just flagged.
        assert!(!svc.get(patient.id).unwrap().is_active);
        assert_eq!(svc.list(false).unwrap().len(), 0);
        assert_eq!(svc.list(true).unwrap().len(), 1);
    }

    #[test]
    fn update_is_full_replace() {
        let svc = service();
        let patient = svc.create(&sample_input("MRN-0005")).unwrap();
        let mut input = sample_input("MRN-0005");
        input.phone = "+260977654321".into();
        let updated = svc.update(patient.id, &input).unwrap();
        assert_eq!(updated.phone, "+260977654321");
    }

    #[test]
    fn stats_count_active_gender_and_monthly() {
        let svc = service();
        let a = svc.create(&sample_input("MRN-0006")).unwrap();
        svc.create(&sample_input("MRN-0007")).unwrap();
        let mut male = sample_input("MRN-0008");
        male.first_name = "Bwalya".into();
        male.gender = "M".into();
        svc.create(&male).unwrap();
        svc.deactivate(a.id).unwrap();
        let stats = svc.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.male, 1);
        assert_eq!(stats.female, 2);
        assert_eq!(stats.registered_this_month, 3);
    }
}
