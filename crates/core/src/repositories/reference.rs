//! Reference data: departments, clinics, payers, wound lookups, suppliers.
//!
//! These tables change rarely and are mostly written by seeding; the service
//! therefore exposes idempotent `ensure_*` upserts keyed on the unique name
//! alongside the plain CRUD used by the admin surface.

use crate::db::now_rfc3339;
use crate::repositories::map_unique;
use crate::{HmisError, HmisResult, Store};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub head_account_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clinic {
    pub id: i64,
    pub name: String,
    pub department_id: i64,
    pub description: String,
    pub location: String,
    pub phone: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceProvider {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub contact_person: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalScheme {
    pub id: i64,
    pub name: String,
    pub insurance_provider_id: i64,
    pub description: String,
    pub coverage_percentage: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WoundType {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub description: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyPart {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub contact_person: String,
    pub is_active: bool,
}

#[derive(Clone)]
pub struct ReferenceService {
    store: Store,
}

impl ReferenceService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn create_department(&self, name: &str, description: &str) -> HmisResult<Department> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HmisError::InvalidInput("department name is required".into()));
        }
        let conn = self.store.conn();
        conn.execute(
            "INSERT INTO departments (name, description, created_at) VALUES (?1, ?2, ?3)",
            params![name, description, now_rfc3339()],
        )
        .map_err(|e| map_unique(e, "name", name))?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.department(id)
    }

    pub fn department(&self, id: i64) -> HmisResult<Department> {
        self.store
            .conn()
            .query_row(
                "SELECT id, name, description, head_account_id, created_at
                 FROM departments WHERE id = ?1",
                params![id],
                department_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("department", id))
    }

    pub fn departments(&self) -> HmisResult<Vec<Department>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, head_account_id, created_at
             FROM departments ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], department_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Upsert a department by its unique name, returning its id.
    pub fn ensure_department(&self, name: &str, description: &str) -> HmisResult<i64> {
        let conn = self.store.conn();
        conn.execute(
            "INSERT OR IGNORE INTO departments (name, description, created_at)
             VALUES (?1, ?2, ?3)",
            params![name, description, now_rfc3339()],
        )?;
        let id = conn.query_row(
            "SELECT id FROM departments WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn create_clinic(
        &self,
        name: &str,
        department_id: i64,
        description: &str,
        location: &str,
        phone: &str,
    ) -> HmisResult<Clinic> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HmisError::InvalidInput("clinic name is required".into()));
        }
        // Validate the department up front for a clean 404 instead of an FK error.
        self.department(department_id)?;
        let conn = self.store.conn();
        conn.execute(
            "INSERT INTO clinics (name, department_id, description, location, phone)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, department_id, description, location, phone],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.clinic(id)
    }

    pub fn clinic(&self, id: i64) -> HmisResult<Clinic> {
        self.store
            .conn()
            .query_row(
                "SELECT id, name, department_id, description, location, phone, is_active
                 FROM clinics WHERE id = ?1",
                params![id],
                clinic_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("clinic", id))
    }

    pub fn clinics(&self) -> HmisResult<Vec<Clinic>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, department_id, description, location, phone, is_active
             FROM clinics WHERE is_active = 1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], clinic_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn ensure_clinic(&self, name: &str, department_id: i64) -> HmisResult<i64> {
        let conn = self.store.conn();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM clinics WHERE name = ?1 AND department_id = ?2",
                params![name, department_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        conn.execute(
            "INSERT INTO clinics (name, department_id) VALUES (?1, ?2)",
            params![name, department_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn create_insurance_provider(
        &self,
        name: &str,
        address: &str,
        phone: &str,
        email: &str,
        contact_person: &str,
    ) -> HmisResult<InsuranceProvider> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HmisError::InvalidInput("provider name is required".into()));
        }
        let conn = self.store.conn();
        conn.execute(
            "INSERT INTO insurance_providers (name, address, phone, email, contact_person)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, address, phone, email, contact_person],
        )
        .map_err(|e| map_unique(e, "name", name))?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.insurance_provider(id)
    }

    pub fn insurance_provider(&self, id: i64) -> HmisResult<InsuranceProvider> {
        self.store
            .conn()
            .query_row(
                "SELECT id, name, address, phone, email, contact_person, is_active
                 FROM insurance_providers WHERE id = ?1",
                params![id],
                provider_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("insurance provider", id))
    }

    pub fn insurance_providers(&self) -> HmisResult<Vec<InsuranceProvider>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, address, phone, email, contact_person, is_active
             FROM insurance_providers WHERE is_active = 1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], provider_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn ensure_insurance_provider(&self, name: &str) -> HmisResult<i64> {
        let conn = self.store.conn();
        conn.execute(
            "INSERT OR IGNORE INTO insurance_providers (name) VALUES (?1)",
            params![name],
        )?;
        let id = conn.query_row(
            "SELECT id FROM insurance_providers WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn create_medical_scheme(
        &self,
        name: &str,
        insurance_provider_id: i64,
        description: &str,
        coverage_percentage: f64,
    ) -> HmisResult<MedicalScheme> {
        if !(0.0..=100.0).contains(&coverage_percentage) {
            return Err(HmisError::InvalidInput(
                "coverage percentage must be between 0 and 100".into(),
            ));
        }
        self.insurance_provider(insurance_provider_id)?;
        let conn = self.store.conn();
        conn.execute(
            "INSERT INTO medical_schemes (name, insurance_provider_id, description, coverage_percentage)
             VALUES (?1, ?2, ?3, ?4)",
            params![name.trim(), insurance_provider_id, description, coverage_percentage],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.medical_scheme(id)
    }

    pub fn medical_scheme(&self, id: i64) -> HmisResult<MedicalScheme> {
        self.store
            .conn()
            .query_row(
                "SELECT id, name, insurance_provider_id, description, coverage_percentage, is_active
                 FROM medical_schemes WHERE id = ?1",
                params![id],
                scheme_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("medical scheme", id))
    }

    pub fn medical_schemes(&self) -> HmisResult<Vec<MedicalScheme>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, insurance_provider_id, description, coverage_percentage, is_active
             FROM medical_schemes WHERE is_active = 1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], scheme_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn ensure_wound_type(&self, name: &str, category: &str) -> HmisResult<i64> {
        let conn = self.store.conn();
        conn.execute(
            "INSERT OR IGNORE INTO wound_types (name, category) VALUES (?1, ?2)",
            params![name, category],
        )?;
        let id = conn.query_row(
            "SELECT id FROM wound_types WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn wound_types(&self) -> HmisResult<Vec<WoundType>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, category, description, is_active
             FROM wound_types WHERE is_active = 1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(WoundType {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    category: row.get(2)?,
                    description: row.get(3)?,
                    is_active: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn ensure_body_part(&self, name: &str, category: &str) -> HmisResult<i64> {
        let conn = self.store.conn();
        conn.execute(
            "INSERT OR IGNORE INTO body_parts (name, category) VALUES (?1, ?2)",
            params![name, category],
        )?;
        let id = conn.query_row(
            "SELECT id FROM body_parts WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn body_parts(&self) -> HmisResult<Vec<BodyPart>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, category, is_active
             FROM body_parts WHERE is_active = 1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(BodyPart {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    category: row.get(2)?,
                    is_active: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn ensure_supplier(&self, name: &str, phone: &str) -> HmisResult<i64> {
        let conn = self.store.conn();
        conn.execute(
            "INSERT OR IGNORE INTO suppliers (name, phone) VALUES (?1, ?2)",
            params![name, phone],
        )?;
        let id = conn.query_row(
            "SELECT id FROM suppliers WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn suppliers(&self) -> HmisResult<Vec<Supplier>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, address, phone, email, contact_person, is_active
             FROM suppliers WHERE is_active = 1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Supplier {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    address: row.get(2)?,
                    phone: row.get(3)?,
                    email: row.get(4)?,
                    contact_person: row.get(5)?,
                    is_active: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn department_row(row: &rusqlite::Row) -> rusqlite::Result<Department> {
    Ok(Department {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        head_account_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn clinic_row(row: &rusqlite::Row) -> rusqlite::Result<Clinic> {
    Ok(Clinic {
        id: row.get(0)?,
        name: row.get(1)?,
        department_id: row.get(2)?,
        description: row.get(3)?,
        location: row.get(4)?,
        phone: row.get(5)?,
        is_active: row.get(6)?,
    })
}

fn provider_row(row: &rusqlite::Row) -> rusqlite::Result<InsuranceProvider> {
    Ok(InsuranceProvider {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        contact_person: row.get(5)?,
        is_active: row.get(6)?,
    })
}

fn scheme_row(row: &rusqlite::Row) -> rusqlite::Result<MedicalScheme> {
    Ok(MedicalScheme {
        id: row.get(0)?,
        name: row.get(1)?,
        insurance_provider_id: row.get(2)?,
        description: row.get(3)?,
        coverage_percentage: row.get(4)?,
        is_active: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ReferenceService {
        ReferenceService::new(Store::open_in_memory().unwrap())
    }

    #[test]
    fn department_name_is_unique() {
        let svc = service();
        svc.create_department("Wound Care", "").unwrap();
        let err = svc.create_department("Wound Care", "again").unwrap_err();
        assert!(matches!(err, HmisError::Duplicate { field: "name", .. }));
    }

    #[test]
    fn ensure_is_idempotent() {
        let svc = service();
        let a = svc.ensure_department("Laboratory", "").unwrap();
        let b = svc.ensure_department("Laboratory", "different description").unwrap();
        assert_eq!(a, b);
        assert_eq!(svc.departments().unwrap().len(), 1);
    }

    #[test]
    fn clinic_requires_existing_department() {
        let svc = service();
        let err = svc.create_clinic("Walk-in", 99, "", "", "").unwrap_err();
        assert!(matches!(err, HmisError::NotFound { .. }));
    }

    #[test]
    fn scheme_coverage_is_bounded() {
        let svc = service();
        let provider = svc
            .create_insurance_provider("NHIMA", "", "", "", "")
            .unwrap();
        let err = svc
            .create_medical_scheme("Gold", provider.id, "", 120.0)
            .unwrap_err();
        assert!(matches!(err, HmisError::InvalidInput(_)));
        let scheme = svc
            .create_medical_scheme("Gold", provider.id, "", 80.0)
            .unwrap();
        assert_eq!(scheme.coverage_percentage, 80.0);
    }

    #[test]
    fn wound_lookups_round_trip() {
        let svc = service();
        svc.ensure_wound_type("Diabetic Ulcer", "ulcer").unwrap();
        svc.ensure_wound_type("Diabetic Ulcer", "ulcer").unwrap();
        svc.ensure_body_part("Left Foot", "lower_limb").unwrap();
        assert_eq!(svc.wound_types().unwrap().len(), 1);
        assert_eq!(svc.body_parts().unwrap().len(), 1);
    }
}
