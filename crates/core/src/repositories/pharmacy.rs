//! Pharmacy: drug catalogue and prescriptions.
//!
//! Dispensing is all-or-nothing: every item must be in stock, and the stock
//! decrement plus the dispensed stamp commit in one transaction.

use crate::db::now_rfc3339;
use crate::repositories::appointments::require_row;
use crate::sequence::{self, SequenceKind};
use crate::{HmisError, HmisResult, Store};
use hmis_types::Money;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drug {
    pub id: i64,
    pub name: String,
    pub generic_name: String,
    pub category: String,
    pub strength: String,
    pub form: String,
    pub price: Money,
    pub stock_quantity: i64,
    pub reorder_level: i64,
    pub expiry_date: Option<String>,
    pub manufacturer: String,
    pub is_active: bool,
}

impl Drug {
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.reorder_level
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionItem {
    pub id: i64,
    pub prescription_id: i64,
    pub drug_id: i64,
    pub quantity: i64,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub instructions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: i64,
    pub prescription_number: String,
    pub patient_id: i64,
    pub doctor_profile_id: i64,
    pub diagnosis: String,
    pub instructions: String,
    pub prescribed_at: String,
    pub dispensed_at: Option<String>,
    pub dispensed_by_profile_id: Option<i64>,
    pub items: Vec<PrescriptionItem>,
}

impl Prescription {
    pub fn is_dispensed(&self) -> bool {
        self.dispensed_at.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrescriptionItemInput {
    pub drug_id: i64,
    pub quantity: i64,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    #[serde(default)]
    pub instructions: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrescriptionInput {
    pub patient_id: i64,
    pub doctor_profile_id: i64,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub instructions: String,
    pub items: Vec<PrescriptionItemInput>,
}

#[derive(Clone)]
pub struct PharmacyService {
    store: Store,
}

impl PharmacyService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn ensure_drug(
        &self,
        name: &str,
        generic_name: &str,
        category: &str,
        strength: &str,
        form: &str,
        price: Money,
        stock_quantity: i64,
    ) -> HmisResult<i64> {
        let conn = self.store.conn();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM drugs WHERE name = ?1 AND strength = ?2",
                params![name, strength],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        conn.execute(
            "INSERT INTO drugs (name, generic_name, category, strength, form, price, stock_quantity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![name, generic_name, category, strength, form, price.minor(), stock_quantity],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn drug(&self, id: i64) -> HmisResult<Drug> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {DRUG_COLUMNS} FROM drugs WHERE id = ?1"),
                params![id],
                drug_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("drug", id))
    }

    pub fn drugs(&self) -> HmisResult<Vec<Drug>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DRUG_COLUMNS} FROM drugs WHERE is_active = 1 ORDER BY name"
        ))?;
        let rows = stmt
            .query_map([], drug_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Drugs at or below their reorder level.
    pub fn low_stock(&self) -> HmisResult<Vec<Drug>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DRUG_COLUMNS} FROM drugs
             WHERE is_active = 1 AND stock_quantity <= reorder_level
             ORDER BY stock_quantity"
        ))?;
        let rows = stmt
            .query_map([], drug_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn adjust_stock(&self, drug_id: i64, delta: i64) -> HmisResult<Drug> {
        let drug = self.drug(drug_id)?;
        if drug.stock_quantity + delta < 0 {
            return Err(HmisError::InvalidInput(format!(
                "stock for {} cannot go below zero",
                drug.name
            )));
        }
        self.store.conn().execute(
            "UPDATE drugs SET stock_quantity = stock_quantity + ?1 WHERE id = ?2",
            params![delta, drug_id],
        )?;
        self.drug(drug_id)
    }

    /// Write a prescription, allocating its RX number. Items are validated
    /// against the catalogue but stock is only checked at dispense time.
    pub fn create_prescription(&self, input: &PrescriptionInput) -> HmisResult<Prescription> {
        if input.items.is_empty() {
            return Err(HmisError::InvalidInput(
                "a prescription needs at least one item".into(),
            ));
        }
        for item in &input.items {
            if item.quantity <= 0 {
                return Err(HmisError::InvalidInput("item quantity must be positive".into()));
            }
        }
        let mut conn = self.store.conn();
        require_row(&conn, "patients", "patient", input.patient_id)?;
        require_row(&conn, "user_profiles", "user profile", input.doctor_profile_id)?;
        for item in &input.items {
            require_row(&conn, "drugs", "drug", item.drug_id)?;
        }
        let number = sequence::allocate_on(&mut conn, SequenceKind::Prescription)?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO prescriptions
                 (prescription_number, patient_id, doctor_profile_id, diagnosis, instructions,
                  prescribed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                number,
                input.patient_id,
                input.doctor_profile_id,
                input.diagnosis,
                input.instructions,
                now_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        for item in &input.items {
            tx.execute(
                "INSERT INTO prescription_items
                     (prescription_id, drug_id, quantity, dosage, frequency, duration, instructions)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    item.drug_id,
                    item.quantity,
                    item.dosage,
                    item.frequency,
                    item.duration,
                    item.instructions,
                ],
            )?;
        }
        tx.commit()?;
        drop(conn);
        self.prescription(id)
    }

    pub fn prescription(&self, id: i64) -> HmisResult<Prescription> {
        let conn = self.store.conn();
        let mut prescription = conn
            .query_row(
                &format!("SELECT {RX_COLUMNS} FROM prescriptions WHERE id = ?1"),
                params![id],
                prescription_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("prescription", id))?;
        let mut stmt = conn.prepare(
            "SELECT id, prescription_id, drug_id, quantity, dosage, frequency, duration, instructions
             FROM prescription_items WHERE prescription_id = ?1 ORDER BY id",
        )?;
        prescription.items = stmt
            .query_map(params![id], item_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(prescription)
    }

    pub fn prescriptions_for_patient(&self, patient_id: i64) -> HmisResult<Vec<Prescription>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id FROM prescriptions WHERE patient_id = ?1 ORDER BY prescribed_at DESC",
        )?;
        let ids = stmt
            .query_map(params![patient_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        drop(stmt);
        drop(conn);
        ids.into_iter().map(|id| self.prescription(id)).collect()
    }

    pub fn undispensed(&self) -> HmisResult<Vec<Prescription>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id FROM prescriptions WHERE dispensed_at IS NULL ORDER BY prescribed_at",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        drop(stmt);
        drop(conn);
        ids.into_iter().map(|id| self.prescription(id)).collect()
    }

    /// Dispense a prescription: check stock for every item, decrement it,
    /// and stamp the prescription, all in one transaction.
    pub fn dispense(&self, id: i64, pharmacist_profile_id: i64) -> HmisResult<Prescription> {
        let prescription = self.prescription(id)?;
        if prescription.is_dispensed() {
            return Err(HmisError::InvalidInput(format!(
                "{} has already been dispensed",
                prescription.prescription_number
            )));
        }
        let mut conn = self.store.conn();
        let tx = conn.transaction()?;
        for item in &prescription.items {
            let (name, stock): (String, i64) = tx.query_row(
                "SELECT name, stock_quantity FROM drugs WHERE id = ?1",
                params![item.drug_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            if stock < item.quantity {
                return Err(HmisError::InvalidInput(format!(
                    "insufficient stock of {name}: need {}, have {stock}",
                    item.quantity
                )));
            }
            tx.execute(
                "UPDATE drugs SET stock_quantity = stock_quantity - ?1 WHERE id = ?2",
                params![item.quantity, item.drug_id],
            )?;
        }
        tx.execute(
            "UPDATE prescriptions SET dispensed_at = ?1, dispensed_by_profile_id = ?2 WHERE id = ?3",
            params![now_rfc3339(), pharmacist_profile_id, id],
        )?;
        tx.commit()?;
        drop(conn);
        self.prescription(id)
    }
}

const DRUG_COLUMNS: &str = "id, name, generic_name, category, strength, form, price, \
                            stock_quantity, reorder_level, expiry_date, manufacturer, is_active";

fn drug_row(row: &rusqlite::Row) -> rusqlite::Result<Drug> {
    Ok(Drug {
        id: row.get(0)?,
        name: row.get(1)?,
        generic_name: row.get(2)?,
        category: row.get(3)?,
        strength: row.get(4)?,
        form: row.get(5)?,
        price: Money::from_minor(row.get(6)?),
        stock_quantity: row.get(7)?,
        reorder_level: row.get(8)?,
        expiry_date: row.get(9)?,
        manufacturer: row.get(10)?,
        is_active: row.get(11)?,
    })
}

const RX_COLUMNS: &str = "id, prescription_number, patient_id, doctor_profile_id, diagnosis, \
                          instructions, prescribed_at, dispensed_at, dispensed_by_profile_id";

fn prescription_row(row: &rusqlite::Row) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: row.get(0)?,
        prescription_number: row.get(1)?,
        patient_id: row.get(2)?,
        doctor_profile_id: row.get(3)?,
        diagnosis: row.get(4)?,
        instructions: row.get(5)?,
        prescribed_at: row.get(6)?,
        dispensed_at: row.get(7)?,
        dispensed_by_profile_id: row.get(8)?,
        items: Vec::new(),
    })
}

fn item_row(row: &rusqlite::Row) -> rusqlite::Result<PrescriptionItem> {
    Ok(PrescriptionItem {
        id: row.get(0)?,
        prescription_id: row.get(1)?,
        drug_id: row.get(2)?,
        quantity: row.get(3)?,
        dosage: row.get(4)?,
        frequency: row.get(5)?,
        duration: row.get(6)?,
        instructions: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::Role;
    use crate::repositories::identity::{IdentityService, NewStaff};
    use crate::repositories::patients::{sample_input, PatientService};

    struct Fixture {
        svc: PharmacyService,
        patient_id: i64,
        doctor_id: i64,
        amoxicillin: i64,
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
        let svc = PharmacyService::new(store);
        let amoxicillin = svc
            .ensure_drug(
                "Amoxicillin",
                "amoxicillin",
                "antibiotic",
                "500mg",
                "capsule",
                Money::from_major(5),
                30,
            )
            .unwrap();
        Fixture {
            svc,
            patient_id: patient.id,
            doctor_id: doctor.profile.id,
            amoxicillin,
        }
    }

    fn prescription_input(f: &Fixture, quantity: i64) -> PrescriptionInput {
        PrescriptionInput {
            patient_id: f.patient_id,
            doctor_profile_id: f.doctor_id,
            diagnosis: "Infected wound".into(),
            instructions: String::new(),
            items: vec![PrescriptionItemInput {
                drug_id: f.amoxicillin,
                quantity,
                dosage: "500mg".into(),
                frequency: "tds".into(),
                duration: "7 days".into(),
                instructions: String::new(),
            }],
        }
    }

    #[test]
    fn prescription_numbers_use_rx_prefix() {
        let f = fixture();
        let rx = f.svc.create_prescription(&prescription_input(&f, 21)).unwrap();
        assert_eq!(rx.prescription_number, "RX-00001");
        assert_eq!(rx.items.len(), 1);
        assert!(!rx.is_dispensed());
    }

    #[test]
    fn dispense_decrements_stock_once() {
        let f = fixture();
        let rx = f.svc.create_prescription(&prescription_input(&f, 21)).unwrap();
        let dispensed = f.svc.dispense(rx.id, f.doctor_id).unwrap();
        assert!(dispensed.is_dispensed());
        assert_eq!(f.svc.drug(f.amoxicillin).unwrap().stock_quantity, 9);
        // Second dispense is rejected and stock is untouched.
        assert!(f.svc.dispense(rx.id, f.doctor_id).is_err());
        assert_eq!(f.svc.drug(f.amoxicillin).unwrap().stock_quantity, 9);
    }

    #[test]
    fn insufficient_stock_blocks_dispense() {
        let f = fixture();
        let rx = f.svc.create_prescription(&prescription_input(&f, 100)).unwrap();
        assert!(f.svc.dispense(rx.id, f.doctor_id).is_err());
        assert_eq!(f.svc.drug(f.amoxicillin).unwrap().stock_quantity, 30);
        assert_eq!(f.svc.undispensed().unwrap().len(), 1);
        assert_eq!(f.svc.prescriptions_for_patient(f.patient_id).unwrap().len(), 1);
    }

    #[test]
    fn low_stock_uses_reorder_level() {
        let f = fixture();
        assert!(f.svc.low_stock().unwrap().is_empty());
        f.svc.adjust_stock(f.amoxicillin, -25).unwrap();
        let low = f.svc.low_stock().unwrap();
        assert_eq!(low.len(), 1);
        assert!(low[0].is_low_stock());
        assert!(f.svc.adjust_stock(f.amoxicillin, -10).is_err());
    }
}
