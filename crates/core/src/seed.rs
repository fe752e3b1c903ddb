//! Explicit, idempotent seeding of reference data and demo staff.
//!
//! Seeding never runs implicitly at startup; the operator invokes it. Every
//! reference insert is an upsert keyed on the natural unique column, so
//! re-running is safe. Seeded accounts get freshly generated passwords,
//! returned once in the report and never stored in the clear.

use crate::events::EventBus;
use crate::rbac::Role;
use crate::repositories::billing::BillingService;
use crate::repositories::identity::{IdentityService, NewStaff};
use crate::repositories::laboratory::LaboratoryService;
use crate::repositories::pharmacy::PharmacyService;
use crate::repositories::reference::ReferenceService;
use crate::{HmisResult, Store};
use hmis_types::Money;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;

const SEED_PASSWORD_LEN: usize = 16;

/// Credentials for one seeded account. The password is only available here.
#[derive(Debug, Clone, Serialize)]
pub struct SeededAccount {
    pub username: String,
    pub employee_id: String,
    pub role: Role,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedReport {
    pub departments: usize,
    pub clinics: usize,
    pub wound_types: usize,
    pub body_parts: usize,
    pub insurance_providers: usize,
    pub medical_schemes: usize,
    pub lab_tests: usize,
    pub drugs: usize,
    pub services: usize,
    pub accounts: Vec<SeededAccount>,
}

/// Seed the reference tables and the demo staff roster.
pub fn run(store: &Store) -> HmisResult<SeedReport> {
    let mut report = SeedReport::default();
    let reference = ReferenceService::new(store.clone());
    let identity = IdentityService::new(store.clone());
    let bus = EventBus::new();
    let laboratory = LaboratoryService::new(store.clone(), bus.clone());
    let pharmacy = PharmacyService::new(store.clone());
    let billing = BillingService::new(store.clone(), bus);

    let departments = [
        ("Wound Care", "Specialist wound assessment and treatment"),
        ("Outpatient", "General outpatient consultations"),
        ("Laboratory", "Diagnostic testing"),
        ("Pharmacy", "Medication dispensing"),
        ("Radiology", "Imaging"),
        ("Accounts", "Billing and payments"),
    ];
    let mut wound_care_dept = 0;
    for (name, description) in departments {
        let id = reference.ensure_department(name, description)?;
        if name == "Wound Care" {
            wound_care_dept = id;
        }
        report.departments += 1;
    }

    for clinic in ["Wound Clinic", "Diabetic Foot Clinic"] {
        reference.ensure_clinic(clinic, wound_care_dept)?;
        report.clinics += 1;
    }

    for (name, category) in [
        ("Pressure Ulcer", "ulcer"),
        ("Diabetic Foot Ulcer", "ulcer"),
        ("Venous Leg Ulcer", "ulcer"),
        ("Arterial Ulcer", "ulcer"),
        ("Surgical Wound", "surgical"),
        ("Traumatic Wound", "traumatic"),
        ("Burn", "burn"),
    ] {
        reference.ensure_wound_type(name, category)?;
        report.wound_types += 1;
    }

    for (name, category) in [
        ("Left Foot", "lower_limb"),
        ("Right Foot", "lower_limb"),
        ("Left Lower Leg", "lower_limb"),
        ("Right Lower Leg", "lower_limb"),
        ("Sacrum", "trunk"),
        ("Left Heel", "lower_limb"),
        ("Right Heel", "lower_limb"),
        ("Abdomen", "trunk"),
    ] {
        reference.ensure_body_part(name, category)?;
        report.body_parts += 1;
    }

    let mut nhima = 0;
    for provider in ["NHIMA", "Madison General", "SES Unisure"] {
        let id = reference.ensure_insurance_provider(provider)?;
        if provider == "NHIMA" {
            nhima = id;
        }
        report.insurance_providers += 1;
    }
    let existing_schemes: Vec<String> = reference
        .medical_schemes()?
        .into_iter()
        .map(|s| s.name)
        .collect();
    for (name, coverage) in [("NHIMA Standard", 80.0), ("NHIMA Civil Service", 100.0)] {
        if !existing_schemes.iter().any(|s| s == name) {
            reference.create_medical_scheme(name, nhima, "", coverage)?;
        }
        report.medical_schemes += 1;
    }

    for (name, category, price, range, unit) in [
        ("Full Blood Count", "haematology", 150, "", ""),
        ("Fasting Glucose", "chemistry", 80, "3.9-5.5", "mmol/L"),
        ("HbA1c", "chemistry", 250, "4.0-5.6", "%"),
        ("Wound Swab Culture", "microbiology", 300, "", ""),
        ("ESR", "haematology", 60, "0-20", "mm/hr"),
    ] {
        laboratory.ensure_test(name, category, Money::from_major(price), range, unit)?;
        report.lab_tests += 1;
    }

    for (name, generic, category, strength, form, price, stock) in [
        ("Amoxicillin", "amoxicillin", "antibiotic", "500mg", "capsule", 5, 500),
        ("Flucloxacillin", "flucloxacillin", "antibiotic", "500mg", "capsule", 8, 300),
        ("Metronidazole", "metronidazole", "antibiotic", "400mg", "tablet", 4, 400),
        ("Paracetamol", "paracetamol", "analgesic", "500mg", "tablet", 1, 1000),
        ("Ibuprofen", "ibuprofen", "analgesic", "400mg", "tablet", 2, 600),
        ("Silver Sulfadiazine", "silver sulfadiazine", "topical", "1%", "cream", 45, 80),
    ] {
        pharmacy.ensure_drug(name, generic, category, strength, form, Money::from_major(price), stock)?;
        report.drugs += 1;
    }

    for (name, category, price) in [
        ("Wound Assessment", "wound_care", 500),
        ("Wound Dressing - Simple", "wound_care", 150),
        ("Wound Dressing - Complex", "wound_care", 350),
        ("Debridement", "wound_care", 800),
        ("Clinical Review", "consultation", 300),
    ] {
        billing.ensure_service(name, wound_care_dept, category, Money::from_major(price))?;
        report.services += 1;
    }

    let roster = [
        ("admin", "EMP-0001", Role::Admin, "System", "Administrator"),
        ("dr.mwansa", "EMP-0002", Role::Doctor, "Chileshe", "Mwansa"),
        ("nurse.phiri", "EMP-0003", Role::Nurse, "Ruth", "Phiri"),
        ("cashier.zulu", "EMP-0004", Role::Cashier, "Patrick", "Zulu"),
        ("lab.tembo", "EMP-0005", Role::LabTech, "Agness", "Tembo"),
        ("pharm.banda", "EMP-0006", Role::Pharmacist, "Joseph", "Banda"),
        ("reception.mumba", "EMP-0007", Role::Receptionist, "Mary", "Mumba"),
    ];
    for (username, employee_id, role, first_name, last_name) in roster {
        // Existing accounts keep their credentials.
        if identity.profile_by_employee_id(employee_id)?.is_some() {
            continue;
        }
        let password = generate_password();
        identity.create_staff(&NewStaff {
            username: username.into(),
            password: password.clone(),
            email: format!("{username}@neudebri.example"),
            first_name: first_name.into(),
            last_name: last_name.into(),
            role,
            employee_id: Some(employee_id.into()),
            department_id: Some(wound_care_dept),
            phone: String::new(),
            specialization: String::new(),
        })?;
        report.accounts.push(SeededAccount {
            username: username.into(),
            employee_id: employee_id.into(),
            role,
            password,
        });
    }

    tracing::info!(
        accounts = report.accounts.len(),
        "seed complete ({} departments, {} wound types, {} drugs)",
        report.departments,
        report.wound_types,
        report.drugs,
    );
    Ok(report)
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SEED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_populates_reference_data() {
        let store = Store::open_in_memory().unwrap();
        let report = run(&store).unwrap();
        assert_eq!(report.departments, 6);
        assert_eq!(report.accounts.len(), 7);
        assert!(report.accounts.iter().all(|a| a.password.len() == SEED_PASSWORD_LEN));

        let reference = ReferenceService::new(store.clone());
        assert_eq!(reference.wound_types().unwrap().len(), 7);
        assert_eq!(reference.body_parts().unwrap().len(), 8);
    }

    #[test]
    fn reseed_is_idempotent_and_keeps_credentials() {
        let store = Store::open_in_memory().unwrap();
        let first = run(&store).unwrap();
        let second = run(&store).unwrap();
        // No new accounts and no duplicated lookups.
        assert!(second.accounts.is_empty());
        let reference = ReferenceService::new(store.clone());
        assert_eq!(reference.departments().unwrap().len(), 6);

        // First-run passwords still authenticate after the rerun.
        let identity = IdentityService::new(store);
        let admin = first.accounts.iter().find(|a| a.username == "admin").unwrap();
        assert!(identity
            .authenticate(&admin.username, &admin.password)
            .unwrap()
            .is_some());
    }
}
