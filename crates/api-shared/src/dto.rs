//! Wire DTOs for the documented REST resources.
//!
//! Core entities stay transport-agnostic; the types here carry the OpenAPI
//! schemas and the derived presentation fields (full names, ages, display
//! strings). Money values are minor units throughout, matching storage.

use chrono::NaiveDate;
use hmis_core::repositories::appointments::{Appointment, AppointmentInput};
use hmis_core::repositories::billing::{ChargesInput, PaymentDetails, PaymentTransaction, WoundBilling};
use hmis_core::repositories::patients::{Patient, PatientInput};
use hmis_core::repositories::wounds::{WoundCase, WoundCaseInput};
use hmis_types::Money;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

// -- Patients ---------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PatientReq {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub middle_name: String,
    pub date_of_birth: NaiveDate,
    /// Gender code: M, F or O.
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

impl From<PatientReq> for PatientInput {
    fn from(req: PatientReq) -> Self {
        PatientInput {
            first_name: req.first_name,
            last_name: req.last_name,
            middle_name: req.middle_name,
            date_of_birth: req.date_of_birth,
            gender: req.gender,
            marital_status: req.marital_status,
            phone: req.phone,
            email: req.email,
            address: req.address,
            emergency_contact_name: req.emergency_contact_name,
            emergency_contact_phone: req.emergency_contact_phone,
            medical_record_number: req.medical_record_number,
            national_id: req.national_id,
            insurance_provider_id: req.insurance_provider_id,
            medical_scheme_id: req.medical_scheme_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PatientRes {
    pub id: i64,
    pub medical_record_number: String,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub age: i32,
    pub gender: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub national_id: String,
    pub insurance_provider_id: Option<i64>,
    pub registration_date: String,
    pub is_active: bool,
}

impl From<Patient> for PatientRes {
    fn from(p: Patient) -> Self {
        let full_name = p.full_name();
        let age = p.age();
        PatientRes {
            id: p.id,
            medical_record_number: p.medical_record_number,
            full_name,
            date_of_birth: p.date_of_birth,
            age,
            gender: p.gender.as_str().into(),
            phone: p.phone,
            email: p.email,
            address: p.address,
            national_id: p.national_id,
            insurance_provider_id: p.insurance_provider_id,
            registration_date: p.registration_date,
            is_active: p.is_active,
        }
    }
}

// -- Wound cases ------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WoundCaseReq {
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
    /// Pain level on a 0-10 scale.
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

impl From<WoundCaseReq> for WoundCaseInput {
    fn from(req: WoundCaseReq) -> Self {
        WoundCaseInput {
            patient_id: req.patient_id,
            wound_type_id: req.wound_type_id,
            body_part_id: req.body_part_id,
            laterality: req.laterality,
            assessed_by_profile_id: req.assessed_by_profile_id,
            length_cm: req.length_cm,
            width_cm: req.width_cm,
            depth_cm: req.depth_cm,
            appearance: req.appearance,
            exudate: req.exudate,
            exudate_amount: req.exudate_amount,
            pain_level: req.pain_level,
            has_edema: req.has_edema,
            edema_grade: req.edema_grade,
            signs_of_infection: req.signs_of_infection,
            infection_notes: req.infection_notes,
            next_visit_date: req.next_visit_date,
            clinical_notes: req.clinical_notes,
            treatment_plan: req.treatment_plan,
            insurance_covers: req.insurance_covers,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WoundCaseRes {
    pub id: i64,
    /// Business identifier, e.g. WND-00042.
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
    pub pain_level: Option<i64>,
    pub signs_of_infection: bool,
    pub status: String,
    pub next_visit_date: Option<NaiveDate>,
    pub clinical_notes: String,
    pub treatment_plan: String,
    pub insurance_covers: bool,
    pub is_active: bool,
}

impl From<WoundCase> for WoundCaseRes {
    fn from(c: WoundCase) -> Self {
        WoundCaseRes {
            id: c.id,
            wound_id: c.wound_id,
            patient_id: c.patient_id,
            wound_type_id: c.wound_type_id,
            body_part_id: c.body_part_id,
            laterality: c.laterality,
            assessment_date: c.assessment_date,
            assessed_by_profile_id: c.assessed_by_profile_id,
            length_cm: c.length_cm,
            width_cm: c.width_cm,
            depth_cm: c.depth_cm,
            surface_area_cm2: c.surface_area_cm2,
            pain_level: c.pain_level,
            signs_of_infection: c.signs_of_infection,
            status: c.status.as_str().into(),
            next_visit_date: c.next_visit_date,
            clinical_notes: c.clinical_notes,
            treatment_plan: c.treatment_plan,
            insurance_covers: c.insurance_covers,
            is_active: c.is_active,
        }
    }
}

// -- Appointments -----------------------------------------------------------

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AppointmentReq {
    pub patient_id: i64,
    pub doctor_profile_id: i64,
    pub clinic_id: i64,
    /// RFC 3339 timestamp, must not be in the past.
    pub scheduled_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub appointment_type: Option<String>,
    #[serde(default)]
    pub notes: String,
}

impl From<AppointmentReq> for AppointmentInput {
    fn from(req: AppointmentReq) -> Self {
        AppointmentInput {
            patient_id: req.patient_id,
            doctor_profile_id: req.doctor_profile_id,
            clinic_id: req.clinic_id,
            scheduled_at: req.scheduled_at,
            appointment_type: req
                .appointment_type
                .unwrap_or_else(|| "consultation".into()),
            notes: req.notes,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AppointmentRes {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_profile_id: i64,
    pub clinic_id: i64,
    pub scheduled_at: chrono::DateTime<chrono::Utc>,
    pub status: String,
    pub appointment_type: String,
    pub notes: String,
}

impl From<Appointment> for AppointmentRes {
    fn from(a: Appointment) -> Self {
        AppointmentRes {
            id: a.id,
            patient_id: a.patient_id,
            doctor_profile_id: a.doctor_profile_id,
            clinic_id: a.clinic_id,
            scheduled_at: a.scheduled_at,
            status: a.status.as_str().into(),
            appointment_type: a.appointment_type,
            notes: a.notes,
        }
    }
}

// -- Billing ----------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ChargesReq {
    #[serde(default)]
    #[schema(value_type = i64)]
    pub assessment_fee: Money,
    #[serde(default)]
    #[schema(value_type = i64)]
    pub treatment_fee: Money,
    #[serde(default)]
    #[schema(value_type = i64)]
    pub dressing_supplies_cost: Money,
    #[serde(default)]
    #[schema(value_type = i64)]
    pub medication_cost: Money,
    #[serde(default)]
    #[schema(value_type = i64)]
    pub other_charges: Money,
}

impl From<ChargesReq> for ChargesInput {
    fn from(req: ChargesReq) -> Self {
        ChargesInput {
            assessment_fee: req.assessment_fee,
            treatment_fee: req.treatment_fee,
            dressing_supplies_cost: req.dressing_supplies_cost,
            medication_cost: req.medication_cost,
            other_charges: req.other_charges,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BillingRes {
    pub id: i64,
    pub wound_case_id: i64,
    #[schema(value_type = i64)]
    pub assessment_fee: Money,
    #[schema(value_type = i64)]
    pub treatment_fee: Money,
    #[schema(value_type = i64)]
    pub dressing_supplies_cost: Money,
    #[schema(value_type = i64)]
    pub medication_cost: Money,
    #[schema(value_type = i64)]
    pub other_charges: Money,
    #[schema(value_type = i64)]
    pub total_amount: Money,
    #[schema(value_type = i64)]
    pub amount_paid: Money,
    #[schema(value_type = i64)]
    pub balance: Money,
    pub payment_status: String,
}

impl From<WoundBilling> for BillingRes {
    fn from(b: WoundBilling) -> Self {
        BillingRes {
            id: b.id,
            wound_case_id: b.wound_case_id,
            assessment_fee: b.assessment_fee,
            treatment_fee: b.treatment_fee,
            dressing_supplies_cost: b.dressing_supplies_cost,
            medication_cost: b.medication_cost,
            other_charges: b.other_charges,
            total_amount: b.total_amount,
            amount_paid: b.amount_paid,
            balance: b.balance,
            payment_status: b.payment_status,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PaymentReq {
    /// Amount in minor units.
    #[schema(value_type = i64)]
    pub amount: Money,
    /// cash, mobile_money, bank_transfer, card, insurance or credit.
    pub method: String,
    #[serde(default)]
    pub mobile_money_phone: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub card_last4: Option<String>,
    #[serde(default)]
    pub notes: String,
}

impl PaymentReq {
    pub fn details(&self) -> PaymentDetails {
        PaymentDetails {
            mobile_money_phone: self.mobile_money_phone.clone(),
            bank_name: self.bank_name.clone(),
            card_last4: self.card_last4.clone(),
            notes: self.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentRes {
    pub id: i64,
    pub wound_billing_id: i64,
    #[schema(value_type = i64)]
    pub amount: Money,
    pub method: String,
    pub transaction_reference: String,
    pub receipt_number: String,
    pub status: String,
    pub paid_at: String,
}

impl From<PaymentTransaction> for PaymentRes {
    fn from(t: PaymentTransaction) -> Self {
        PaymentRes {
            id: t.id,
            wound_billing_id: t.wound_billing_id,
            amount: t.amount,
            method: t.method.as_str().into(),
            transaction_reference: t.transaction_reference,
            receipt_number: t.receipt_number,
            status: t.status.as_str().into(),
            paid_at: t.paid_at,
        }
    }
}
