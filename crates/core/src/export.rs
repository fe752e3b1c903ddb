//! CSV export of registry data.
//!
//! Output is RFC 4180 style: comma separated, CRLF rows, fields quoted when
//! they contain a comma, quote or newline. Derived columns (age, full name,
//! balances) are computed at export time from the same functions the write
//! path uses.

use crate::events::EventBus;
use crate::repositories::billing::BillingService;
use crate::repositories::patients::PatientService;
use crate::repositories::wounds::WoundService;
use crate::{HmisResult, Store};

#[derive(Clone)]
pub struct ExportService {
    patients: PatientService,
    wounds: WoundService,
    billing: BillingService,
}

impl ExportService {
    pub fn new(store: Store, wounds: WoundService) -> Self {
        // Exports only read; the billing handle never publishes.
        Self {
            patients: PatientService::new(store.clone()),
            billing: BillingService::new(store, EventBus::new()),
            wounds,
        }
    }

    /// All active patients, one row each.
    pub fn patients_csv(&self) -> HmisResult<String> {
        let mut out = String::new();
        write_row(
            &mut out,
            &[
                "medical_record_number",
                "full_name",
                "date_of_birth",
                "age",
                "gender",
                "phone",
                "address",
                "registration_date",
            ],
        );
        for patient in self.patients.list(false)? {
            write_row(
                &mut out,
                &[
                    &patient.medical_record_number,
                    &patient.full_name(),
                    &patient.date_of_birth.to_string(),
                    &patient.age().to_string(),
                    patient.gender.as_str(),
                    &patient.phone,
                    &patient.address,
                    &patient.registration_date,
                ],
            );
        }
        Ok(out)
    }

    /// All active wound cases with their billing position.
    pub fn wound_cases_csv(&self) -> HmisResult<String> {
        let mut out = String::new();
        write_row(
            &mut out,
            &[
                "wound_id",
                "patient_mrn",
                "patient_name",
                "status",
                "assessment_date",
                "length_cm",
                "width_cm",
                "surface_area_cm2",
                "pain_level",
                "insurance_covers",
                "total_amount",
                "amount_paid",
                "balance",
                "payment_status",
            ],
        );
        for case in self.wounds.list()? {
            let patient = self.patients.get(case.patient_id)?;
            let billing = self.billing.billing_for_case(case.id)?;
            write_row(
                &mut out,
                &[
                    &case.wound_id,
                    &patient.medical_record_number,
                    &patient.full_name(),
                    case.status.as_str(),
                    &case.assessment_date,
                    &optional_number(case.length_cm),
                    &optional_number(case.width_cm),
                    &optional_number(case.surface_area_cm2),
                    &case.pain_level.map(|p| p.to_string()).unwrap_or_default(),
                    &(case.insurance_covers as i64).to_string(),
                    &billing.total_amount.to_string(),
                    &billing.amount_paid.to_string(),
                    &billing.balance.to_string(),
                    &billing.payment_status,
                ],
            );
        }
        Ok(out)
    }
}

fn optional_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_row(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape(field));
    }
    out.push_str("\r\n");
}

fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::repositories::patients::sample_input;
    use crate::repositories::wounds::test_support::case_input;

    fn service() -> (ExportService, PatientService, WoundService) {
        let store = Store::open_in_memory().unwrap();
        let wounds = WoundService::new(store.clone(), EventBus::new());
        let patients = PatientService::new(store.clone());
        (ExportService::new(store, wounds.clone()), patients, wounds)
    }

    #[test]
    fn patient_export_includes_derived_age() {
        let (export, patients, _wounds) = service();
        patients.create(&sample_input("MRN-0001")).unwrap();
        let csv = export.patients_csv().unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("medical_record_number,"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("MRN-0001,Chanda Mulenga,1985-03-20,"));
    }

    #[test]
    fn wound_export_joins_billing() {
        let (export, patients, wounds) = service();
        let patient = patients.create(&sample_input("MRN-0001")).unwrap();
        wounds.create(&case_input(patient.id)).unwrap();
        let csv = export.wound_cases_csv().unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("WND-00001,MRN-0001,Chanda Mulenga,active,"));
        assert!(row.contains(",4,0,"));
        assert!(row.contains(",0.00,0.00,0.00,pending"));
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        let (export, patients, _wounds) = service();
        let mut input = sample_input("MRN-0001");
        input.address = "Plot 5, Kabulonga".into();
        patients.create(&input).unwrap();
        let csv = export.patients_csv().unwrap();
        assert!(csv.contains("\"Plot 5, Kabulonga\""));
    }
}
