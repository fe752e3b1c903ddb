//! Header-credential authentication and permission gating.
//!
//! Callers identify themselves with the `x-employee-id` header. The value is
//! resolved to a staff profile (active accounts only) and every guarded route
//! then checks one permission against the profile's role. The
//! [`REQUIRED_PERMISSIONS`] table is the declared map of route to permission;
//! a test keeps it consistent with the RBAC table so no route can demand a
//! permission that no role grants.

use hmis_core::rbac::{unreachable_permissions, Permission};
use hmis_core::repositories::identity::{IdentityService, UserProfile};
use hmis_core::HmisError;

/// Header carrying the caller's employee id.
pub const EMPLOYEE_ID_HEADER: &str = "x-employee-id";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing {EMPLOYEE_ID_HEADER} header")]
    MissingCredential,
    #[error("unknown or inactive employee id")]
    UnknownCredential,
    #[error("role lacks required permission")]
    Forbidden(Permission),
    #[error(transparent)]
    Internal(#[from] HmisError),
}

/// Resolve the header value to an active staff profile.
pub fn authenticate(
    identity: &IdentityService,
    employee_id: Option<&str>,
) -> Result<UserProfile, AuthError> {
    let employee_id = employee_id
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingCredential)?;
    identity
        .credential_profile(employee_id)?
        .ok_or(AuthError::UnknownCredential)
}

/// Check one permission against the caller's role.
pub fn require(profile: &UserProfile, permission: Permission) -> Result<(), AuthError> {
    if profile.role.has_permission(permission) {
        Ok(())
    } else {
        Err(AuthError::Forbidden(permission))
    }
}

/// Every guarded route and the permission it demands. Kept as data so the
/// whole surface can be validated against the RBAC table in one place.
pub const REQUIRED_PERMISSIONS: &[(&str, Permission)] = &[
    ("GET /patients", Permission::ViewPatient),
    ("POST /patients", Permission::AddPatient),
    ("GET /patients/:id", Permission::ViewPatient),
    ("PUT /patients/:id", Permission::ChangePatient),
    ("DELETE /patients/:id", Permission::DeletePatient),
    ("GET /patients/stats", Permission::ViewBasicReports),
    ("GET /wounds", Permission::ViewWoundCase),
    ("POST /wounds", Permission::AddWoundCase),
    ("GET /wounds/:id", Permission::ViewWoundCase),
    ("PUT /wounds/:id", Permission::ChangeWoundCase),
    ("PUT /wounds/:id/status", Permission::ChangeWoundCase),
    ("GET /wounds/stats", Permission::ViewBasicReports),
    ("POST /wounds/:id/treatments", Permission::TreatWound),
    ("GET /wounds/:id/treatments", Permission::ViewTreatmentHistory),
    ("POST /wounds/:id/followups", Permission::TreatWound),
    ("GET /wounds/:id/followups", Permission::ViewTreatmentHistory),
    ("GET /wounds/:id/billing", Permission::ManageWoundBilling),
    ("PUT /wounds/:id/billing", Permission::ManageWoundBilling),
    ("GET /wounds/:id/payments", Permission::ProcessPayment),
    ("POST /wounds/:id/payments", Permission::ProcessPayment),
    ("PUT /payments/:id/status", Permission::ProcessPayment),
    ("POST /wounds/:id/claims", Permission::ManageInsurance),
    ("PUT /claims/:id", Permission::ManageInsurance),
    ("GET /appointments", Permission::ViewAppointment),
    ("POST /appointments", Permission::AddAppointment),
    ("GET /appointments/:id", Permission::ViewAppointment),
    ("PUT /appointments/:id/status", Permission::ChangeAppointment),
    ("PUT /appointments/:id/reschedule", Permission::ChangeAppointment),
    ("POST /appointments/:id/remind", Permission::ViewAppointment),
    ("GET /appointments/stats", Permission::ViewBasicReports),
    ("POST /visits", Permission::AddMedicalRecord),
    ("POST /vitals", Permission::AddMedicalRecord),
    ("GET /patients/:id/vitals", Permission::ViewMedicalHistory),
    ("POST /notes", Permission::AddMedicalRecord),
    ("GET /patients/:id/notes", Permission::ViewMedicalHistory),
    ("POST /lab-requests", Permission::CreateLabRequest),
    ("GET /lab-requests", Permission::ViewLabRequest),
    ("GET /lab-requests/:id", Permission::ViewLabRequest),
    ("POST /lab-requests/:id/results", Permission::ProcessLabResults),
    ("POST /prescriptions", Permission::CreatePrescription),
    ("GET /prescriptions", Permission::ViewPrescription),
    ("GET /prescriptions/:id", Permission::ViewPrescription),
    ("POST /prescriptions/:id/dispense", Permission::DispenseMedication),
    ("POST /admissions", Permission::AddMedicalRecord),
    ("PUT /admissions/:id/discharge", Permission::AddMedicalRecord),
    ("POST /radiology", Permission::CreateRadiologyRequest),
    ("PUT /radiology/:id/status", Permission::ProcessRadiologyResults),
    ("POST /credit-accounts", Permission::ViewFinancialReports),
    ("POST /credit-accounts/:id/charge", Permission::ProcessPayment),
    ("POST /credit-accounts/:id/repay", Permission::ProcessPayment),
    ("POST /invoices", Permission::CreateInvoice),
    ("GET /invoices/:id", Permission::ViewInvoice),
    ("POST /invoices/:id/payments", Permission::ProcessPayment),
    ("GET /search", Permission::ViewPatient),
    ("GET /notifications", Permission::ViewSchedule),
    ("PUT /notifications/:id/read", Permission::ViewSchedule),
    ("GET /dashboard", Permission::ViewAnalyticsDashboard),
    ("GET /export/patients", Permission::ExportData),
    ("GET /export/wounds", Permission::ExportData),
];

/// Look up the permission a route demands.
pub fn permission_for(route: &str) -> Option<Permission> {
    REQUIRED_PERMISSIONS
        .iter()
        .find(|(r, _)| *r == route)
        .map(|(_, p)| *p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmis_core::rbac::Role;
    use hmis_core::repositories::identity::NewStaff;
    use hmis_core::Store;

    fn staff(identity: &IdentityService, role: Role, employee_id: &str) {
        identity
            .create_staff(&NewStaff {
                username: format!("user.{employee_id}"),
                password: "longenough".into(),
                email: String::new(),
                first_name: "Test".into(),
                last_name: "User".into(),
                role,
                employee_id: Some(employee_id.into()),
                department_id: None,
                phone: String::new(),
                specialization: String::new(),
            })
            .unwrap();
    }

    #[test]
    fn every_declared_permission_is_reachable() {
        let required: Vec<Permission> =
            REQUIRED_PERMISSIONS.iter().map(|(_, p)| *p).collect();
        assert_eq!(unreachable_permissions(&required), vec![]);
    }

    #[test]
    fn authenticate_resolves_active_profiles_only() {
        let store = Store::open_in_memory().unwrap();
        let identity = IdentityService::new(store);
        staff(&identity, Role::Nurse, "EMP-9001");

        let profile = authenticate(&identity, Some("EMP-9001")).unwrap();
        assert_eq!(profile.role, Role::Nurse);

        assert!(matches!(
            authenticate(&identity, None),
            Err(AuthError::MissingCredential)
        ));
        assert!(matches!(
            authenticate(&identity, Some("  ")),
            Err(AuthError::MissingCredential)
        ));
        assert!(matches!(
            authenticate(&identity, Some("EMP-0000")),
            Err(AuthError::UnknownCredential)
        ));

        identity.deactivate_account(profile.account_id).unwrap();
        assert!(matches!(
            authenticate(&identity, Some("EMP-9001")),
            Err(AuthError::UnknownCredential)
        ));
    }

    #[test]
    fn require_gates_by_role() {
        let store = Store::open_in_memory().unwrap();
        let identity = IdentityService::new(store);
        staff(&identity, Role::Cashier, "EMP-9002");
        let profile = authenticate(&identity, Some("EMP-9002")).unwrap();

        assert!(require(&profile, Permission::ProcessPayment).is_ok());
        assert!(matches!(
            require(&profile, Permission::CreatePrescription),
            Err(AuthError::Forbidden(Permission::CreatePrescription))
        ));
    }

    #[test]
    fn permission_lookup_matches_table() {
        assert_eq!(
            permission_for("POST /wounds"),
            Some(Permission::AddWoundCase)
        );
        assert_eq!(permission_for("GET /nowhere"), None);
    }
}
