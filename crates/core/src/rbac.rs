//! Role-based access control.
//!
//! Roles and permissions are closed enums and the role-to-permission mapping
//! is a static table — the single authority consulted by every guarded
//! operation. The check is plain set membership: no hierarchy, no per-record
//! ownership, no time-boxed grants.

use serde::{Deserialize, Serialize};

/// Staff roles. A profile carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Doctor,
    Nurse,
    Cashier,
    LabTech,
    Pharmacist,
    Receptionist,
    Radiologist,
    Guest,
}

/// Capability names declared by guarded operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    // Patients
    ViewPatient,
    AddPatient,
    ChangePatient,
    DeletePatient,
    ViewMedicalHistory,
    AddMedicalRecord,
    EmergencyAccess,
    // Appointments
    ViewAppointment,
    AddAppointment,
    ChangeAppointment,
    CancelAppointment,
    ViewSchedule,
    ManageSchedule,
    // Wound care
    ViewWoundCase,
    AddWoundCase,
    ChangeWoundCase,
    TreatWound,
    ViewTreatmentHistory,
    ManageWoundBilling,
    // Billing
    ViewInvoice,
    CreateInvoice,
    ModifyInvoice,
    VoidInvoice,
    ProcessPayment,
    ViewFinancialReports,
    ManageInsurance,
    // Laboratory
    ViewLabRequest,
    CreateLabRequest,
    ProcessLabResults,
    ViewLabReports,
    ManageLabInventory,
    // Pharmacy
    ViewPrescription,
    CreatePrescription,
    DispenseMedication,
    ViewPharmacyInventory,
    ManageDrugInventory,
    // Radiology
    ViewRadiologyRequest,
    CreateRadiologyRequest,
    ProcessRadiologyResults,
    ViewImagingReports,
    // Administration
    ManageUsers,
    ManageRoles,
    SystemConfiguration,
    ViewAuditLogs,
    BackupSystem,
    RestoreSystem,
    // Reporting
    ViewBasicReports,
    ViewAdvancedReports,
    ExportData,
    ViewAnalyticsDashboard,
    CreateCustomReports,
}

impl Role {
    /// Stored/wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Cashier => "cashier",
            Role::LabTech => "lab_tech",
            Role::Pharmacist => "pharmacist",
            Role::Receptionist => "receptionist",
            Role::Radiologist => "radiologist",
            Role::Guest => "guest",
        }
    }

    /// Strict parse of a stored role string.
    pub fn parse(s: &str) -> Option<Role> {
        Some(match s {
            "super_admin" => Role::SuperAdmin,
            "admin" => Role::Admin,
            "doctor" => Role::Doctor,
            "nurse" => Role::Nurse,
            "cashier" => Role::Cashier,
            "lab_tech" => Role::LabTech,
            "pharmacist" => Role::Pharmacist,
            "receptionist" => Role::Receptionist,
            "radiologist" => Role::Radiologist,
            "guest" => Role::Guest,
            _ => return None,
        })
    }

    /// Parse with the legacy-role mapping applied: retired role names fold
    /// into their modern equivalents and anything unknown becomes `Guest`.
    pub fn from_legacy(s: &str) -> Role {
        match s {
            "hr_manager" => Role::Admin,
            "accountant" => Role::Cashier,
            other => Role::parse(other).unwrap_or(Role::Guest),
        }
    }

    /// The permission set granted to this role.
    pub fn permissions(self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::SuperAdmin => &[
                ViewPatient, AddPatient, ChangePatient, DeletePatient,
                ViewMedicalHistory, AddMedicalRecord, EmergencyAccess,
                ViewAppointment, AddAppointment, ChangeAppointment,
                CancelAppointment, ViewSchedule, ManageSchedule,
                ViewWoundCase, AddWoundCase, ChangeWoundCase,
                TreatWound, ViewTreatmentHistory, ManageWoundBilling,
                ViewInvoice, CreateInvoice, ModifyInvoice, VoidInvoice,
                ProcessPayment, ViewFinancialReports, ManageInsurance,
                ViewLabRequest, CreateLabRequest, ProcessLabResults,
                ViewLabReports, ManageLabInventory,
                ViewPrescription, CreatePrescription, DispenseMedication,
                ViewPharmacyInventory, ManageDrugInventory,
                ViewRadiologyRequest, CreateRadiologyRequest,
                ProcessRadiologyResults, ViewImagingReports,
                ManageUsers, ManageRoles, SystemConfiguration,
                ViewAuditLogs, BackupSystem, RestoreSystem,
                ViewBasicReports, ViewAdvancedReports, ExportData,
                ViewAnalyticsDashboard, CreateCustomReports,
            ],
            Role::Admin => &[
                ViewPatient, AddPatient, ChangePatient,
                ViewMedicalHistory, AddMedicalRecord,
                ViewAppointment, AddAppointment, ChangeAppointment,
                CancelAppointment, ViewSchedule,
                ViewWoundCase, AddWoundCase, ChangeWoundCase,
                ViewInvoice, CreateInvoice, ModifyInvoice,
                ProcessPayment, ViewFinancialReports,
                ViewLabRequest, CreateLabRequest,
                ViewPrescription, CreatePrescription,
                ManageUsers, ViewAuditLogs, BackupSystem,
                ViewBasicReports, ViewAdvancedReports, ExportData,
            ],
            Role::Doctor => &[
                ViewPatient, AddPatient, ChangePatient,
                ViewMedicalHistory, AddMedicalRecord, EmergencyAccess,
                ViewAppointment, AddAppointment, ChangeAppointment,
                ViewSchedule, ManageSchedule,
                ViewWoundCase, AddWoundCase, ChangeWoundCase,
                TreatWound, ViewTreatmentHistory,
                ViewLabRequest, CreateLabRequest,
                ViewPrescription, CreatePrescription,
                ViewRadiologyRequest, CreateRadiologyRequest,
                ViewBasicReports,
            ],
            Role::Nurse => &[
                ViewPatient, ChangePatient, ViewMedicalHistory,
                EmergencyAccess, ViewAppointment, ChangeAppointment,
                ViewWoundCase, AddWoundCase, ChangeWoundCase,
                TreatWound, ViewTreatmentHistory,
                ViewLabRequest, ViewPrescription,
                ViewBasicReports,
            ],
            Role::Cashier => &[
                ViewPatient, ViewInvoice, CreateInvoice,
                ModifyInvoice, ProcessPayment, ViewFinancialReports,
                ManageInsurance, ManageWoundBilling, ViewBasicReports,
            ],
            Role::LabTech => &[
                ViewPatient, ViewLabRequest, CreateLabRequest,
                ProcessLabResults, ViewLabReports, ManageLabInventory,
                ViewBasicReports,
            ],
            Role::Pharmacist => &[
                ViewPatient, ViewPrescription, CreatePrescription,
                DispenseMedication, ViewPharmacyInventory,
                ManageDrugInventory, ViewBasicReports,
            ],
            Role::Receptionist => &[
                ViewPatient, AddPatient, ChangePatient,
                ViewAppointment, AddAppointment, ChangeAppointment,
                CancelAppointment, ViewSchedule,
                ViewBasicReports,
            ],
            Role::Radiologist => &[
                ViewPatient, ViewRadiologyRequest, CreateRadiologyRequest,
                ProcessRadiologyResults, ViewImagingReports,
                ViewBasicReports,
            ],
            Role::Guest => &[],
        }
    }

    /// Membership check consulted by every guarded operation.
    pub fn has_permission(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    /// All roles, for validation sweeps.
    pub const ALL: &'static [Role] = &[
        Role::SuperAdmin,
        Role::Admin,
        Role::Doctor,
        Role::Nurse,
        Role::Cashier,
        Role::LabTech,
        Role::Pharmacist,
        Role::Receptionist,
        Role::Radiologist,
        Role::Guest,
    ];
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verify that every permission a guarded surface declares is granted to at
/// least one role, returning the orphans. An orphaned permission means a
/// guarded operation nobody can ever reach — caught at test time, not in
/// production.
pub fn unreachable_permissions(required: &[Permission]) -> Vec<Permission> {
    required
        .iter()
        .copied()
        .filter(|p| !Role::ALL.iter().any(|r| r.has_permission(*p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cashier_processes_payments_but_does_not_treat() {
        assert!(Role::Cashier.has_permission(Permission::ProcessPayment));
        assert!(!Role::Cashier.has_permission(Permission::TreatWound));
    }

    #[test]
    fn doctor_treats_but_does_not_process_payments() {
        assert!(Role::Doctor.has_permission(Permission::TreatWound));
        assert!(!Role::Doctor.has_permission(Permission::ProcessPayment));
    }

    #[test]
    fn super_admin_holds_every_cashier_and_doctor_grant() {
        for p in Role::Cashier.permissions().iter().chain(Role::Doctor.permissions()) {
            assert!(Role::SuperAdmin.has_permission(*p), "{p:?} missing");
        }
    }

    #[test]
    fn legacy_roles_fold_into_modern_ones() {
        assert_eq!(Role::from_legacy("hr_manager"), Role::Admin);
        assert_eq!(Role::from_legacy("accountant"), Role::Cashier);
        assert_eq!(Role::from_legacy("doctor"), Role::Doctor);
        assert_eq!(Role::from_legacy("astronaut"), Role::Guest);
    }

    #[test]
    fn guest_has_no_grants() {
        assert!(Role::Guest.permissions().is_empty());
    }

    #[test]
    fn role_strings_round_trip() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(*role));
        }
    }

    #[test]
    fn no_unreachable_permission_in_core_set() {
        let orphans = unreachable_permissions(&[
            Permission::ViewPatient,
            Permission::TreatWound,
            Permission::ProcessPayment,
            Permission::ManageWoundBilling,
        ]);
        assert!(orphans.is_empty(), "unreachable: {orphans:?}");
    }
}
