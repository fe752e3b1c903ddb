//! Shared application state handed to every request handler.

use api_shared::auth::{self, AuthError};
use axum::http::HeaderMap;
use hmis_core::rbac::Permission;
use hmis_core::repositories::appointments::AppointmentService;
use hmis_core::repositories::audit::AuditService;
use hmis_core::repositories::billing::BillingService;
use hmis_core::repositories::clinical::ClinicalService;
use hmis_core::repositories::identity::{IdentityService, UserProfile};
use hmis_core::repositories::inpatient::InpatientService;
use hmis_core::repositories::laboratory::LaboratoryService;
use hmis_core::repositories::notifications::NotificationService;
use hmis_core::repositories::patients::PatientService;
use hmis_core::repositories::pharmacy::PharmacyService;
use hmis_core::repositories::wounds::WoundService;
use hmis_core::export::ExportService;
use hmis_core::search::SearchService;
use hmis_core::{EventBus, Store};

/// Services are thin handles over the shared store, so the state clones
/// cheaply per request.
#[derive(Clone)]
pub struct AppState {
    pub identity: IdentityService,
    pub patients: PatientService,
    pub wounds: WoundService,
    pub appointments: AppointmentService,
    pub billing: BillingService,
    pub clinical: ClinicalService,
    pub laboratory: LaboratoryService,
    pub pharmacy: PharmacyService,
    pub inpatient: InpatientService,
    pub notifications: NotificationService,
    pub audit: AuditService,
    pub search: SearchService,
    pub export: ExportService,
    pub bus: EventBus,
}

impl AppState {
    pub fn new(store: Store, bus: EventBus) -> Self {
        let wounds = WoundService::new(store.clone(), bus.clone());
        Self {
            identity: IdentityService::new(store.clone()),
            patients: PatientService::new(store.clone()),
            appointments: AppointmentService::new(store.clone(), bus.clone()),
            billing: BillingService::new(store.clone(), bus.clone()),
            clinical: ClinicalService::new(store.clone()),
            laboratory: LaboratoryService::new(store.clone(), bus.clone()),
            pharmacy: PharmacyService::new(store.clone()),
            inpatient: InpatientService::new(store.clone()),
            notifications: NotificationService::new(store.clone(), bus.clone()),
            audit: AuditService::new(store.clone()),
            search: SearchService::new(store.clone(), wounds.clone()),
            export: ExportService::new(store, wounds.clone()),
            wounds,
            bus,
        }
    }

    /// Resolve the caller from the credential header and check one
    /// permission. Every guarded handler goes through here.
    pub fn authorize(
        &self,
        headers: &HeaderMap,
        permission: Permission,
    ) -> Result<UserProfile, AuthError> {
        let employee_id = headers
            .get(auth::EMPLOYEE_ID_HEADER)
            .and_then(|v| v.to_str().ok());
        let profile = auth::authenticate(&self.identity, employee_id)?;
        auth::require(&profile, permission)?;
        Ok(profile)
    }
}
