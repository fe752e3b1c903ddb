//! Health, search, notifications, dashboard and CSV export endpoints.

use api_shared::health::{HealthRes, HealthService};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::Json;
use hmis_core::rbac::Permission;
use hmis_core::repositories::appointments::AppointmentStats;
use hmis_core::repositories::notifications::Notification;
use hmis_core::repositories::patients::PatientStats;
use hmis_core::repositories::wounds::WoundStats;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
pub async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

// -- Search -----------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    /// patients, wounds, appointments or prescriptions.
    #[serde(default = "default_entity")]
    pub entity: String,
}

fn default_entity() -> String {
    "patients".into()
}

pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    state.authorize(&headers, Permission::ViewPatient)?;
    let value = match query.entity.as_str() {
        "wounds" => serde_json::to_value(state.search.wound_cases(&query.q)?),
        "appointments" => serde_json::to_value(state.search.appointments(&query.q)?),
        "prescriptions" => serde_json::to_value(state.search.prescriptions(&query.q)?),
        _ => serde_json::to_value(state.search.patients(&query.q)?),
    }
    .map_err(hmis_core::HmisError::from)?;
    Ok(Json(value))
}

// -- Notifications ----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct NotificationListRes {
    pub unread: i64,
    pub notifications: Vec<Notification>,
}

pub async fn notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<NotificationListRes>> {
    let profile = state.authorize(&headers, Permission::ViewSchedule)?;
    let notifications = state
        .notifications
        .list_for(profile.id, query.unread_only)?;
    let unread = state.notifications.unread_count(profile.id)?;
    Ok(Json(NotificationListRes {
        unread,
        notifications,
    }))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let profile = state.authorize(&headers, Permission::ViewSchedule)?;
    state.notifications.mark_read(id, profile.id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// -- Dashboard --------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct DashboardRes {
    pub patients: PatientStats,
    pub wounds: WoundStats,
    pub appointments: AppointmentStats,
    pub pending_lab_requests: usize,
    pub undispensed_prescriptions: usize,
    pub low_stock_drugs: usize,
    pub open_admissions: usize,
}

pub async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<DashboardRes>> {
    state.authorize(&headers, Permission::ViewAnalyticsDashboard)?;
    Ok(Json(DashboardRes {
        patients: state.patients.stats()?,
        wounds: state.wounds.stats()?,
        appointments: state.appointments.stats()?,
        pending_lab_requests: state.laboratory.pending_requests()?.len(),
        undispensed_prescriptions: state.pharmacy.undispensed()?.len(),
        low_stock_drugs: state.pharmacy.low_stock()?.len(),
        open_admissions: state.inpatient.open_admissions()?.len(),
    }))
}

// -- Exports ----------------------------------------------------------------

pub async fn export_patients(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<([(header::HeaderName, &'static str); 1], String)> {
    state.authorize(&headers, Permission::ExportData)?;
    let csv = state.export.patients_csv()?;
    Ok(([(header::CONTENT_TYPE, "text/csv")], csv))
}

pub async fn export_wounds(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<([(header::HeaderName, &'static str); 1], String)> {
    state.authorize(&headers, Permission::ExportData)?;
    let csv = state.export.wound_cases_csv()?;
    Ok(([(header::CONTENT_TYPE, "text/csv")], csv))
}
