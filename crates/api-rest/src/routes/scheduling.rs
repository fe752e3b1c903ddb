//! Appointment booking and scheduling endpoints.

use api_shared::dto::{AppointmentReq, AppointmentRes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use chrono::{DateTime, Utc};
use hmis_core::rbac::Permission;
use hmis_core::repositories::appointments::{AppointmentInput, AppointmentStats};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub patient_id: Option<i64>,
    #[serde(default)]
    pub doctor_profile_id: Option<i64>,
    #[serde(default)]
    pub today: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusReq {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleReq {
    pub scheduled_at: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/appointments",
    responses(
        (status = 200, description = "Appointments", body = [AppointmentRes])
    )
)]
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<AppointmentRes>>> {
    state.authorize(&headers, Permission::ViewAppointment)?;
    let rows = if query.today {
        state.appointments.list_today()?
    } else if let Some(patient_id) = query.patient_id {
        state.appointments.list_for_patient(patient_id)?
    } else if let Some(doctor) = query.doctor_profile_id {
        state.appointments.list_for_doctor(doctor)?
    } else {
        state.appointments.list()?
    };
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/appointments",
    request_body = AppointmentReq,
    responses(
        (status = 201, description = "Appointment booked", body = AppointmentRes),
        (status = 404, description = "Referenced patient, doctor or clinic missing"),
        (status = 422, description = "Slot in the past")
    )
)]
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AppointmentReq>,
) -> ApiResult<(StatusCode, Json<AppointmentRes>)> {
    state.authorize(&headers, Permission::AddAppointment)?;
    let input: AppointmentInput = req.into();
    let appointment = state.appointments.create(&input)?;
    Ok((StatusCode::CREATED, Json(appointment.into())))
}

#[utoipa::path(
    get,
    path = "/appointments/{id}",
    params(("id" = i64, Path, description = "Appointment id")),
    responses(
        (status = 200, description = "Appointment", body = AppointmentRes),
        (status = 404, description = "No such appointment")
    )
)]
pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<AppointmentRes>> {
    state.authorize(&headers, Permission::ViewAppointment)?;
    Ok(Json(state.appointments.get(id)?.into()))
}

pub async fn set_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<StatusReq>,
) -> ApiResult<Json<AppointmentRes>> {
    state.authorize(&headers, Permission::ChangeAppointment)?;
    Ok(Json(state.appointments.set_status(id, &req.status)?.into()))
}

pub async fn reschedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<RescheduleReq>,
) -> ApiResult<Json<AppointmentRes>> {
    state.authorize(&headers, Permission::ChangeAppointment)?;
    Ok(Json(
        state.appointments.reschedule(id, req.scheduled_at)?.into(),
    ))
}

pub async fn remind(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<AppointmentRes>> {
    state.authorize(&headers, Permission::ViewAppointment)?;
    Ok(Json(state.appointments.send_reminder(id)?.into()))
}

pub async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<AppointmentStats>> {
    state.authorize(&headers, Permission::ViewBasicReports)?;
    Ok(Json(state.appointments.stats()?))
}
