//! Patient registration and lookup endpoints.

use api_shared::dto::{PatientReq, PatientRes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use hmis_core::rbac::Permission;
use hmis_core::repositories::patients::{PatientInput, PatientStats};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[utoipa::path(
    get,
    path = "/patients",
    responses(
        (status = 200, description = "All patients", body = [PatientRes]),
        (status = 401, description = "Missing or unknown credential"),
        (status = 403, description = "Role lacks permission")
    )
)]
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<PatientRes>>> {
    state.authorize(&headers, Permission::ViewPatient)?;
    let patients = state.patients.list(query.include_inactive)?;
    Ok(Json(patients.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = PatientReq,
    responses(
        (status = 201, description = "Patient registered", body = PatientRes),
        (status = 409, description = "Medical record number already taken"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PatientReq>,
) -> ApiResult<(StatusCode, Json<PatientRes>)> {
    let profile = state.authorize(&headers, Permission::AddPatient)?;
    let input: PatientInput = req.into();
    let patient = state.patients.create(&input)?;
    state.audit.record(
        Some(profile.id),
        "create",
        "patient",
        &patient.medical_record_number,
        "",
        remote_addr(&headers),
    );
    Ok((StatusCode::CREATED, Json(patient.into())))
}

#[utoipa::path(
    get,
    path = "/patients/{id}",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient", body = PatientRes),
        (status = 404, description = "No such patient")
    )
)]
pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<PatientRes>> {
    state.authorize(&headers, Permission::ViewPatient)?;
    Ok(Json(state.patients.get(id)?.into()))
}

#[utoipa::path(
    put,
    path = "/patients/{id}",
    request_body = PatientReq,
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient updated", body = PatientRes),
        (status = 404, description = "No such patient"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<PatientReq>,
) -> ApiResult<Json<PatientRes>> {
    state.authorize(&headers, Permission::ChangePatient)?;
    let input: PatientInput = req.into();
    Ok(Json(state.patients.update(id, &input)?.into()))
}

#[utoipa::path(
    delete,
    path = "/patients/{id}",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 204, description = "Patient deactivated"),
        (status = 404, description = "No such patient")
    )
)]
pub async fn deactivate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let profile = state.authorize(&headers, Permission::DeletePatient)?;
    state.patients.deactivate(id)?;
    state.audit.record(
        Some(profile.id),
        "deactivate",
        "patient",
        &id.to_string(),
        "",
        remote_addr(&headers),
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<PatientStats>> {
    state.authorize(&headers, Permission::ViewBasicReports)?;
    Ok(Json(state.patients.stats()?))
}

/// Best-effort client address for the audit trail.
pub(crate) fn remote_addr(headers: &HeaderMap) -> &str {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}
