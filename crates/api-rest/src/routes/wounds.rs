//! Wound case endpoints, including treatments and follow-up visits.

use api_shared::dto::{WoundCaseReq, WoundCaseRes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use hmis_core::rbac::Permission;
use hmis_core::repositories::wounds::{
    FollowupInput, TreatmentInput, WoundCaseInput, WoundFollowup, WoundStats, WoundTreatment,
};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::routes::patients::remote_addr;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub patient_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusReq {
    pub status: String,
}

#[utoipa::path(
    get,
    path = "/wounds",
    responses(
        (status = 200, description = "Wound cases", body = [WoundCaseRes])
    )
)]
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<WoundCaseRes>>> {
    state.authorize(&headers, Permission::ViewWoundCase)?;
    let cases = match query.patient_id {
        Some(patient_id) => state.wounds.list_for_patient(patient_id)?,
        None => state.wounds.list()?,
    };
    Ok(Json(cases.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/wounds",
    request_body = WoundCaseReq,
    responses(
        (status = 201, description = "Wound case opened with its billing record", body = WoundCaseRes),
        (status = 404, description = "Referenced patient or lookup missing"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<WoundCaseReq>,
) -> ApiResult<(StatusCode, Json<WoundCaseRes>)> {
    let profile = state.authorize(&headers, Permission::AddWoundCase)?;
    let input: WoundCaseInput = req.into();
    let case = state.wounds.create(&input)?;
    state.audit.record(
        Some(profile.id),
        "create",
        "wound_case",
        &case.wound_id,
        "",
        remote_addr(&headers),
    );
    Ok((StatusCode::CREATED, Json(case.into())))
}

#[utoipa::path(
    get,
    path = "/wounds/{id}",
    params(("id" = i64, Path, description = "Wound case id")),
    responses(
        (status = 200, description = "Wound case", body = WoundCaseRes),
        (status = 404, description = "No such wound case")
    )
)]
pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<WoundCaseRes>> {
    state.authorize(&headers, Permission::ViewWoundCase)?;
    Ok(Json(state.wounds.get(id)?.into()))
}

#[utoipa::path(
    put,
    path = "/wounds/{id}",
    request_body = WoundCaseReq,
    params(("id" = i64, Path, description = "Wound case id")),
    responses(
        (status = 200, description = "Wound case updated", body = WoundCaseRes),
        (status = 404, description = "No such wound case")
    )
)]
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<WoundCaseReq>,
) -> ApiResult<Json<WoundCaseRes>> {
    state.authorize(&headers, Permission::ChangeWoundCase)?;
    let input: WoundCaseInput = req.into();
    Ok(Json(state.wounds.update(id, &input)?.into()))
}

#[utoipa::path(
    put,
    path = "/wounds/{id}/status",
    params(("id" = i64, Path, description = "Wound case id")),
    responses(
        (status = 200, description = "Status changed", body = WoundCaseRes),
        (status = 422, description = "Unknown status")
    )
)]
pub async fn set_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<StatusReq>,
) -> ApiResult<Json<WoundCaseRes>> {
    state.authorize(&headers, Permission::ChangeWoundCase)?;
    Ok(Json(state.wounds.set_status(id, &req.status)?.into()))
}

pub async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<WoundStats>> {
    state.authorize(&headers, Permission::ViewBasicReports)?;
    Ok(Json(state.wounds.stats()?))
}

pub async fn add_treatment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(mut input): Json<TreatmentInput>,
) -> ApiResult<(StatusCode, Json<WoundTreatment>)> {
    let profile = state.authorize(&headers, Permission::TreatWound)?;
    if input.performed_by_profile_id.is_none() {
        input.performed_by_profile_id = Some(profile.id);
    }
    let treatment = state.wounds.add_treatment(id, &input)?;
    Ok((StatusCode::CREATED, Json(treatment)))
}

pub async fn treatments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<WoundTreatment>>> {
    state.authorize(&headers, Permission::ViewTreatmentHistory)?;
    Ok(Json(state.wounds.treatments(id)?))
}

pub async fn add_followup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(input): Json<FollowupInput>,
) -> ApiResult<(StatusCode, Json<WoundFollowup>)> {
    state.authorize(&headers, Permission::TreatWound)?;
    let followup = state.wounds.add_followup(id, &input)?;
    Ok((StatusCode::CREATED, Json(followup)))
}

pub async fn followups(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<WoundFollowup>>> {
    state.authorize(&headers, Permission::ViewTreatmentHistory)?;
    Ok(Json(state.wounds.followups(id)?))
}
