//! Outpatient visits, vital signs and nursing notes.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use hmis_core::rbac::Permission;
use hmis_core::repositories::clinical::{
    NursingNote, OutpatientVisit, VisitInput, VitalSigns, VitalSignsInput,
};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NoteReq {
    pub patient_id: i64,
    #[serde(default = "default_note_type")]
    pub note_type: String,
    pub note: String,
}

fn default_note_type() -> String {
    "general".into()
}

pub async fn create_visit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<VisitInput>,
) -> ApiResult<(StatusCode, Json<OutpatientVisit>)> {
    state.authorize(&headers, Permission::AddMedicalRecord)?;
    let visit = state.clinical.create_visit(&input)?;
    Ok((StatusCode::CREATED, Json(visit)))
}

pub async fn record_vitals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<VitalSignsInput>,
) -> ApiResult<(StatusCode, Json<VitalSigns>)> {
    state.authorize(&headers, Permission::AddMedicalRecord)?;
    let vitals = state.clinical.record_vitals(&input)?;
    Ok((StatusCode::CREATED, Json(vitals)))
}

pub async fn vitals_for_patient(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<VitalSigns>>> {
    state.authorize(&headers, Permission::ViewMedicalHistory)?;
    Ok(Json(state.clinical.vitals_for_patient(id)?))
}

pub async fn add_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NoteReq>,
) -> ApiResult<(StatusCode, Json<NursingNote>)> {
    let profile = state.authorize(&headers, Permission::AddMedicalRecord)?;
    let note = state
        .clinical
        .add_note(req.patient_id, profile.id, &req.note_type, &req.note)?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn notes_for_patient(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<NursingNote>>> {
    state.authorize(&headers, Permission::ViewMedicalHistory)?;
    Ok(Json(state.clinical.notes_for_patient(id)?))
}
