//! Laboratory, pharmacy, admissions and radiology endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use hmis_core::rbac::Permission;
use hmis_core::repositories::inpatient::{Admission, RadiologyRequest};
use hmis_core::repositories::laboratory::{LabRequest, LabRequestInput, LabResult};
use hmis_core::repositories::pharmacy::{Prescription, PrescriptionInput};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PatientQuery {
    #[serde(default)]
    pub patient_id: Option<i64>,
}

// -- Laboratory -------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct LabRequestDetail {
    #[serde(flatten)]
    pub request: LabRequest,
    pub results: Vec<LabResult>,
}

#[derive(Debug, Deserialize)]
pub struct LabResultReq {
    pub test_id: i64,
    pub result: String,
    #[serde(default)]
    pub flag: String,
    #[serde(default)]
    pub notes: String,
}

pub async fn create_lab_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<LabRequestInput>,
) -> ApiResult<(StatusCode, Json<LabRequest>)> {
    state.authorize(&headers, Permission::CreateLabRequest)?;
    let request = state.laboratory.create_request(&input)?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Without a `patient_id` filter this lists the lab work queue.
pub async fn list_lab_requests(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PatientQuery>,
) -> ApiResult<Json<Vec<LabRequest>>> {
    state.authorize(&headers, Permission::ViewLabRequest)?;
    let rows = match query.patient_id {
        Some(patient_id) => state.laboratory.requests_for_patient(patient_id)?,
        None => state.laboratory.pending_requests()?,
    };
    Ok(Json(rows))
}

pub async fn get_lab_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<LabRequestDetail>> {
    state.authorize(&headers, Permission::ViewLabRequest)?;
    let request = state.laboratory.request(id)?;
    let results = state.laboratory.results_for_request(id)?;
    Ok(Json(LabRequestDetail { request, results }))
}

pub async fn enter_lab_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<LabResultReq>,
) -> ApiResult<(StatusCode, Json<LabResult>)> {
    let profile = state.authorize(&headers, Permission::ProcessLabResults)?;
    let result = state.laboratory.enter_result(
        id,
        req.test_id,
        &req.result,
        &req.flag,
        &req.notes,
        profile.id,
    )?;
    Ok((StatusCode::CREATED, Json(result)))
}

// -- Pharmacy ---------------------------------------------------------------

pub async fn create_prescription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<PrescriptionInput>,
) -> ApiResult<(StatusCode, Json<Prescription>)> {
    state.authorize(&headers, Permission::CreatePrescription)?;
    let prescription = state.pharmacy.create_prescription(&input)?;
    Ok((StatusCode::CREATED, Json(prescription)))
}

/// Without a `patient_id` filter this lists the dispensing queue.
pub async fn list_prescriptions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PatientQuery>,
) -> ApiResult<Json<Vec<Prescription>>> {
    state.authorize(&headers, Permission::ViewPrescription)?;
    let rows = match query.patient_id {
        Some(patient_id) => state.pharmacy.prescriptions_for_patient(patient_id)?,
        None => state.pharmacy.undispensed()?,
    };
    Ok(Json(rows))
}

pub async fn get_prescription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Prescription>> {
    state.authorize(&headers, Permission::ViewPrescription)?;
    Ok(Json(state.pharmacy.prescription(id)?))
}

pub async fn dispense(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Prescription>> {
    let profile = state.authorize(&headers, Permission::DispenseMedication)?;
    Ok(Json(state.pharmacy.dispense(id, profile.id)?))
}

// -- Admissions and radiology ----------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AdmitReq {
    pub patient_id: i64,
    #[serde(default)]
    pub doctor_profile_id: Option<i64>,
    pub ward: String,
    pub bed_number: String,
    #[serde(default)]
    pub diagnosis: String,
}

#[derive(Debug, Deserialize)]
pub struct ImagingReq {
    pub patient_id: i64,
    #[serde(default)]
    pub doctor_profile_id: Option<i64>,
    pub examination_type: String,
    #[serde(default)]
    pub clinical_info: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusReq {
    pub status: String,
}

pub async fn admit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AdmitReq>,
) -> ApiResult<(StatusCode, Json<Admission>)> {
    let profile = state.authorize(&headers, Permission::AddMedicalRecord)?;
    let doctor = req.doctor_profile_id.unwrap_or(profile.id);
    let admission = state.inpatient.admit(
        req.patient_id,
        doctor,
        &req.ward,
        &req.bed_number,
        &req.diagnosis,
    )?;
    Ok((StatusCode::CREATED, Json(admission)))
}

pub async fn discharge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Admission>> {
    state.authorize(&headers, Permission::AddMedicalRecord)?;
    Ok(Json(state.inpatient.discharge(id)?))
}

pub async fn request_imaging(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ImagingReq>,
) -> ApiResult<(StatusCode, Json<RadiologyRequest>)> {
    let profile = state.authorize(&headers, Permission::CreateRadiologyRequest)?;
    let doctor = req.doctor_profile_id.unwrap_or(profile.id);
    let request = state.inpatient.request_imaging(
        req.patient_id,
        doctor,
        &req.examination_type,
        &req.clinical_info,
    )?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn set_imaging_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<StatusReq>,
) -> ApiResult<Json<RadiologyRequest>> {
    state.authorize(&headers, Permission::ProcessRadiologyResults)?;
    Ok(Json(state.inpatient.set_imaging_status(id, &req.status)?))
}
