//! Billing endpoints: wound charges, payments, insurance claims, credit
//! accounts and service invoices.

use api_shared::dto::{BillingRes, ChargesReq, PaymentReq, PaymentRes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use hmis_core::rbac::Permission;
use hmis_core::repositories::billing::{
    BillingAccount, ChargesInput, CreditTransaction, InsuranceClaim, Invoice,
};
use hmis_core::HmisError;
use hmis_types::Money;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::routes::patients::remote_addr;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/wounds/{id}/billing",
    params(("id" = i64, Path, description = "Wound case id")),
    responses(
        (status = 200, description = "Billing record for the case", body = BillingRes),
        (status = 404, description = "No such wound case")
    )
)]
pub async fn get_billing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<BillingRes>> {
    state.authorize(&headers, Permission::ManageWoundBilling)?;
    Ok(Json(state.billing.billing_for_case(id)?.into()))
}

#[utoipa::path(
    put,
    path = "/wounds/{id}/billing",
    request_body = ChargesReq,
    params(("id" = i64, Path, description = "Wound case id")),
    responses(
        (status = 200, description = "Charges updated, totals rederived", body = BillingRes),
        (status = 422, description = "Negative charge component")
    )
)]
pub async fn update_charges(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<ChargesReq>,
) -> ApiResult<Json<BillingRes>> {
    state.authorize(&headers, Permission::ManageWoundBilling)?;
    let charges: ChargesInput = req.into();
    Ok(Json(state.billing.update_charges(id, &charges)?.into()))
}

#[utoipa::path(
    post,
    path = "/wounds/{id}/payments",
    request_body = PaymentReq,
    params(("id" = i64, Path, description = "Wound case id")),
    responses(
        (status = 201, description = "Payment recorded with receipt number", body = PaymentRes),
        (status = 422, description = "Bad amount or unknown method")
    )
)]
pub async fn record_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<PaymentReq>,
) -> ApiResult<(StatusCode, Json<PaymentRes>)> {
    let profile = state.authorize(&headers, Permission::ProcessPayment)?;
    let billing = state.billing.billing_for_case(id)?;
    let payment = state.billing.record_payment(
        billing.id,
        req.amount,
        &req.method,
        &req.details(),
        Some(profile.id),
    )?;
    state.audit.record(
        Some(profile.id),
        "payment",
        "wound_billing",
        &payment.receipt_number,
        &payment.amount.to_string(),
        remote_addr(&headers),
    );
    Ok((StatusCode::CREATED, Json(payment.into())))
}

pub async fn payments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<PaymentRes>>> {
    state.authorize(&headers, Permission::ProcessPayment)?;
    let billing = state.billing.billing_for_case(id)?;
    let rows = state.billing.payments_for_billing(billing.id)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusReq {
    /// pending, completed, failed, cancelled or refunded.
    pub status: String,
}

pub async fn set_payment_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<PaymentStatusReq>,
) -> ApiResult<Json<PaymentRes>> {
    state.authorize(&headers, Permission::ProcessPayment)?;
    Ok(Json(state.billing.set_payment_status(id, &req.status)?.into()))
}

// -- Claims -----------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ClaimReq {
    #[serde(default)]
    pub insurance_provider_id: Option<i64>,
    pub claim_amount: Money,
    #[serde(default)]
    pub notes: String,
}

/// One lifecycle step applied to a claim.
#[derive(Debug, Deserialize)]
pub struct ClaimActionReq {
    /// submit, review, approve, reject or settle.
    pub action: String,
    #[serde(default)]
    pub approved_amount: Option<Money>,
    #[serde(default)]
    pub paid_amount: Option<Money>,
}

pub async fn create_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<ClaimReq>,
) -> ApiResult<(StatusCode, Json<InsuranceClaim>)> {
    state.authorize(&headers, Permission::ManageInsurance)?;
    let billing = state.billing.billing_for_case(id)?;
    let claim = state.billing.create_claim(
        billing.id,
        req.insurance_provider_id,
        req.claim_amount,
        &req.notes,
    )?;
    Ok((StatusCode::CREATED, Json(claim)))
}

pub async fn claim_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<ClaimActionReq>,
) -> ApiResult<Json<InsuranceClaim>> {
    state.authorize(&headers, Permission::ManageInsurance)?;
    let claim = match req.action.as_str() {
        "submit" => state.billing.submit_claim(id)?,
        "review" => state.billing.review_claim(id)?,
        "approve" => state.billing.resolve_claim(id, true, req.approved_amount)?,
        "reject" => state.billing.resolve_claim(id, false, None)?,
        "settle" => {
            let paid = req.paid_amount.ok_or_else(|| {
                ApiError::from(HmisError::InvalidInput(
                    "settle requires paid_amount".into(),
                ))
            })?;
            state.billing.settle_claim(id, paid)?
        }
        other => {
            return Err(HmisError::InvalidEnum {
                field: "action".into(),
                value: other.into(),
            }
            .into())
        }
    };
    Ok(Json(claim))
}

// -- Credit accounts --------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OpenAccountReq {
    pub patient_id: i64,
    pub credit_limit: Money,
    #[serde(default)]
    pub corporate_scheme_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MovementReq {
    pub amount: Money,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub notes: String,
}

pub async fn open_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<OpenAccountReq>,
) -> ApiResult<(StatusCode, Json<BillingAccount>)> {
    state.authorize(&headers, Permission::ViewFinancialReports)?;
    let account =
        state
            .billing
            .open_account(req.patient_id, req.credit_limit, req.corporate_scheme_id)?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn charge_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<MovementReq>,
) -> ApiResult<(StatusCode, Json<CreditTransaction>)> {
    state.authorize(&headers, Permission::ProcessPayment)?;
    let movement = state
        .billing
        .charge_account(id, req.amount, &req.reference, &req.notes)?;
    Ok((StatusCode::CREATED, Json(movement)))
}

pub async fn repay_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<MovementReq>,
) -> ApiResult<(StatusCode, Json<CreditTransaction>)> {
    state.authorize(&headers, Permission::ProcessPayment)?;
    let movement = state
        .billing
        .repay_account(id, req.amount, &req.reference, &req.notes)?;
    Ok((StatusCode::CREATED, Json(movement)))
}

// -- Invoices ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct InvoiceLineReq {
    pub service_id: i64,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceReq {
    pub patient_id: i64,
    pub lines: Vec<InvoiceLineReq>,
}

#[derive(Debug, Deserialize)]
pub struct InvoicePaymentReq {
    pub amount: Money,
}

pub async fn create_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InvoiceReq>,
) -> ApiResult<(StatusCode, Json<Invoice>)> {
    state.authorize(&headers, Permission::CreateInvoice)?;
    let lines: Vec<(i64, u32)> = req
        .lines
        .iter()
        .map(|l| (l.service_id, l.quantity))
        .collect();
    let invoice = state.billing.create_invoice(req.patient_id, &lines)?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Invoice>> {
    state.authorize(&headers, Permission::ViewInvoice)?;
    Ok(Json(state.billing.invoice(id)?))
}

pub async fn pay_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<InvoicePaymentReq>,
) -> ApiResult<Json<Invoice>> {
    state.authorize(&headers, Permission::ProcessPayment)?;
    Ok(Json(state.billing.record_invoice_payment(id, req.amount)?))
}
