//! # API REST
//!
//! REST API implementation for the HMIS.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - Header-credential authentication and per-route permission checks
//!
//! Uses `api-shared` for DTOs, auth utilities and the health service.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::system::health,
        routes::patients::list,
        routes::patients::create,
        routes::patients::get,
        routes::patients::update,
        routes::patients::deactivate,
        routes::wounds::list,
        routes::wounds::create,
        routes::wounds::get,
        routes::wounds::update,
        routes::wounds::set_status,
        routes::billing::get_billing,
        routes::billing::update_charges,
        routes::billing::record_payment,
        routes::scheduling::list,
        routes::scheduling::create,
        routes::scheduling::get,
    ),
    components(schemas(
        api_shared::health::HealthRes,
        api_shared::dto::ErrorRes,
        api_shared::dto::PatientReq,
        api_shared::dto::PatientRes,
        api_shared::dto::WoundCaseReq,
        api_shared::dto::WoundCaseRes,
        api_shared::dto::AppointmentReq,
        api_shared::dto::AppointmentRes,
        api_shared::dto::ChargesReq,
        api_shared::dto::BillingRes,
        api_shared::dto::PaymentReq,
        api_shared::dto::PaymentRes,
    ))
)]
pub struct ApiDoc;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    use routes::*;

    Router::new()
        .route("/health", get(system::health))
        .route("/patients", get(patients::list).post(patients::create))
        .route("/patients/stats", get(patients::stats))
        .route(
            "/patients/:id",
            get(patients::get)
                .put(patients::update)
                .delete(patients::deactivate),
        )
        .route("/patients/:id/vitals", get(clinical::vitals_for_patient))
        .route("/patients/:id/notes", get(clinical::notes_for_patient))
        .route("/wounds", get(wounds::list).post(wounds::create))
        .route("/wounds/stats", get(wounds::stats))
        .route("/wounds/:id", get(wounds::get).put(wounds::update))
        .route("/wounds/:id/status", put(wounds::set_status))
        .route(
            "/wounds/:id/treatments",
            get(wounds::treatments).post(wounds::add_treatment),
        )
        .route(
            "/wounds/:id/followups",
            get(wounds::followups).post(wounds::add_followup),
        )
        .route(
            "/wounds/:id/billing",
            get(billing::get_billing).put(billing::update_charges),
        )
        .route(
            "/wounds/:id/payments",
            get(billing::payments).post(billing::record_payment),
        )
        .route("/payments/:id/status", put(billing::set_payment_status))
        .route("/wounds/:id/claims", post(billing::create_claim))
        .route("/claims/:id", put(billing::claim_action))
        .route(
            "/appointments",
            get(scheduling::list).post(scheduling::create),
        )
        .route("/appointments/stats", get(scheduling::stats))
        .route("/appointments/:id", get(scheduling::get))
        .route("/appointments/:id/status", put(scheduling::set_status))
        .route("/appointments/:id/reschedule", put(scheduling::reschedule))
        .route("/appointments/:id/remind", post(scheduling::remind))
        .route("/visits", post(clinical::create_visit))
        .route("/vitals", post(clinical::record_vitals))
        .route("/notes", post(clinical::add_note))
        .route(
            "/lab-requests",
            get(ancillary::list_lab_requests).post(ancillary::create_lab_request),
        )
        .route("/lab-requests/:id", get(ancillary::get_lab_request))
        .route(
            "/lab-requests/:id/results",
            post(ancillary::enter_lab_result),
        )
        .route(
            "/prescriptions",
            get(ancillary::list_prescriptions).post(ancillary::create_prescription),
        )
        .route("/prescriptions/:id", get(ancillary::get_prescription))
        .route("/prescriptions/:id/dispense", post(ancillary::dispense))
        .route("/admissions", post(ancillary::admit))
        .route("/admissions/:id/discharge", put(ancillary::discharge))
        .route("/radiology", post(ancillary::request_imaging))
        .route("/radiology/:id/status", put(ancillary::set_imaging_status))
        .route("/credit-accounts", post(billing::open_account))
        .route("/credit-accounts/:id/charge", post(billing::charge_account))
        .route("/credit-accounts/:id/repay", post(billing::repay_account))
        .route("/invoices", post(billing::create_invoice))
        .route("/invoices/:id", get(billing::get_invoice))
        .route("/invoices/:id/payments", post(billing::pay_invoice))
        .route("/search", get(system::search))
        .route("/notifications", get(system::notifications))
        .route(
            "/notifications/:id/read",
            put(system::mark_notification_read),
        )
        .route("/dashboard", get(system::dashboard))
        .route("/export/patients", get(system::export_patients))
        .route("/export/wounds", get(system::export_wounds))
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use hmis_core::rbac::Role;
    use hmis_core::repositories::identity::NewStaff;
    use hmis_core::{EventBus, Store};
    use tower::ServiceExt;

    const ADMIN: &str = "EMP-0001";
    const RECEPTION: &str = "EMP-0007";
    const CASHIER: &str = "EMP-0004";

    fn app() -> Router {
        let store = Store::open_in_memory().unwrap();
        let state = AppState::new(store, EventBus::new());
        for (employee_id, role) in [
            (ADMIN, Role::SuperAdmin),
            (RECEPTION, Role::Receptionist),
            (CASHIER, Role::Cashier),
        ] {
            state
                .identity
                .create_staff(&NewStaff {
                    username: format!("u.{employee_id}"),
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
        router(state)
    }

    fn json_request(method: &str, uri: &str, employee: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-employee-id", employee)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn patient_body(mrn: &str) -> serde_json::Value {
        serde_json::json!({
            "first_name": "Chanda",
            "last_name": "Mulenga",
            "date_of_birth": "1985-03-20",
            "gender": "F",
            "medical_record_number": mrn
        })
    }

    #[tokio::test]
    async fn health_is_open() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_credential_is_unauthorised() {
        let response = app()
            .oneshot(Request::get("/patients").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn receptionist_cannot_deactivate_patients() {
        let app = app();
        let created = app
            .clone()
            .oneshot(json_request("POST", "/patients", RECEPTION, patient_body("MRN-1")))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let patient = body_json(created).await;
        let id = patient["id"].as_i64().unwrap();

        let denied = app
            .oneshot(
                Request::delete(format!("/patients/{id}"))
                    .header("x-employee-id", RECEPTION)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn patient_round_trip_includes_derived_fields() {
        let app = app();
        let created = app
            .clone()
            .oneshot(json_request("POST", "/patients", RECEPTION, patient_body("MRN-2")))
            .await
            .unwrap();
        let patient = body_json(created).await;
        assert_eq!(patient["full_name"], "Chanda Mulenga");
        assert!(patient["age"].as_i64().unwrap() >= 40);

        let dup = app
            .oneshot(json_request("POST", "/patients", RECEPTION, patient_body("MRN-2")))
            .await
            .unwrap();
        assert_eq!(dup.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn wound_case_opens_with_zero_billing_and_accepts_payment() {
        let app = app();
        let patient = body_json(
            app.clone()
                .oneshot(json_request("POST", "/patients", RECEPTION, patient_body("MRN-3")))
                .await
                .unwrap(),
        )
        .await;
        let patient_id = patient["id"].as_i64().unwrap();

        let case = body_json(
            app.clone()
                .oneshot(json_request(
                    "POST",
                    "/wounds",
                    ADMIN,
                    serde_json::json!({
                        "patient_id": patient_id,
                        "length_cm": 4.0,
                        "width_cm": 3.0,
                        "pain_level": 4
                    }),
                ))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(case["wound_id"], "WND-00001");
        assert_eq!(case["surface_area_cm2"].as_f64().unwrap(), 12.0);
        let case_id = case["id"].as_i64().unwrap();

        let billing = body_json(
            app.clone()
                .oneshot(
                    Request::get(format!("/wounds/{case_id}/billing"))
                        .header("x-employee-id", CASHIER)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(billing["total_amount"].as_i64().unwrap(), 0);

        let updated = body_json(
            app.clone()
                .oneshot(json_request(
                    "PUT",
                    &format!("/wounds/{case_id}/billing"),
                    CASHIER,
                    serde_json::json!({ "assessment_fee": 50000, "treatment_fee": 35000 }),
                ))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(updated["total_amount"].as_i64().unwrap(), 85000);

        let payment = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/wounds/{case_id}/payments"),
                CASHIER,
                serde_json::json!({ "amount": 45000, "method": "cash" }),
            ))
            .await
            .unwrap();
        assert_eq!(payment.status(), StatusCode::CREATED);
        let payment = body_json(payment).await;
        assert_eq!(payment["receipt_number"], "RCT-00001");

        let after = body_json(
            app.oneshot(
                Request::get(format!("/wounds/{case_id}/billing"))
                    .header("x-employee-id", CASHIER)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap(),
        )
        .await;
        assert_eq!(after["balance"].as_i64().unwrap(), 40000);
        assert_eq!(after["payment_status"], "partial");
    }

    #[tokio::test]
    async fn unknown_wound_status_is_unprocessable() {
        let app = app();
        let patient = body_json(
            app.clone()
                .oneshot(json_request("POST", "/patients", RECEPTION, patient_body("MRN-4")))
                .await
                .unwrap(),
        )
        .await;
        let case = body_json(
            app.clone()
                .oneshot(json_request(
                    "POST",
                    "/wounds",
                    ADMIN,
                    serde_json::json!({ "patient_id": patient["id"] }),
                ))
                .await
                .unwrap(),
        )
        .await;
        let response = app
            .oneshot(json_request(
                "PUT",
                &format!("/wounds/{}/status", case["id"]),
                ADMIN,
                serde_json::json!({ "status": "vanished" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
