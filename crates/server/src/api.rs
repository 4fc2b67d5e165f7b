//! JSON API over [`BenefitsService`].
//!
//! - `POST /requests`                              submit a request
//! - `GET  /requests/{reference}`                  fetch by id or token
//! - `POST /requests/{id}/decisions`               approve or reject the active stage
//! - `POST /requests/{id}/cancel`                  cancel an approved booking
//! - `GET  /properties/{id}/availability`          explain a stay's conflicts
//! - `GET  /employees/{id}/eligibility`            check one request type
//! - `GET  /employees/{id}/requests`               list an employee's requests

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use benefitflow_core::approvals::{describe, ChainError, StageView};
use benefitflow_core::availability::AvailabilityReport;
use benefitflow_core::domain::employee::EmployeeId;
use benefitflow_core::domain::request::{PropertyId, Request, RequestId, RequestPayload, RequestType};
use benefitflow_core::eligibility::Eligibility;
use benefitflow_core::errors::ApplicationError;
use benefitflow_core::flows::Decision;
use benefitflow_core::intake::NewRequest;

use crate::service::{BenefitsService, DecisionInput};

#[derive(Clone)]
pub struct ApiState {
    service: Arc<BenefitsService>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub requester_id: String,
    pub payload: RequestPayload,
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub actor_id: String,
    pub decision: Decision,
    pub comment: Option<String>,
    pub level: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub actor_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StayParams {
    pub check_in: NaiveDateTime,
    pub check_out: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct EligibilityParams {
    pub request_type: String,
}

#[derive(Debug, Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: Request,
    pub active_level: Option<u8>,
    pub stages: Vec<StageView>,
}

impl From<Request> for RequestView {
    fn from(request: Request) -> Self {
        Self { active_level: request.active_level(), stages: describe(&request.chain), request }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// Failure already mapped to a status code and a user-safe body.
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl From<ApplicationError> for ApiError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        let details = value.details();
        let cause = value.to_string();
        let interface = value.into_interface(correlation_id.clone());
        let status = StatusCode::from_u16(interface.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(
                event_name = "api.request_failed",
                correlation_id = %correlation_id,
                status = status.as_u16(),
                error = %cause,
                "request failed"
            );
        } else {
            info!(
                event_name = "api.request_denied",
                correlation_id = %correlation_id,
                status = status.as_u16(),
                error = %cause,
                "request denied"
            );
        }

        Self {
            status,
            body: ErrorBody {
                error: interface.user_message().to_string(),
                correlation_id,
                details,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(service: Arc<BenefitsService>) -> Router {
    Router::new()
        .route("/requests", post(submit_request))
        .route("/requests/{reference}", get(get_request))
        .route("/requests/{id}/decisions", post(decide_request))
        .route("/requests/{id}/cancel", post(cancel_request))
        .route("/properties/{id}/availability", get(property_availability))
        .route("/employees/{id}/eligibility", get(employee_eligibility))
        .route("/employees/{id}/requests", get(employee_requests))
        .with_state(ApiState { service })
}

async fn submit_request(
    State(state): State<ApiState>,
    Json(body): Json<SubmitBody>,
) -> ApiResult<(StatusCode, Json<RequestView>)> {
    let request = state
        .service
        .submit(NewRequest { requester_id: EmployeeId(body.requester_id), payload: body.payload })
        .await?;
    Ok((StatusCode::CREATED, Json(request.into())))
}

async fn get_request(
    State(state): State<ApiState>,
    Path(reference): Path<String>,
) -> ApiResult<Json<RequestView>> {
    Ok(Json(state.service.find(&reference).await?.into()))
}

async fn decide_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> ApiResult<Json<RequestView>> {
    let input = DecisionInput {
        actor_id: EmployeeId(body.actor_id),
        decision: body.decision,
        comment: body.comment,
        level: body.level,
    };
    Ok(Json(state.service.decide(&RequestId(id), input).await?.into()))
}

async fn cancel_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<CancelBody>,
) -> ApiResult<Json<RequestView>> {
    let request =
        state.service.cancel(&RequestId(id), &EmployeeId(body.actor_id), body.reason).await?;
    Ok(Json(request.into()))
}

async fn property_availability(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<StayParams>,
) -> ApiResult<Json<AvailabilityReport>> {
    let report =
        state.service.availability(&PropertyId(id), params.check_in, params.check_out).await?;
    Ok(Json(report))
}

async fn employee_eligibility(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<EligibilityParams>,
) -> ApiResult<Json<Eligibility>> {
    let request_type = RequestType::parse(&params.request_type).ok_or_else(|| {
        ApplicationError::from(ChainError::UnknownRequestType { tag: params.request_type.clone() })
    })?;
    Ok(Json(state.service.eligibility(&EmployeeId(id), request_type).await?))
}

async fn employee_requests(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<RequestView>>> {
    let requests = state.service.list_for_requester(&EmployeeId(id)).await?;
    Ok(Json(requests.into_iter().map(RequestView::from).collect()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use benefitflow_core::events::InMemoryEventPublisher;
    use benefitflow_db::InMemoryRequestStore;

    use super::router;
    use crate::service::tests::{directory, service_with, STAFF};

    async fn app() -> Router {
        let service = service_with(
            Arc::new(InMemoryRequestStore::default()),
            directory().await,
            Arc::new(InMemoryEventPublisher::default()),
        );
        router(Arc::new(service))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|value| Body::from(value.to_string())).unwrap_or_else(Body::empty))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn booking_body(check_in: &str, check_out: &str) -> Value {
        json!({
            "requester_id": STAFF,
            "payload": {
                "type": "house_booking",
                "property_id": "HOUSE-BAGUIO",
                "check_in": check_in,
                "check_out": check_out,
                "guests": 2
            }
        })
    }

    #[tokio::test]
    async fn submit_then_fetch_by_token() {
        let app = app().await;

        let (status, created) = send(
            &app,
            Method::POST,
            "/requests",
            Some(booking_body("2030-06-01T14:00:00", "2030-06-03T11:00:00")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "pending");
        assert_eq!(created["active_level"], 1);
        assert_eq!(created["stages"].as_array().map(Vec::len), Some(2));

        let token = created["token"].as_str().expect("token");
        let (status, fetched) = send(&app, Method::GET, &format!("/requests/{token}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["id"], created["id"]);
    }

    #[tokio::test]
    async fn decisions_map_denials_to_client_errors() {
        let app = app().await;
        let (_, created) = send(
            &app,
            Method::POST,
            "/requests",
            Some(booking_body("2030-06-01T14:00:00", "2030-06-03T11:00:00")),
        )
        .await;
        let id = created["id"].as_str().expect("id").to_string();
        let uri = format!("/requests/{id}/decisions");

        let (status, body) = send(
            &app,
            Method::POST,
            &uri,
            Some(json!({ "actor_id": "EMP-SUP-001", "decision": "approve" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["correlation_id"].as_str().is_some());

        let (status, _) = send(
            &app,
            Method::POST,
            &uri,
            Some(json!({ "actor_id": "EMP-HR-001", "decision": "reject", "comment": "no" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, rejected) = send(
            &app,
            Method::POST,
            &uri,
            Some(json!({
                "actor_id": "EMP-HR-001",
                "decision": "reject",
                "comment": "dates overlap with maintenance"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rejected["status"], "rejected");

        let (status, _) = send(
            &app,
            Method::POST,
            &uri,
            Some(json!({ "actor_id": "EMP-SUP-001", "decision": "approve" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn overlapping_booking_returns_conflict_details() {
        let app = app().await;
        send(
            &app,
            Method::POST,
            "/requests",
            Some(booking_body("2030-06-01T14:00:00", "2030-06-03T11:00:00")),
        )
        .await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/requests",
            Some(booking_body("2030-06-02T14:00:00", "2030-06-04T11:00:00")),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["details"].as_array().is_some_and(|details| !details.is_empty()));

        let (status, report) = send(
            &app,
            Method::GET,
            "/properties/HOUSE-BAGUIO/availability?check_in=2030-06-02T14:00:00&check_out=2030-06-04T11:00:00",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["available"], false);
    }

    #[tokio::test]
    async fn eligibility_endpoint_validates_request_type() {
        let app = app().await;

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/employees/{STAFF}/eligibility?request_type=salary_loan"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["eligible"], true);

        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/employees/{STAFF}/eligibility?request_type=pet_loan"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            send(&app, Method::GET, "/employees/EMP-404/eligibility?request_type=car_loan", None)
                .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn overlong_stay_is_unprocessable() {
        let app = app().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/requests",
            Some(booking_body("2030-06-01T14:00:00", "2030-06-09T11:00:00")),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().is_some());
    }
}
