//! HTTP/JSON surface over [`FaceService`].
//!
//! Domain outcomes, including failures, are reported as 200 responses with a
//! `{ success, message, data? }` body. While the face model is not ready every
//! `/api` route answers 503 with the same body. Service calls run on the blocking pool
//! since they decode images and run inference.

use crate::service::{FaceService, ServiceError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Request bodies carry base64 images, often several per batch.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub type SharedService = Arc<FaceService>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub image_data: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareRequest {
    pub image_data: String,
    pub user_id: String,
    #[serde(default)]
    pub threshold: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCompareRequest {
    pub image_data_list: Vec<String>,
    pub user_id: String,
    #[serde(default)]
    pub threshold: Option<f32>,
}

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/face-init", post(register))
        .route("/api/face-compare", post(compare))
        .route("/api/face-compare-batch", post(compare_batch))
        .route("/api/users", get(list_users))
        .route("/api/users/:user_id", get(get_user).delete(delete_user))
        .with_state(service)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

async fn root(State(service): State<SharedService>) -> impl IntoResponse {
    let ready = service.is_ready();
    Json(serde_json::json!({
        "service": "faceprint",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "modelStatus": if ready { "loaded" } else { "not loaded" },
    }))
}

async fn health(State(service): State<SharedService>) -> impl IntoResponse {
    let health = service.health();
    let status = if health.model_loaded {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

async fn register(State(service): State<SharedService>, body: Result<Json<RegisterRequest>, JsonRejection>) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection),
    };
    let user_id = req.user_id.filter(|id| !id.trim().is_empty()).unwrap_or_else(default_user_id);

    run(service, "Face registered successfully", move |svc| svc.register(&user_id, &req.image_data)).await
}

async fn compare(State(service): State<SharedService>, body: Result<Json<CompareRequest>, JsonRejection>) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection),
    };

    run(service, "Face comparison completed", move |svc| {
        svc.compare(&req.user_id, &req.image_data, req.threshold)
    })
    .await
}

async fn compare_batch(
    State(service): State<SharedService>,
    body: Result<Json<BatchCompareRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection),
    };

    run(service, "Batch comparison completed", move |svc| {
        Ok(svc.compare_batch(&req.user_id, &req.image_data_list, req.threshold))
    })
    .await
}

async fn list_users(State(service): State<SharedService>) -> Response {
    run(service, "Users retrieved", |svc| Ok(svc.list_users())).await
}

async fn get_user(State(service): State<SharedService>, Path(user_id): Path<String>) -> Response {
    run(service, "User retrieved", move |svc| svc.get_user(&user_id)).await
}

async fn delete_user(State(service): State<SharedService>, Path(user_id): Path<String>) -> Response {
    let message = format!("User '{user_id}' deleted");
    run(service, message, move |svc| svc.delete_user(&user_id)).await
}

/// Run `op` on the blocking pool and wrap its outcome in an [`ApiResponse`].
///
/// Nothing runs while the face model is not ready.
async fn run<T, F>(service: SharedService, message: impl Into<String>, op: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&FaceService) -> Result<T, ServiceError> + Send + 'static,
{
    if !service.is_ready() {
        return failure(ServiceError::ModelUnavailable);
    }

    match tokio::task::spawn_blocking(move || op(&service)).await {
        Ok(Ok(data)) => Json(ApiResponse::ok(message, data)).into_response(),
        Ok(Err(e)) => failure(e),
        Err(e) => {
            tracing::error!(error = %e, "service task aborted");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::failure("internal error")),
            )
                .into_response()
        }
    }
}

fn failure(e: ServiceError) -> Response {
    let status = match e {
        ServiceError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    tracing::warn!(error = %e, %status, "request failed");
    (status, Json(ApiResponse::<()>::failure(e.to_string()))).into_response()
}

fn bad_request(rejection: JsonRejection) -> Response {
    tracing::warn!(error = %rejection.body_text(), "rejected request body");
    (rejection.status(), Json(ApiResponse::<()>::failure(rejection.body_text()))).into_response()
}

fn default_user_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("user_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}
