use crate::flags::FlagError;
use crate::model::{FlagMap, ModelError, Platform, PublishRequest};
use crate::service::{StatusService, StatusServiceError};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;

/// Request header carrying the customer identity used for flag evaluation.
pub const CUSTOMER_ID_HEADER: &str = "customer_id";

pub fn router(service: StatusService) -> Router {
    Router::new()
        .route("/status/version/{version}/{platform}", get(get_app_status))
        .route("/status", post(publish_app_status))
        .route("/health", get(health))
        .with_state(service)
}

#[derive(Serialize)]
struct AppStatusResponse {
    status: String,
    flags: FlagMap,
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
    code: u16,
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Service(StatusServiceError),
    InsertFailed(StatusServiceError),
}

impl From<ModelError> for ApiError {
    fn from(e: ModelError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<StatusServiceError> for ApiError {
    fn from(e: StatusServiceError) -> Self {
        match e {
            StatusServiceError::Invalid(e) => e.into(),
            e => ApiError::Service(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Service(e) => {
                tracing::error!(error = %e, "Failed to query app status");
                let status = match e {
                    StatusServiceError::Flags(FlagError::Timeout { .. }) => {
                        StatusCode::GATEWAY_TIMEOUT
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            ApiError::InsertFailed(e) => {
                tracing::error!(error = %e, "Failed to publish app status");
                (StatusCode::INTERNAL_SERVER_ERROR, "Insert failed".to_string())
            }
        };

        let body = Json(ErrorResponse {
            message,
            code: status.as_u16(),
        });
        (status, body).into_response()
    }
}

async fn get_app_status(
    State(service): State<StatusService>,
    Path((version, platform)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let platform: Platform = platform.parse()?;
    // Only a missing header means the anonymous identity.
    let identity = headers
        .get(CUSTOMER_ID_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default();

    tracing::info!(%version, %platform, "Received request to retrieve app status");

    let app_status = service.query(&version, platform, &identity).await?;

    let status_code = match app_status.found {
        true => StatusCode::OK,
        false => StatusCode::NOT_FOUND,
    };
    let body = Json(AppStatusResponse {
        status: app_status.status.to_string(),
        flags: app_status.flags,
    });
    Ok((status_code, body).into_response())
}

async fn publish_app_status(
    State(service): State<StatusService>,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload.map_err(|e| {
        tracing::warn!(error = %e, "Rejected publish request");
        ApiError::BadRequest("Failed to parse json request".to_string())
    })?;
    let request = request.validate()?;

    tracing::info!(
        version = %request.version,
        platform = %request.platform,
        "Received request to publish app status"
    );

    service
        .publish(request)
        .await
        .map_err(ApiError::InsertFailed)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health() -> &'static str {
    "Success"
}
