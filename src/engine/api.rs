//! FOTA API Module
//! HTTP surface for update checks, device records and firmware files

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use super::auth::Credentials;
use super::error::FotaError;
use super::protocol::{reported_version, UpdateDecision, UpdateEngine};
use super::records;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<UpdateEngine>,
    pub credentials: Arc<Credentials>,
}

impl ApiState {
    pub fn new(engine: UpdateEngine, credentials: Credentials) -> Self {
        Self {
            engine: Arc::new(engine),
            credentials: Arc::new(credentials),
        }
    }
}

impl IntoResponse for FotaError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
            return status.into_response();
        }
        warn!(error = %self, "request rejected");
        (status, self.to_string()).into_response()
    }
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/devices", get(list_devices))
        .route(
            "/devices/{device_id}",
            get(check_update).put(put_device).delete(delete_device),
        )
        .route("/files/{firmware_ref}", get(download_file).put(upload_file))
        .fallback(unmatched)
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_auth(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, FotaError> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    state.credentials.verify(authorization)?;
    Ok(next.run(request).await)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn unmatched() -> FotaError {
    FotaError::malformed("unsupported path")
}

async fn check_update(
    State(state): State<ApiState>,
    Path(device_id): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, FotaError> {
    let version = reported_version(&params)?;

    match state.engine.check_for_update(&device_id, version).await? {
        UpdateDecision::NoUpdateAvailable => Ok(StatusCode::NO_CONTENT.into_response()),
        UpdateDecision::UpdateAvailable { firmware_ref } => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv")],
            firmware_ref,
        )
            .into_response()),
    }
}

async fn list_devices(State(state): State<ApiState>) -> Result<Response, FotaError> {
    let devices = state.engine.list_devices()?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"devices.csv\""),
        ],
        records::format_records(&devices),
    )
        .into_response())
}

async fn put_device(
    State(state): State<ApiState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, FotaError> {
    let declared = declared_length(&headers)?;
    state
        .engine
        .import_record(&device_id, body.into_data_stream(), declared)
        .await?;
    Ok(StatusCode::OK)
}

async fn delete_device(
    State(state): State<ApiState>,
    Path(device_id): Path<String>,
) -> Result<StatusCode, FotaError> {
    state.engine.deregister_device(&device_id)?;
    Ok(StatusCode::OK)
}

async fn download_file(
    State(state): State<ApiState>,
    Path(firmware_ref): Path<String>,
) -> Result<Response, FotaError> {
    let image = state.engine.download_firmware(&firmware_ref).await?;
    let disposition = format!("attachment; filename=\"{}\"", firmware_ref);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        image,
    )
        .into_response())
}

async fn upload_file(
    State(state): State<ApiState>,
    Path(firmware_ref): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, FotaError> {
    let declared = declared_length(&headers)?;
    state
        .engine
        .upload_firmware(&firmware_ref, body.into_data_stream(), declared)
        .await?;
    Ok(StatusCode::OK)
}

fn declared_length(headers: &HeaderMap) -> Result<u64, FotaError> {
    let value = headers
        .get(header::CONTENT_LENGTH)
        .ok_or_else(|| FotaError::malformed("missing Content-Length"))?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| FotaError::malformed("unparseable Content-Length"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_declared_length() {
        let mut headers = HeaderMap::new();
        assert!(declared_length(&headers).is_err());

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("abc"));
        assert!(declared_length(&headers).is_err());

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert_eq!(declared_length(&headers).unwrap(), 42);
    }
}
