// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::application::{ReservationService, ServiceContext, VolumeService};
use crate::domain::error::VolapiError;
use crate::domain::store::RecordStore;
use crate::presentation::error::ApiError;
use crate::presentation::params::{self, QueryParams};

/// Value of the `api-version` header on every response.
pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

type ApiResult<T> = Result<T, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub volumes: Arc<dyn VolumeService>,
    pub reservations: Arc<dyn ReservationService>,
    pub store: Arc<dyn RecordStore>,
}

impl AppState {
    pub fn from_context(context: &ServiceContext) -> Self {
        Self {
            volumes: Arc::new(context.volume_service()),
            reservations: Arc::new(context.reservation_service()),
            store: context.store.clone(),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/volumes", post(create_volume).get(list_volumes))
        .route(
            "/volumes/{id}",
            get(get_volume).post(update_volume).delete(delete_volume),
        )
        .route("/volumes/{id}/references", get(list_references))
        .route("/volumes/{id}/addreference", post(add_reference))
        .route("/volumes/{id}/removereference", post(remove_reference))
        .route("/volumesizes", get(list_volume_sizes))
        .route(
            "/volumereservations",
            post(create_reservation).get(list_reservations),
        )
        .route(
            "/volumereservations/{id}",
            delete(remove_reservation),
        )
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("api-version"),
            HeaderValue::from_static(API_VERSION),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

// ============================================================================
// Extractors
// ============================================================================

/// Query string extractor whose failures render as a validation error.
pub struct ApiQuery<T = QueryParams>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => {
                warn!("Rejecting malformed query string: {}", rejection.body_text());
                Err(ApiError(VolapiError::invalid_field(
                    "query",
                    rejection.body_text(),
                )))
            }
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn ping(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<impl IntoResponse> {
    params::ping(&query)?;

    let (status, healthy) = match state.store.ping().await {
        Ok(()) => ("OK".to_string(), true),
        Err(e) => {
            warn!("Health check: record store did not answer: {}", e);
            (format!("Record store unavailable: {}", e), false)
        }
    };
    Ok(Json(json!({
        "pid": std::process::id(),
        "status": status,
        "healthy": healthy,
    })))
}

async fn create_volume(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body = params::body_object(&body)?;
    let request = params::create_volume(&query, &body)?;
    let volume = state.volumes.create_volume(request).await?;
    Ok((StatusCode::CREATED, Json(volume.to_view())))
}

async fn list_volumes(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<impl IntoResponse> {
    let list = params::list_volumes(&query)?;
    let volumes = state.volumes.list_volumes(list).await?;
    Ok(Json(volumes.iter().map(|v| v.to_view()).collect::<Vec<_>>()))
}

async fn get_volume(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<impl IntoResponse> {
    let uuid = params::volume_uuid(&id)?;
    let owner = params::owner_scope(&query)?;
    let volume = state.volumes.get_volume(uuid, owner).await?;
    Ok(Json(volume.to_view()))
}

async fn update_volume(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let uuid = params::volume_uuid(&id)?;
    let body = params::body_object(&body)?;
    let (owner, update) = params::update_volume(&query, &body)?;
    let volume = state.volumes.update_volume(uuid, owner, update).await?;
    Ok(Json(volume.to_view()))
}

async fn delete_volume(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<impl IntoResponse> {
    let (target, force) = params::delete_volume(&id, &query)?;
    state.volumes.delete_volume(target, force).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_references(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<impl IntoResponse> {
    let uuid = params::volume_uuid(&id)?;
    let owner = params::owner_scope(&query)?;
    let references = state.volumes.list_references(uuid, owner).await?;
    Ok(Json(references))
}

async fn add_reference(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let uuid = params::volume_uuid(&id)?;
    let body = params::body_object(&body)?;
    let (owner, vm) = params::reference(&query, &body)?;
    let volume = state.volumes.add_reference(uuid, Some(owner), vm).await?;
    Ok(Json(volume.to_view()))
}

async fn remove_reference(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let uuid = params::volume_uuid(&id)?;
    let body = params::body_object(&body)?;
    let (owner, vm) = params::reference(&query, &body)?;
    let volume = state.volumes.remove_reference(uuid, Some(owner), vm).await?;
    Ok(Json(volume.to_view()))
}

async fn list_volume_sizes(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<impl IntoResponse> {
    let volume_type = params::volume_sizes(&query)?;
    let sizes = state.volumes.list_volume_sizes(volume_type).await?;
    Ok(Json(sizes))
}

async fn create_reservation(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body = params::body_object(&body)?;
    let request = params::create_reservation(&query, &body)?;
    let reservation = state.reservations.create_reservation(request).await?;
    Ok((StatusCode::CREATED, Json(reservation.to_view())))
}

async fn remove_reservation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<impl IntoResponse> {
    let (uuid, owner) = params::remove_reservation(&id, &query)?;
    state.reservations.remove_reservation(uuid, owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_reservations(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<impl IntoResponse> {
    let list = params::list_reservations(&query)?;
    let reservations = state.reservations.list_reservations(list).await?;
    Ok(Json(
        reservations.iter().map(|r| r.to_view()).collect::<Vec<_>>(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde::Deserialize;
    use serde_json::Value;

    #[derive(Debug, Deserialize)]
    struct Limit {
        #[allow(dead_code)]
        limit: u32,
    }

    async fn extract<T: DeserializeOwned>(uri: &str) -> Result<T, ApiError> {
        let (mut parts, _) = Request::get(uri).body(()).unwrap().into_parts();
        ApiQuery::<T>::from_request_parts(&mut parts, &()).await.map(|ApiQuery(v)| v)
    }

    #[tokio::test]
    async fn test_query_is_collected() {
        let query: QueryParams = extract("/volumes?name=data&state=ready").await.unwrap();
        assert_eq!(query["name"], "data");
        assert_eq!(query["state"], "ready");
    }

    #[tokio::test]
    async fn test_malformed_query_is_a_validation_error() {
        let err = extract::<Limit>("/volumes?limit=lots").await.unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "ValidationError");
        assert_eq!(body["errors"][0]["field"], "query");
    }
}
