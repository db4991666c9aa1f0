// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Error-to-HTTP mapping.
//!
//! | Class | Status |
//! |-------|--------|
//! | validation, conflict, size, network, state transition | 409 |
//! | volume / reservation / image / package not found | 404 |
//! | internal | 500 |
//!
//! Bodies are `{"code", "message"}` plus the variant's payload. Internal
//! error details are logged and never sent to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::domain::error::VolapiError;

#[derive(Debug)]
pub struct ApiError(pub VolapiError);

impl From<VolapiError> for ApiError {
    fn from(err: VolapiError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &VolapiError) -> StatusCode {
    match err {
        VolapiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        _ => StatusCode::CONFLICT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = status_for(&err);

        let message = match &err {
            VolapiError::Internal { message } => {
                error!("Internal error: {}", message);
                "Internal error".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "code": err.code(),
            "message": message,
        });
        match &err {
            VolapiError::Validation { errors } => body["errors"] = json!(errors),
            VolapiError::VolumeSizeNotAvailable { available_sizes, .. } => {
                body["volumeSizes"] = json!(available_sizes)
            }
            VolapiError::InvalidNetworks { networks } => body["invalidNetworks"] = json!(networks),
            VolapiError::VolumeInUse { references, .. } => body["references"] = json!(references),
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}
