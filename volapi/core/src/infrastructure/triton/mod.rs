// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Platform Service Clients
//!
//! HTTP adapters for the Triton services volapi drives:
//!
//! | Client | Service | Domain trait |
//! |--------|---------|--------------|
//! | [`VmapiClient`] | VMAPI | `ComputeClient` |
//! | [`PapiClient`] | PAPI | `PackageCatalog` |
//! | [`ImgapiClient`] | IMGAPI | `ImageCatalog` |
//! | [`NapiClient`] | NAPI | `NetworkValidator` |
//!
//! In-process mocks of all four live in [`mock`]; they back the standalone
//! development mode and the test suites.

pub mod imgapi;
pub mod mock;
pub mod napi;
pub mod papi;
pub mod vmapi;

pub use imgapi::ImgapiClient;
pub use mock::{MockComputeClient, MockImageCatalog, MockNetworkValidator, MockPackageCatalog};
pub use napi::NapiClient;
pub use papi::PapiClient;
pub use vmapi::VmapiClient;

use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

use crate::domain::compute::ClientError;

pub(crate) fn http_client(service: &'static str, timeout: Duration) -> Result<Client, ClientError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::Network {
            service,
            message: format!("Failed to create HTTP client: {}", e),
        })
}

pub(crate) fn transport_error(service: &'static str, err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout { service }
    } else if err.is_decode() {
        ClientError::Decode {
            service,
            message: err.to_string(),
        }
    } else {
        ClientError::Network {
            service,
            message: err.to_string(),
        }
    }
}

/// Passes 2xx responses through; maps everything else to a `ClientError`.
pub(crate) async fn check_status(
    service: &'static str,
    resource: &str,
    response: Response,
) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound {
            service,
            resource: resource.to_string(),
        });
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| format!("HTTP {}", status));
    Err(ClientError::Http {
        service,
        status: status.as_u16(),
        message,
    })
}

pub(crate) fn trim_base(url: impl Into<String>) -> String {
    url.into().trim_end_matches('/').to_string()
}
