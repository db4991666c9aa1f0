// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! PAPI Package Catalog Client
//!
//! - `GET /packages?active=true` - List active packages

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{check_status, http_client, transport_error, trim_base};
use crate::domain::catalog::{Package, PackageCatalog};
use crate::domain::compute::ClientError;

const SERVICE: &str = "papi";

pub struct PapiClient {
    client: Client,
    base_url: String,
}

impl PapiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            base_url: trim_base(base_url),
        })
    }
}

#[async_trait]
impl PackageCatalog for PapiClient {
    async fn list_packages(&self, name_prefix: &str) -> Result<Vec<Package>, ClientError> {
        let response = self
            .client
            .get(format!("{}/packages", self.base_url))
            .query(&[("active", "true")])
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, "packages", response).await?;

        let packages: Vec<Package> = response
            .json()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        Ok(packages
            .into_iter()
            .filter(|p| p.active && p.name.starts_with(name_prefix))
            .collect())
    }
}
