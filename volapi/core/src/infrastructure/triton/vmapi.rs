// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! VMAPI Compute Client
//!
//! # API Endpoints
//!
//! - `POST /vms?sync=true` - Create a VM and wait for the provision job
//! - `DELETE /vms/:uuid?owner_uuid=..&sync=true` - Destroy a VM and wait
//!
//! With `sync=true` VMAPI holds the response until the workflow job ends
//! and reports the job's final `execution` state. Those calls run under the
//! job timeout rather than the client's per-request timeout.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use super::{check_status, http_client, transport_error, trim_base};
use crate::domain::compute::{ClientError, ComputeClient, CreatedVm, VmCreateRequest};

const SERVICE: &str = "vmapi";

pub struct VmapiClient {
    client: Client,
    base_url: String,
    job_timeout: Duration,
}

/// Body of a synchronous VM job response.
#[derive(Debug, Deserialize)]
struct JobResponse {
    #[serde(default)]
    vm_uuid: Option<Uuid>,
    job_uuid: Uuid,
    #[serde(default)]
    execution: Option<String>,
}

impl JobResponse {
    fn ensure_succeeded(&self) -> Result<(), ClientError> {
        match self.execution.as_deref() {
            Some("succeeded") => Ok(()),
            None => Err(ClientError::Decode {
                service: SERVICE,
                message: format!("job {} response carries no execution state", self.job_uuid),
            }),
            Some(other) => Err(ClientError::JobFailed {
                service: SERVICE,
                job_uuid: self.job_uuid,
                execution: other.to_string(),
            }),
        }
    }
}

impl VmapiClient {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        job_timeout: Duration,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(SERVICE, request_timeout)?,
            base_url: trim_base(base_url),
            job_timeout,
        })
    }

    /// Upper bound on one synchronous create or destroy job.
    pub fn job_timeout(&self) -> Duration {
        self.job_timeout
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ComputeClient for VmapiClient {
    async fn create_vm(&self, request: &VmCreateRequest) -> Result<CreatedVm, ClientError> {
        let response = self
            .client
            .post(self.build_url("/vms"))
            .query(&[("sync", "true")])
            .timeout(self.job_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, &format!("vm {}", request.uuid), response).await?;

        let job: JobResponse = response
            .json()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        job.ensure_succeeded()?;

        Ok(CreatedVm {
            vm_uuid: job.vm_uuid.unwrap_or(request.uuid),
            job_uuid: Some(job.job_uuid),
        })
    }

    async fn delete_vm(&self, vm_uuid: Uuid, owner_uuid: Uuid) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.build_url(&format!("/vms/{}", vm_uuid)))
            .query(&[("owner_uuid", owner_uuid.to_string().as_str()), ("sync", "true")])
            .timeout(self.job_timeout)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, &format!("vm {}", vm_uuid), response).await?;

        let job: JobResponse = response
            .json()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        job.ensure_succeeded()
    }
}
