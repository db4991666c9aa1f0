// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Compute Client Trait - Anti-Corruption Layer for the VM orchestration API
//!
//! Every volume is served by a dedicated NFS server VM. The domain only needs
//! two operations from the orchestrator, both synchronous from the caller's
//! point of view: create a VM and wait for the provisioning job to finish,
//! and delete a VM and wait for the destroy job to finish.
//!
//! [`ClientError`] is shared by every platform service client (compute,
//! packages, images, networks).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Brand of the NFS server VMs.
pub const NFS_SERVER_BRAND: &str = "joyent-minimal";

/// Tag marking a VM as the storage VM of a volume.
pub const NFS_VOLUME_TAG: &str = "smartdc_role";
pub const NFS_VOLUME_TAG_VALUE: &str = "nfsserver";

/// Payload of a create-VM call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmCreateRequest {
    pub uuid: Uuid,
    pub owner_uuid: Uuid,
    pub alias: String,
    /// Package uuid sizing the VM
    pub billing_id: Uuid,
    pub image_uuid: Uuid,
    pub brand: String,
    pub networks: Vec<VmNetwork>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub internal_metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmNetwork {
    pub uuid: Uuid,
}

/// Result of a completed create-VM job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedVm {
    pub vm_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_uuid: Option<Uuid>,
}

#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// Creates the VM and waits for its provisioning job to complete.
    async fn create_vm(&self, request: &VmCreateRequest) -> Result<CreatedVm, ClientError>;

    /// Deletes the VM and waits for its destroy job to complete.
    async fn delete_vm(&self, vm_uuid: Uuid, owner_uuid: Uuid) -> Result<(), ClientError>;
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{service}: resource not found: {resource}")]
    NotFound { service: &'static str, resource: String },

    #[error("{service}: HTTP {status}: {message}")]
    Http {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service}: network error: {message}")]
    Network { service: &'static str, message: String },

    #[error("{service}: request timed out")]
    Timeout { service: &'static str },

    #[error("{service}: malformed response: {message}")]
    Decode { service: &'static str, message: String },

    #[error("{service}: job {job_uuid} finished in state {execution}")]
    JobFailed {
        service: &'static str,
        job_uuid: Uuid,
        execution: String,
    },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
