// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process stand-ins for the platform services.
//!
//! Used by `volapi serve --standalone` and by the test suites. State is held
//! in `pub` fields so tests can seed and inspect it directly.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::catalog::{Image, ImageCatalog, Package, PackageCatalog};
use crate::domain::compute::{ClientError, ComputeClient, CreatedVm, VmCreateRequest};
use crate::domain::error::InvalidNetworks;
use crate::domain::network::NetworkValidator;

// ============================================================================
// Compute
// ============================================================================

#[derive(Default)]
pub struct MockComputeClient {
    /// Live VMs by uuid
    pub vms: Mutex<HashMap<Uuid, VmCreateRequest>>,
    /// Every create request received, including failed ones
    pub create_requests: Mutex<Vec<VmCreateRequest>>,
    /// Every VM uuid a delete was requested for
    pub delete_requests: Mutex<Vec<Uuid>>,
    /// When set, provision jobs finish in state `failed`
    pub fail_creates: Mutex<bool>,
    /// When set, destroy jobs finish in state `failed`
    pub fail_deletes: Mutex<bool>,
    /// Artificial latency before a create completes
    pub create_delay: Mutex<Option<Duration>>,
}

impl MockComputeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vm_exists(&self, vm_uuid: Uuid) -> bool {
        self.vms.lock().contains_key(&vm_uuid)
    }
}

#[async_trait]
impl ComputeClient for MockComputeClient {
    async fn create_vm(&self, request: &VmCreateRequest) -> Result<CreatedVm, ClientError> {
        self.create_requests.lock().push(request.clone());

        let delay = *self.create_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let job_uuid = Uuid::new_v4();
        if *self.fail_creates.lock() {
            return Err(ClientError::JobFailed {
                service: "vmapi",
                job_uuid,
                execution: "failed".to_string(),
            });
        }

        self.vms.lock().insert(request.uuid, request.clone());
        Ok(CreatedVm {
            vm_uuid: request.uuid,
            job_uuid: Some(job_uuid),
        })
    }

    async fn delete_vm(&self, vm_uuid: Uuid, _owner_uuid: Uuid) -> Result<(), ClientError> {
        self.delete_requests.lock().push(vm_uuid);

        if *self.fail_deletes.lock() {
            return Err(ClientError::JobFailed {
                service: "vmapi",
                job_uuid: Uuid::new_v4(),
                execution: "failed".to_string(),
            });
        }

        match self.vms.lock().remove(&vm_uuid) {
            Some(_) => Ok(()),
            None => Err(ClientError::NotFound {
                service: "vmapi",
                resource: format!("vm {}", vm_uuid),
            }),
        }
    }
}

// ============================================================================
// Packages
// ============================================================================

pub struct MockPackageCatalog {
    pub packages: Mutex<Vec<Package>>,
}

impl MockPackageCatalog {
    pub fn new(packages: Vec<Package>) -> Self {
        Self {
            packages: Mutex::new(packages),
        }
    }

    /// One `<prefix>_<n>` package per size in GiB.
    pub fn with_sizes_gib(prefix: &str, sizes: &[u64]) -> Self {
        Self::new(
            sizes
                .iter()
                .map(|gib| Package {
                    uuid: Uuid::new_v4(),
                    name: format!("{}_{}", prefix, gib),
                    quota: gib * 1024,
                    active: true,
                })
                .collect(),
        )
    }
}

#[async_trait]
impl PackageCatalog for MockPackageCatalog {
    async fn list_packages(&self, name_prefix: &str) -> Result<Vec<Package>, ClientError> {
        Ok(self
            .packages
            .lock()
            .iter()
            .filter(|p| p.active && p.name.starts_with(name_prefix))
            .cloned()
            .collect())
    }
}

// ============================================================================
// Images
// ============================================================================

pub struct MockImageCatalog {
    pub images: Mutex<Vec<Image>>,
}

impl MockImageCatalog {
    pub fn new(images: Vec<Image>) -> Self {
        Self {
            images: Mutex::new(images),
        }
    }

    /// A single image named `name`.
    pub fn single(name: &str) -> Self {
        Self::new(vec![Image {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            version: "1.0.0".to_string(),
            published_at: Utc.timestamp_opt(1_767_225_600, 0).single(),
            state: Some("active".to_string()),
        }])
    }
}

#[async_trait]
impl ImageCatalog for MockImageCatalog {
    async fn list_images(&self, name: &str) -> Result<Vec<Image>, ClientError> {
        Ok(self
            .images
            .lock()
            .iter()
            .filter(|i| i.name == name)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Networks
// ============================================================================

#[derive(Debug, Clone)]
pub struct MockNetwork {
    pub owner_uuids: Vec<Uuid>,
    pub fabric: bool,
}

/// Networks not registered in `networks` are missing, unless `permissive`
/// is set, in which case every network passes.
#[derive(Default)]
pub struct MockNetworkValidator {
    pub networks: Mutex<HashMap<Uuid, MockNetwork>>,
    pub permissive: bool,
}

impl MockNetworkValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permissive() -> Self {
        Self {
            networks: Mutex::new(HashMap::new()),
            permissive: true,
        }
    }

    pub fn add_fabric(&self, network: Uuid, owner_uuid: Uuid) {
        self.networks.lock().insert(
            network,
            MockNetwork {
                owner_uuids: vec![owner_uuid],
                fabric: true,
            },
        );
    }
}

#[async_trait]
impl NetworkValidator for MockNetworkValidator {
    async fn validate_networks(
        &self,
        networks: &[Uuid],
        owner_uuid: Uuid,
    ) -> Result<InvalidNetworks, ClientError> {
        let mut invalid = InvalidNetworks::default();
        if self.permissive {
            return Ok(invalid);
        }

        let known = self.networks.lock();
        for network in networks {
            match known.get(network) {
                None => invalid.missing.push(*network),
                Some(n) if !n.owner_uuids.contains(&owner_uuid) => invalid.non_owned.push(*network),
                Some(n) if !n.fabric => invalid.non_fabric.push(*network),
                Some(_) => {}
            }
        }
        Ok(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::compute::VmNetwork;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_compute_tracks_live_vms() {
        let compute = MockComputeClient::new();
        let request = VmCreateRequest {
            uuid: Uuid::new_v4(),
            owner_uuid: Uuid::new_v4(),
            alias: "nfs".to_string(),
            billing_id: Uuid::new_v4(),
            image_uuid: Uuid::new_v4(),
            brand: "joyent-minimal".to_string(),
            networks: vec![VmNetwork { uuid: Uuid::new_v4() }],
            tags: BTreeMap::new(),
            internal_metadata: BTreeMap::new(),
        };

        let created = compute.create_vm(&request).await.unwrap();
        assert!(compute.vm_exists(created.vm_uuid));
        compute.delete_vm(created.vm_uuid, request.owner_uuid).await.unwrap();
        assert!(!compute.vm_exists(created.vm_uuid));
        assert!(compute
            .delete_vm(created.vm_uuid, request.owner_uuid)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_network_checks() {
        let validator = MockNetworkValidator::new();
        let owner = Uuid::new_v4();
        let fabric = Uuid::new_v4();
        let foreign = Uuid::new_v4();
        validator.add_fabric(fabric, owner);
        validator.add_fabric(foreign, Uuid::new_v4());

        let missing = Uuid::new_v4();
        let invalid = validator
            .validate_networks(&[fabric, foreign, missing], owner)
            .await
            .unwrap();
        assert_eq!(invalid.missing, vec![missing]);
        assert_eq!(invalid.non_owned, vec![foreign]);
        assert!(invalid.non_fabric.is_empty());

        let permissive = MockNetworkValidator::permissive();
        assert!(permissive
            .validate_networks(&[missing], owner)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_package_prefix_filter() {
        let catalog = MockPackageCatalog::with_sizes_gib("sdc_volume_nfs", &[10, 20]);
        assert_eq!(catalog.list_packages("sdc_volume_nfs").await.unwrap().len(), 2);
        assert!(catalog.list_packages("other").await.unwrap().is_empty());
    }
}
