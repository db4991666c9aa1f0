// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Service Context - Application Layer
//!
//! Builds every collaborator the services need exactly once at startup and
//! hands them out as trait objects. There are no process-wide client
//! handles; the router state owns the services, the services own their
//! collaborators.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Wire concrete infrastructure to the domain traits

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use crate::application::references::ReferenceTracker;
use crate::application::reservation_manager::StandardReservationService;
use crate::application::volume_manager::StandardVolumeService;
use crate::domain::catalog::{ImageCatalog, PackageCatalog};
use crate::domain::compute::ComputeClient;
use crate::domain::config::{ServicesConfig, VolapiConfigManifest, VolumesConfig};
use crate::domain::network::NetworkValidator;
use crate::domain::repository::{ReservationRepository, VolumeRepository};
use crate::domain::store::RecordStore;
use crate::infrastructure::repositories::{RecordReservationRepository, RecordVolumeRepository};
use crate::infrastructure::store::{create_record_store, InMemoryRecordStore};
use crate::infrastructure::triton::{
    ImgapiClient, MockComputeClient, MockImageCatalog, MockNetworkValidator, MockPackageCatalog,
    NapiClient, PapiClient, VmapiClient,
};

/// Package sizes offered in standalone mode, in GiB.
const STANDALONE_PACKAGE_SIZES_GIB: &[u64] = &[10, 20, 50, 100, 200, 500, 1000];

/// Volume provisioning knobs, resolved from `spec.volumes` and `spec.services`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSettings {
    pub default_size_mb: u64,
    pub package_prefix: String,
    pub nfs_server_image_name: String,
    pub reference_retry_attempts: u32,
    pub vm_create_timeout: Duration,
}

impl VolumeSettings {
    pub fn from_config(config: &VolapiConfigManifest) -> Self {
        let volumes = &config.spec.volumes;
        Self {
            default_size_mb: volumes.default_size_mb,
            package_prefix: volumes.package_prefix.clone(),
            nfs_server_image_name: volumes.nfs_server_image_name.clone(),
            reference_retry_attempts: volumes.reference_retry_attempts,
            vm_create_timeout: Duration::from_secs(config.spec.services.vm_create_timeout_secs),
        }
    }
}

impl Default for VolumeSettings {
    fn default() -> Self {
        let volumes = VolumesConfig::default();
        Self {
            default_size_mb: volumes.default_size_mb,
            package_prefix: volumes.package_prefix,
            nfs_server_image_name: volumes.nfs_server_image_name,
            reference_retry_attempts: volumes.reference_retry_attempts,
            vm_create_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn RecordStore>,
    pub volumes: Arc<dyn VolumeRepository>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub references: Arc<ReferenceTracker>,
    pub compute: Arc<dyn ComputeClient>,
    pub packages: Arc<dyn PackageCatalog>,
    pub images: Arc<dyn ImageCatalog>,
    pub networks: Arc<dyn NetworkValidator>,
    pub settings: VolumeSettings,
}

/// VMAPI calls wait on the provision job, so they run under the VM create timeout.
fn compute_client(services: &ServicesConfig) -> anyhow::Result<VmapiClient> {
    VmapiClient::new(
        &services.vmapi_url,
        Duration::from_secs(services.request_timeout_secs),
        Duration::from_secs(services.vm_create_timeout_secs),
    )
    .context("Failed to build VMAPI client")
}

impl ServiceContext {
    /// Connects the configured record store and the four platform services.
    pub async fn from_config(config: &VolapiConfigManifest) -> anyhow::Result<Self> {
        let store = create_record_store(&config.spec.store).await?;

        let services = &config.spec.services;
        let timeout = Duration::from_secs(services.request_timeout_secs);
        let compute = compute_client(services)?;
        let packages = PapiClient::new(&services.papi_url, timeout).context("Failed to build PAPI client")?;
        let images = ImgapiClient::new(&services.imgapi_url, timeout).context("Failed to build IMGAPI client")?;
        let networks = NapiClient::new(&services.napi_url, timeout).context("Failed to build NAPI client")?;

        info!(
            "Platform services: vmapi={} papi={} imgapi={} napi={}",
            services.vmapi_url, services.papi_url, services.imgapi_url, services.napi_url
        );

        Ok(Self::with_store(
            store,
            Arc::new(compute),
            Arc::new(packages),
            Arc::new(images),
            Arc::new(networks),
            VolumeSettings::from_config(config),
        ))
    }

    pub fn with_store(
        store: Arc<dyn RecordStore>,
        compute: Arc<dyn ComputeClient>,
        packages: Arc<dyn PackageCatalog>,
        images: Arc<dyn ImageCatalog>,
        networks: Arc<dyn NetworkValidator>,
        settings: VolumeSettings,
    ) -> Self {
        let volumes: Arc<dyn VolumeRepository> = Arc::new(RecordVolumeRepository::new(store.clone()));
        let reservations: Arc<dyn ReservationRepository> =
            Arc::new(RecordReservationRepository::new(store.clone()));
        let references = Arc::new(ReferenceTracker::new(
            volumes.clone(),
            settings.reference_retry_attempts,
        ));

        Self {
            store,
            volumes,
            reservations,
            references,
            compute,
            packages,
            images,
            networks,
            settings,
        }
    }

    /// In-memory store and in-process platform mocks. Nothing leaves the process.
    pub fn standalone(settings: VolumeSettings) -> Self {
        let packages = MockPackageCatalog::with_sizes_gib(&settings.package_prefix, STANDALONE_PACKAGE_SIZES_GIB);
        let images = MockImageCatalog::single(&settings.nfs_server_image_name);
        Self::with_store(
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(MockComputeClient::new()),
            Arc::new(packages),
            Arc::new(images),
            Arc::new(MockNetworkValidator::permissive()),
            settings,
        )
    }

    pub fn volume_service(&self) -> StandardVolumeService {
        StandardVolumeService::new(self)
    }

    pub fn reservation_service(&self) -> StandardReservationService {
        StandardReservationService::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_follow_config() {
        let mut config = VolapiConfigManifest::default();
        config.spec.volumes.default_size_mb = 20480;
        config.spec.services.vm_create_timeout_secs = 42;

        let settings = VolumeSettings::from_config(&config);
        assert_eq!(settings.default_size_mb, 20480);
        assert_eq!(settings.vm_create_timeout, Duration::from_secs(42));
        assert_eq!(settings.package_prefix, "sdc_volume_nfs");
    }

    #[test]
    fn test_compute_client_waits_for_vm_create_timeout() {
        let mut config = VolapiConfigManifest::default();
        config.spec.services.request_timeout_secs = 30;
        config.spec.services.vm_create_timeout_secs = 900;

        let client = compute_client(&config.spec.services).unwrap();
        assert_eq!(client.job_timeout(), Duration::from_secs(900));
    }

    #[tokio::test]
    async fn test_standalone_offers_packages_and_image() {
        let context = ServiceContext::standalone(VolumeSettings::default());
        let packages = context.packages.list_packages("sdc_volume_nfs").await.unwrap();
        assert_eq!(packages.len(), STANDALONE_PACKAGE_SIZES_GIB.len());
        let images = context.images.list_images("sdc-nfsserver").await.unwrap();
        assert_eq!(images.len(), 1);
        assert!(context.store.ping().await.is_ok());
    }
}
