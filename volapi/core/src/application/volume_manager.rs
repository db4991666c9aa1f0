// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume Manager Application Service
//!
//! Orchestrates volume lifecycle operations coordinating:
//! - Domain layer: Volume aggregate, predicate translation
//! - Infrastructure layer: VolumeRepository, platform service clients
//! - Reference tracker: the only writer of a volume's `refs`
//!
//! Create provisions the storage VM first and persists the record only once
//! the VM definitely exists. Delete runs in the opposite order: VM first,
//! record second, so a crash in between leaves a re-deletable record rather
//! than an untracked VM.

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::context::{ServiceContext, VolumeSettings};
use crate::application::provisioning;
use crate::application::references::ReferenceTracker;
use crate::domain::catalog::{ImageCatalog, PackageCatalog};
use crate::domain::compute::ComputeClient;
use crate::domain::error::{FieldError, VolapiError, VolumeLookup};
use crate::domain::filter::Filter;
use crate::domain::network::NetworkValidator;
use crate::domain::predicate::{Predicate, VolumePredicateFields};
use crate::domain::repository::{
    RepositoryError, ReservationRepository, Versioned, VolumeRepository,
};
use crate::domain::store::{check_indexed, Bucket};
use crate::domain::volume::{Volume, VolumeId, VolumeState, VolumeType};

// ============================================================================
// Requests
// ============================================================================

/// A syntactically valid create request. Size is already in MiB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVolumeRequest {
    pub name: String,
    pub owner_uuid: Uuid,
    pub size: Option<u64>,
    pub volume_type: VolumeType,
    pub networks: Vec<Uuid>,
    /// Initial state override; defaults to `creating`.
    pub state: Option<VolumeState>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListVolumesQuery {
    pub owner_uuid: Option<Uuid>,
    pub name: Option<String>,
    pub volume_type: Option<VolumeType>,
    pub state: Option<VolumeState>,
    pub size: Option<u64>,
    pub vm_uuid: Option<Uuid>,
    pub predicate: Option<Predicate>,
    /// Raw native filter, restricted to indexed volume attributes.
    pub filter: Option<Filter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateVolumeRequest {
    pub name: Option<String>,
    pub state: Option<VolumeState>,
}

/// Which volume a delete addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeTarget {
    ByUuid { uuid: VolumeId, owner_uuid: Option<Uuid> },
    ByName { name: String, owner_uuid: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeSize {
    pub size: u64,
    #[serde(rename = "type")]
    pub volume_type: VolumeType,
}

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait VolumeService: Send + Sync {
    /// Provision the storage VM and persist the volume
    async fn create_volume(&self, request: CreateVolumeRequest) -> Result<Volume, VolapiError>;

    /// Get a volume by uuid, optionally scoped to an owner
    async fn get_volume(&self, uuid: VolumeId, owner_uuid: Option<Uuid>) -> Result<Volume, VolapiError>;

    /// List volumes matching every supplied constraint
    async fn list_volumes(&self, query: ListVolumesQuery) -> Result<Vec<Volume>, VolapiError>;

    /// Rename and/or move through the state lifecycle
    async fn update_volume(
        &self,
        uuid: VolumeId,
        owner_uuid: Option<Uuid>,
        request: UpdateVolumeRequest,
    ) -> Result<Volume, VolapiError>;

    /// Delete the storage VM, then the record. Refused while referenced unless `force`.
    async fn delete_volume(&self, target: VolumeTarget, force: bool) -> Result<(), VolapiError>;

    async fn add_reference(
        &self,
        uuid: VolumeId,
        owner_uuid: Option<Uuid>,
        vm_uuid: Uuid,
    ) -> Result<Volume, VolapiError>;

    async fn remove_reference(
        &self,
        uuid: VolumeId,
        owner_uuid: Option<Uuid>,
        vm_uuid: Uuid,
    ) -> Result<Volume, VolapiError>;

    async fn list_references(&self, uuid: VolumeId, owner_uuid: Option<Uuid>) -> Result<Vec<Uuid>, VolapiError>;

    /// Sizes offered by the package catalog, ascending
    async fn list_volume_sizes(&self, volume_type: Option<VolumeType>) -> Result<Vec<VolumeSize>, VolapiError>;
}

// ============================================================================
// Shared lookups
// ============================================================================

/// Finds the one volume named `name` for `owner_uuid`.
///
/// More than one match breaks the per-owner name uniqueness invariant and is
/// reported as an internal error rather than resolved by picking one.
pub(crate) async fn find_volume_by_name(
    volumes: &dyn VolumeRepository,
    name: &str,
    owner_uuid: Uuid,
    state: Option<VolumeState>,
) -> Result<Option<Volume>, VolapiError> {
    let mut clauses = vec![Filter::eq("owner_uuid", owner_uuid.to_string()), Filter::eq("name", name)];
    if let Some(state) = state {
        clauses.push(Filter::eq("state", state.as_str()));
    }

    let mut matches = volumes.find(&Filter::and_all(clauses)).await?;
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        n => {
            error!(
                "Found {} volumes named {} for owner {}; names must be unique per owner",
                n, name, owner_uuid
            );
            Err(VolapiError::internal(format!(
                "found {} volumes named {} for owner {}",
                n, name, owner_uuid
            )))
        }
    }
}

/// Conditional record deletes attempted before a delete gives up on a busy volume.
const DELETE_ATTEMPTS: u32 = 5;

fn not_found(uuid: VolumeId) -> VolapiError {
    VolapiError::VolumeNotFound {
        lookup: VolumeLookup::ByUuid(uuid.0),
    }
}

// ============================================================================
// Standard Implementation
// ============================================================================

pub struct StandardVolumeService {
    volumes: Arc<dyn VolumeRepository>,
    reservations: Arc<dyn ReservationRepository>,
    references: Arc<ReferenceTracker>,
    compute: Arc<dyn ComputeClient>,
    packages: Arc<dyn PackageCatalog>,
    images: Arc<dyn ImageCatalog>,
    networks: Arc<dyn NetworkValidator>,
    settings: VolumeSettings,
}

impl StandardVolumeService {
    pub fn new(context: &ServiceContext) -> Self {
        Self {
            volumes: context.volumes.clone(),
            reservations: context.reservations.clone(),
            references: context.references.clone(),
            compute: context.compute.clone(),
            packages: context.packages.clone(),
            images: context.images.clone(),
            networks: context.networks.clone(),
            settings: context.settings.clone(),
        }
    }

    fn package_prefix(&self, volume_type: VolumeType) -> &str {
        match volume_type {
            VolumeType::Tritonnfs => &self.settings.package_prefix,
        }
    }

    /// Loads a volume with its etag, hiding volumes of other owners when scoped.
    async fn load_versioned(
        &self,
        uuid: VolumeId,
        owner_uuid: Option<Uuid>,
    ) -> Result<Versioned<Volume>, VolapiError> {
        let current = self
            .volumes
            .find_by_id(uuid)
            .await?
            .ok_or_else(|| not_found(uuid))?;

        match owner_uuid {
            Some(owner) if owner != current.value.owner_uuid => {
                debug!("Volume {} exists but is not owned by {}", uuid, owner);
                Err(not_found(uuid))
            }
            _ => Ok(current),
        }
    }

    async fn load(&self, uuid: VolumeId, owner_uuid: Option<Uuid>) -> Result<Volume, VolapiError> {
        Ok(self.load_versioned(uuid, owner_uuid).await?.value)
    }

    async fn resolve_target(&self, target: &VolumeTarget) -> Result<Versioned<Volume>, VolapiError> {
        match target {
            VolumeTarget::ByUuid { uuid, owner_uuid } => {
                self.load_versioned(*uuid, *owner_uuid).await
            }
            VolumeTarget::ByName { name, owner_uuid } => {
                let volume = find_volume_by_name(self.volumes.as_ref(), name, *owner_uuid, None)
                    .await?
                    .ok_or_else(|| VolapiError::VolumeNotFound {
                        lookup: VolumeLookup::ByName {
                            name: name.clone(),
                            owner_uuid: *owner_uuid,
                        },
                    })?;
                self.load_versioned(volume.uuid, Some(*owner_uuid)).await
            }
        }
    }

    fn refuse_in_use(volume: &Volume) -> VolapiError {
        info!(
            "Refusing to delete volume {}: referenced by {} VM(s)",
            volume.uuid,
            volume.refs.len()
        );
        VolapiError::VolumeInUse {
            uuid: volume.uuid.0,
            references: volume.refs.iter().copied().collect(),
        }
    }

    /// Removes the record only at an etag whose refs permit it.
    ///
    /// A reference added after the in-use check bumps the etag, so the
    /// delete conflicts and the fresh record is checked again.
    async fn delete_record(&self, mut current: Versioned<Volume>, force: bool) -> Result<(), VolapiError> {
        let uuid = current.value.uuid;
        let mut attempt = 1;
        loop {
            match self.volumes.delete(uuid, &current.etag).await {
                Ok(()) => return Ok(()),
                Err(RepositoryError::NotFound(_)) => return Err(not_found(uuid)),
                Err(RepositoryError::Conflict(_)) if attempt < DELETE_ATTEMPTS => {
                    debug!(
                        "Volume {} changed during delete (attempt {}/{}); re-reading",
                        uuid, attempt, DELETE_ATTEMPTS
                    );
                    current = self
                        .volumes
                        .find_by_id(uuid)
                        .await?
                        .ok_or_else(|| not_found(uuid))?;
                    if current.value.is_in_use() && !force {
                        return Err(Self::refuse_in_use(&current.value));
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// VM uuids of live reservations naming this volume.
    async fn reserved_by(&self, name: &str, owner_uuid: Uuid) -> Result<Vec<Uuid>, VolapiError> {
        let filter = Filter::and_all([
            Filter::eq("volume_name", name),
            Filter::eq("owner_uuid", owner_uuid.to_string()),
        ]);
        let reservations = self.reservations.find(&filter).await?;
        Ok(reservations.into_iter().map(|r| r.vm_uuid).collect())
    }

    fn build_filter(query: ListVolumesQuery) -> Result<Filter, VolapiError> {
        let mut errors: Vec<FieldError> = Vec::new();
        let mut clauses = Vec::new();

        if let Some(owner) = query.owner_uuid {
            clauses.push(Filter::eq("owner_uuid", owner.to_string()));
        }
        if let Some(name) = query.name {
            clauses.push(Filter::eq("name", name));
        }
        if let Some(volume_type) = query.volume_type {
            clauses.push(Filter::eq("type", volume_type.as_str()));
        }
        if let Some(state) = query.state {
            clauses.push(Filter::eq("state", state.as_str()));
        }
        if let Some(size) = query.size {
            clauses.push(Filter::eq("size", size.to_string()));
        }
        if let Some(vm_uuid) = query.vm_uuid {
            clauses.push(Filter::eq("vm_uuid", vm_uuid.to_string()));
        }
        if let Some(predicate) = query.predicate {
            match predicate.to_filter(&VolumePredicateFields) {
                Ok(filter) => clauses.push(filter),
                Err(predicate_errors) => errors.extend(predicate_errors),
            }
        }
        if let Some(filter) = query.filter {
            match check_indexed(Bucket::Volumes, &filter) {
                Ok(()) => clauses.push(filter),
                Err(e) => errors.push(FieldError::invalid("filter", e.to_string())),
            }
        }

        if !errors.is_empty() {
            return Err(VolapiError::validation(errors));
        }
        Ok(Filter::and_all(clauses))
    }

    /// Best-effort removal of a VM whose volume record could not be written.
    async fn discard_vm(&self, vm_uuid: Uuid, owner_uuid: Uuid) {
        match self.compute.delete_vm(vm_uuid, owner_uuid).await {
            Ok(()) => info!("Deleted storage VM {} of unpersisted volume", vm_uuid),
            Err(e) => error!(
                "Failed to delete storage VM {} of unpersisted volume, VM leaked: {}",
                vm_uuid, e
            ),
        }
    }
}

#[async_trait]
impl VolumeService for StandardVolumeService {
    async fn create_volume(&self, request: CreateVolumeRequest) -> Result<Volume, VolapiError> {
        let size = request.size.unwrap_or(self.settings.default_size_mb);
        info!(
            "Creating volume '{}' for owner {} (type: {}, size: {}MB, networks: {})",
            request.name,
            request.owner_uuid,
            request.volume_type,
            size,
            request.networks.len()
        );

        if request.networks.is_empty() {
            return Err(VolapiError::validation(vec![FieldError::missing("networks")]));
        }

        let invalid = self
            .networks
            .validate_networks(&request.networks, request.owner_uuid)
            .await?;
        if !invalid.is_empty() {
            warn!(
                "Rejecting volume '{}': invalid networks {:?}",
                request.name, invalid
            );
            return Err(VolapiError::InvalidNetworks { networks: invalid });
        }

        if find_volume_by_name(self.volumes.as_ref(), &request.name, request.owner_uuid, None)
            .await?
            .is_some()
        {
            return Err(VolapiError::VolumeAlreadyExists { name: request.name });
        }

        let mut volume = Volume::new(
            VolumeId::new(),
            request.name,
            request.owner_uuid,
            size,
            request.volume_type,
            request.networks,
        )?;
        if let Some(state) = request.state {
            volume.transition_to(state)?;
        }

        // Package and image lookups are independent
        let (packages, images) = tokio::try_join!(
            self.packages.list_packages(self.package_prefix(volume.volume_type)),
            self.images.list_images(&self.settings.nfs_server_image_name),
        )?;
        let package = provisioning::select_package(&packages, size, volume.volume_type)?;
        let image = provisioning::select_image(&images, &self.settings.nfs_server_image_name)?;
        debug!(
            "Volume {} will use package {} ({}MB) and image {}@{}",
            volume.uuid, package.name, package.quota, image.name, image.version
        );

        let vm_request = provisioning::build_vm_request(
            Uuid::new_v4(),
            volume.uuid,
            &volume.name,
            volume.owner_uuid,
            package,
            image,
            &volume.networks,
        );

        let created = match tokio::time::timeout(
            self.settings.vm_create_timeout,
            self.compute.create_vm(&vm_request),
        )
        .await
        {
            Ok(Ok(created)) => created,
            Ok(Err(e)) => {
                counter!("volapi_volume_create_failures_total").increment(1);
                error!("Storage VM creation failed for volume {}: {}", volume.uuid, e);
                return Err(VolapiError::internal(format!(
                    "failed to create storage VM for volume {}: {}",
                    volume.uuid, e
                )));
            }
            Err(_) => {
                counter!("volapi_volume_create_failures_total").increment(1);
                error!(
                    "Storage VM creation for volume {} did not finish within {:?}",
                    volume.uuid, self.settings.vm_create_timeout
                );
                return Err(VolapiError::internal(format!(
                    "timed out creating storage VM for volume {}",
                    volume.uuid
                )));
            }
        };
        volume.vm_uuid = Some(created.vm_uuid);

        // Reservations made before the volume existed become references now
        let reserved = match self.reserved_by(&volume.name, volume.owner_uuid).await {
            Ok(reserved) => reserved,
            Err(e) => {
                self.discard_vm(created.vm_uuid, volume.owner_uuid).await;
                return Err(e);
            }
        };
        volume.refs.extend(reserved);

        if let Err(e) = self.volumes.create(&volume).await {
            counter!("volapi_volume_create_failures_total").increment(1);
            error!("Failed to persist volume {}: {}", volume.uuid, e);
            self.discard_vm(created.vm_uuid, volume.owner_uuid).await;
            return Err(e.into());
        }

        counter!("volapi_volumes_created_total").increment(1);
        info!(
            "Volume {} created with storage VM {} ({} refs)",
            volume.uuid,
            created.vm_uuid,
            volume.refs.len()
        );

        self.load(volume.uuid, None).await
    }

    async fn get_volume(&self, uuid: VolumeId, owner_uuid: Option<Uuid>) -> Result<Volume, VolapiError> {
        self.load(uuid, owner_uuid).await
    }

    async fn list_volumes(&self, query: ListVolumesQuery) -> Result<Vec<Volume>, VolapiError> {
        let filter = Self::build_filter(query)?;
        debug!("Listing volumes with filter {}", filter);
        Ok(self.volumes.find(&filter).await?)
    }

    async fn update_volume(
        &self,
        uuid: VolumeId,
        owner_uuid: Option<Uuid>,
        request: UpdateVolumeRequest,
    ) -> Result<Volume, VolapiError> {
        let current = self
            .volumes
            .find_by_id(uuid)
            .await?
            .ok_or_else(|| not_found(uuid))?;
        let mut volume = current.value;
        if owner_uuid.is_some_and(|owner| owner != volume.owner_uuid) {
            return Err(not_found(uuid));
        }

        if let Some(name) = request.name {
            if name != volume.name {
                if find_volume_by_name(self.volumes.as_ref(), &name, volume.owner_uuid, None)
                    .await?
                    .is_some()
                {
                    return Err(VolapiError::VolumeAlreadyExists { name });
                }
                info!("Renaming volume {} from '{}' to '{}'", uuid, volume.name, name);
                volume.name = name;
            }
        }
        if let Some(state) = request.state {
            volume.transition_to(state)?;
        }

        let updated = self
            .volumes
            .update(&volume, &current.etag)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound(_) => not_found(uuid),
                other => other.into(),
            })?;
        info!("Volume {} updated (state: {})", uuid, updated.value.state);
        Ok(updated.value)
    }

    async fn delete_volume(&self, target: VolumeTarget, force: bool) -> Result<(), VolapiError> {
        let current = self.resolve_target(&target).await?;
        let volume = current.value.clone();

        if volume.is_in_use() {
            if !force {
                return Err(Self::refuse_in_use(&volume));
            }
            warn!(
                "Force-deleting volume {} still referenced by {:?}",
                volume.uuid, volume.refs
            );
        }

        if let Some(vm_uuid) = volume.vm_uuid {
            match self.compute.delete_vm(vm_uuid, volume.owner_uuid).await {
                Ok(()) => debug!("Deleted storage VM {} of volume {}", vm_uuid, volume.uuid),
                Err(e) if e.is_not_found() => warn!(
                    "Storage VM {} of volume {} was already gone",
                    vm_uuid, volume.uuid
                ),
                Err(e) => {
                    error!(
                        "Failed to delete storage VM {} of volume {}: {}",
                        vm_uuid, volume.uuid, e
                    );
                    return Err(e.into());
                }
            }
        }

        self.delete_record(current, force).await?;

        counter!("volapi_volumes_deleted_total").increment(1);
        info!("Volume {} ('{}') deleted", volume.uuid, volume.name);
        Ok(())
    }

    async fn add_reference(
        &self,
        uuid: VolumeId,
        owner_uuid: Option<Uuid>,
        vm_uuid: Uuid,
    ) -> Result<Volume, VolapiError> {
        self.load(uuid, owner_uuid).await?;
        self.references.add_reference(uuid, vm_uuid).await
    }

    async fn remove_reference(
        &self,
        uuid: VolumeId,
        owner_uuid: Option<Uuid>,
        vm_uuid: Uuid,
    ) -> Result<Volume, VolapiError> {
        self.load(uuid, owner_uuid).await?;
        self.references.remove_reference(uuid, vm_uuid).await
    }

    async fn list_references(&self, uuid: VolumeId, owner_uuid: Option<Uuid>) -> Result<Vec<Uuid>, VolapiError> {
        let volume = self.load(uuid, owner_uuid).await?;
        Ok(volume.refs.into_iter().collect())
    }

    async fn list_volume_sizes(&self, volume_type: Option<VolumeType>) -> Result<Vec<VolumeSize>, VolapiError> {
        let types: Vec<VolumeType> = match volume_type {
            Some(volume_type) => vec![volume_type],
            None => VolumeType::ALL.to_vec(),
        };

        let mut sizes = Vec::new();
        for volume_type in types {
            let packages = self.packages.list_packages(self.package_prefix(volume_type)).await?;
            sizes.extend(
                provisioning::available_sizes(&packages)
                    .into_iter()
                    .map(|size| VolumeSize { size, volume_type }),
            );
        }
        sizes.sort_by_key(|s| s.size);
        Ok(sizes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reservation::VolumeReservation;
    use crate::infrastructure::store::InMemoryRecordStore;
    use crate::infrastructure::triton::{
        MockComputeClient, MockImageCatalog, MockNetworkValidator, MockPackageCatalog,
    };
    use std::time::Duration;

    struct Harness {
        context: ServiceContext,
        compute: Arc<MockComputeClient>,
        service: StandardVolumeService,
    }

    fn harness() -> Harness {
        let compute = Arc::new(MockComputeClient::new());
        let settings = VolumeSettings {
            vm_create_timeout: Duration::from_millis(200),
            ..VolumeSettings::default()
        };
        let context = ServiceContext::with_store(
            Arc::new(InMemoryRecordStore::new()),
            compute.clone(),
            Arc::new(MockPackageCatalog::with_sizes_gib("sdc_volume_nfs", &[10, 20, 100])),
            Arc::new(MockImageCatalog::single("sdc-nfsserver")),
            Arc::new(MockNetworkValidator::permissive()),
            settings,
        );
        let service = StandardVolumeService::new(&context);
        Harness {
            context,
            compute,
            service,
        }
    }

    fn request(name: &str, owner: Uuid) -> CreateVolumeRequest {
        CreateVolumeRequest {
            name: name.to_string(),
            owner_uuid: owner,
            size: None,
            volume_type: VolumeType::Tritonnfs,
            networks: vec![Uuid::new_v4()],
            state: None,
        }
    }

    #[tokio::test]
    async fn test_create_volume_defaults() {
        let h = harness();
        let volume = h.service.create_volume(request("data", Uuid::new_v4())).await.unwrap();

        assert_eq!(volume.size, 10240);
        assert_eq!(volume.state, VolumeState::Creating);
        let vm_uuid = volume.vm_uuid.unwrap();
        assert!(h.compute.vm_exists(vm_uuid));

        let sent = h.compute.create_requests.lock()[0].clone();
        assert_eq!(sent.internal_metadata["volume_uuid"], volume.uuid.to_string());
    }

    #[tokio::test]
    async fn test_create_picks_smallest_fitting_package() {
        let h = harness();
        let mut req = request("big", Uuid::new_v4());
        req.size = Some(15 * 1024);
        let volume = h.service.create_volume(req).await.unwrap();
        assert_eq!(volume.size, 15 * 1024);

        let sent = h.compute.create_requests.lock()[0].clone();
        let packages = h.context.packages.list_packages("sdc_volume_nfs").await.unwrap();
        let chosen = packages.iter().find(|p| p.uuid == sent.billing_id).unwrap();
        assert_eq!(chosen.quota, 20 * 1024);
    }

    #[tokio::test]
    async fn test_unavailable_size_creates_nothing() {
        let h = harness();
        let mut req = request("huge", Uuid::new_v4());
        req.size = Some(1024 * 1024);
        match h.service.create_volume(req).await {
            Err(VolapiError::VolumeSizeNotAvailable { available_sizes, .. }) => {
                assert_eq!(available_sizes, vec![10240, 20480, 102400]);
            }
            other => panic!("expected size error, got {:?}", other),
        }
        assert!(h.compute.create_requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_vm_persists_no_record() {
        let h = harness();
        *h.compute.fail_creates.lock() = true;
        let owner = Uuid::new_v4();

        let err = h.service.create_volume(request("data", owner)).await.unwrap_err();
        assert!(matches!(err, VolapiError::Internal { .. }));
        let all = h.service.list_volumes(ListVolumesQuery::default()).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_vm_persists_no_record() {
        let h = harness();
        *h.compute.create_delay.lock() = Some(Duration::from_secs(5));

        let err = h.service.create_volume(request("slow", Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, VolapiError::Internal { .. }));
        assert!(h.service.list_volumes(ListVolumesQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_networks_rejected() {
        let h = harness();
        let owner = Uuid::new_v4();
        let good = Uuid::new_v4();
        let strict = MockNetworkValidator::new();
        strict.add_fabric(good, owner);

        let context = ServiceContext::with_store(
            h.context.store.clone(),
            h.compute.clone(),
            h.context.packages.clone(),
            h.context.images.clone(),
            Arc::new(strict),
            VolumeSettings::default(),
        );
        let service = StandardVolumeService::new(&context);

        let missing = Uuid::new_v4();
        let mut req = request("data", owner);
        req.networks = vec![good, missing];
        match service.create_volume(req).await {
            Err(VolapiError::InvalidNetworks { networks }) => assert_eq!(networks.missing, vec![missing]),
            other => panic!("expected invalid networks, got {:?}", other),
        }
        assert!(h.compute.create_requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_per_owner() {
        let h = harness();
        let owner = Uuid::new_v4();
        h.service.create_volume(request("data", owner)).await.unwrap();

        let err = h.service.create_volume(request("data", owner)).await.unwrap_err();
        assert!(matches!(err, VolapiError::VolumeAlreadyExists { .. }));
        // Same name, other owner is fine
        assert!(h.service.create_volume(request("data", Uuid::new_v4())).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_seeds_refs_from_reservations() {
        let h = harness();
        let owner = Uuid::new_v4();
        let vm = Uuid::new_v4();
        h.context
            .reservations
            .create(&VolumeReservation::new("data".to_string(), owner, vm, Uuid::new_v4()))
            .await
            .unwrap();

        let volume = h.service.create_volume(request("data", owner)).await.unwrap();
        assert!(volume.refs.contains(&vm));
    }

    #[tokio::test]
    async fn test_delete_in_use_is_refused() {
        let h = harness();
        let volume = h.service.create_volume(request("data", Uuid::new_v4())).await.unwrap();
        let vm = Uuid::new_v4();
        h.service.add_reference(volume.uuid, None, vm).await.unwrap();

        let target = VolumeTarget::ByUuid { uuid: volume.uuid, owner_uuid: None };
        let err = h.service.delete_volume(target.clone(), false).await.unwrap_err();
        assert!(matches!(err, VolapiError::VolumeInUse { ref references, .. } if references == &vec![vm]));
        assert!(h.compute.delete_requests.lock().is_empty());
        assert!(h.service.get_volume(volume.uuid, None).await.is_ok());

        h.service.delete_volume(target, true).await.unwrap();
        assert!(h.service.get_volume(volume.uuid, None).await.is_err());
    }

    /// Compute client that attaches a VM to the volume while its storage VM is being deleted.
    struct AttachingCompute {
        inner: Arc<MockComputeClient>,
        attach: parking_lot::Mutex<Option<(Arc<ReferenceTracker>, VolumeId, Uuid)>>,
    }

    #[async_trait]
    impl ComputeClient for AttachingCompute {
        async fn create_vm(
            &self,
            request: &crate::domain::compute::VmCreateRequest,
        ) -> Result<crate::domain::compute::CreatedVm, crate::domain::compute::ClientError> {
            self.inner.create_vm(request).await
        }

        async fn delete_vm(
            &self,
            vm_uuid: Uuid,
            owner_uuid: Uuid,
        ) -> Result<(), crate::domain::compute::ClientError> {
            let attach = self.attach.lock().take();
            if let Some((tracker, volume, vm)) = attach {
                tracker.add_reference(volume, vm).await.unwrap();
            }
            self.inner.delete_vm(vm_uuid, owner_uuid).await
        }
    }

    fn attaching_harness() -> (ServiceContext, Arc<AttachingCompute>, StandardVolumeService) {
        let compute = Arc::new(AttachingCompute {
            inner: Arc::new(MockComputeClient::new()),
            attach: parking_lot::Mutex::new(None),
        });
        let context = ServiceContext::with_store(
            Arc::new(InMemoryRecordStore::new()),
            compute.clone(),
            Arc::new(MockPackageCatalog::with_sizes_gib("sdc_volume_nfs", &[10])),
            Arc::new(MockImageCatalog::single("sdc-nfsserver")),
            Arc::new(MockNetworkValidator::permissive()),
            VolumeSettings::default(),
        );
        let service = StandardVolumeService::new(&context);
        (context, compute, service)
    }

    #[tokio::test]
    async fn test_reference_added_during_delete_keeps_volume() {
        let (context, compute, service) = attaching_harness();
        let owner = Uuid::new_v4();
        let volume = service.create_volume(request("data", owner)).await.unwrap();
        let vm = Uuid::new_v4();
        *compute.attach.lock() = Some((context.references.clone(), volume.uuid, vm));

        let target = VolumeTarget::ByName { name: "data".to_string(), owner_uuid: owner };
        let err = service.delete_volume(target, false).await.unwrap_err();
        assert!(matches!(err, VolapiError::VolumeInUse { ref references, .. } if references == &vec![vm]));

        let kept = service.get_volume(volume.uuid, None).await.unwrap();
        assert!(kept.refs.contains(&vm));
    }

    #[tokio::test]
    async fn test_forced_delete_survives_concurrent_reference() {
        let (context, compute, service) = attaching_harness();
        let volume = service.create_volume(request("data", Uuid::new_v4())).await.unwrap();
        *compute.attach.lock() = Some((context.references.clone(), volume.uuid, Uuid::new_v4()));

        let target = VolumeTarget::ByUuid { uuid: volume.uuid, owner_uuid: None };
        service.delete_volume(target, true).await.unwrap();
        assert!(service.get_volume(volume.uuid, None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_by_name_removes_vm_then_record() {
        let h = harness();
        let owner = Uuid::new_v4();
        let volume = h.service.create_volume(request("data", owner)).await.unwrap();
        let vm_uuid = volume.vm_uuid.unwrap();

        h.service
            .delete_volume(
                VolumeTarget::ByName { name: "data".to_string(), owner_uuid: owner },
                false,
            )
            .await
            .unwrap();
        assert!(!h.compute.vm_exists(vm_uuid));
        assert!(matches!(
            h.service.get_volume(volume.uuid, None).await,
            Err(VolapiError::VolumeNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_keeps_record_when_vm_delete_fails() {
        let h = harness();
        let volume = h.service.create_volume(request("data", Uuid::new_v4())).await.unwrap();
        *h.compute.fail_deletes.lock() = true;

        let target = VolumeTarget::ByUuid { uuid: volume.uuid, owner_uuid: None };
        assert!(h.service.delete_volume(target, false).await.is_err());
        assert!(h.service.get_volume(volume.uuid, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_vm() {
        let h = harness();
        let volume = h.service.create_volume(request("data", Uuid::new_v4())).await.unwrap();
        h.compute.vms.lock().clear();

        let target = VolumeTarget::ByUuid { uuid: volume.uuid, owner_uuid: None };
        h.service.delete_volume(target, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_owner_scoping_hides_volumes() {
        let h = harness();
        let owner = Uuid::new_v4();
        let volume = h.service.create_volume(request("data", owner)).await.unwrap();

        assert!(h.service.get_volume(volume.uuid, Some(owner)).await.is_ok());
        assert!(matches!(
            h.service.get_volume(volume.uuid, Some(Uuid::new_v4())).await,
            Err(VolapiError::VolumeNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_rename_and_state() {
        let h = harness();
        let owner = Uuid::new_v4();
        let volume = h.service.create_volume(request("data", owner)).await.unwrap();
        h.service.create_volume(request("other", owner)).await.unwrap();

        let taken = UpdateVolumeRequest { name: Some("other".to_string()), state: None };
        assert!(matches!(
            h.service.update_volume(volume.uuid, None, taken).await,
            Err(VolapiError::VolumeAlreadyExists { .. })
        ));

        let update = UpdateVolumeRequest {
            name: Some("renamed".to_string()),
            state: Some(VolumeState::Ready),
        };
        let updated = h.service.update_volume(volume.uuid, Some(owner), update).await.unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.state, VolumeState::Ready);

        let backwards = UpdateVolumeRequest { name: None, state: Some(VolumeState::Creating) };
        assert!(matches!(
            h.service.update_volume(volume.uuid, None, backwards).await,
            Err(VolapiError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_trivial_predicate_matches_no_predicate() {
        let h = harness();
        let owner = Uuid::new_v4();
        h.service.create_volume(request("one", owner)).await.unwrap();
        h.service.create_volume(request("two", Uuid::new_v4())).await.unwrap();

        let plain = h.service.list_volumes(ListVolumesQuery::default()).await.unwrap();
        let trivial = h
            .service
            .list_volumes(ListVolumesQuery {
                predicate: Some(Predicate::trivial()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(plain, trivial);
        assert_eq!(plain.len(), 2);
    }

    #[tokio::test]
    async fn test_list_combines_params_and_predicate() {
        let h = harness();
        let owner = Uuid::new_v4();
        let one = h.service.create_volume(request("one", owner)).await.unwrap();
        h.service.create_volume(request("two", owner)).await.unwrap();
        h.service.add_reference(one.uuid, None, Uuid::new_v4()).await.unwrap();

        let query = ListVolumesQuery {
            owner_uuid: Some(owner),
            predicate: Some(Predicate::parse(r#"{"eq": ["dangling", true]}"#).unwrap()),
            ..Default::default()
        };
        let dangling = h.service.list_volumes(query).await.unwrap();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].name, "two");
    }

    #[tokio::test]
    async fn test_list_rejects_bad_predicate_and_filter() {
        let h = harness();
        let bogus = ListVolumesQuery {
            predicate: Some(Predicate::parse(r#"{"eq": ["bogus", "x"]}"#).unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            h.service.list_volumes(bogus).await,
            Err(VolapiError::Validation { .. })
        ));

        let unindexed = ListVolumesQuery {
            filter: Some(Filter::parse("(secret=x)").unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            h.service.list_volumes(unindexed).await,
            Err(VolapiError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_volume_sizes_ascending() {
        let h = harness();
        let sizes = h.service.list_volume_sizes(None).await.unwrap();
        let values: Vec<u64> = sizes.iter().map(|s| s.size).collect();
        assert_eq!(values, vec![10240, 20480, 102400]);
        assert!(sizes.iter().all(|s| s.volume_type == VolumeType::Tritonnfs));
    }
}
