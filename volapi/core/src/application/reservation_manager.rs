// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reservation Manager Application Service
//!
//! A reservation is created by a VM provisioning workflow that wants a volume
//! before the VM exists. Creating one supersedes every earlier reservation
//! for the same `(volume_name, vm_uuid, owner_uuid)` and, when the volume is
//! already `ready`, turns the claim into a reference right away.
//!
//! The create sequence is ordered so that a crash at any step leaves at
//! worst a stale reservation or an extra reference, both of which the
//! external reconciler cleans up:
//!
//! 1. find the previous reservations for the triple
//! 2. persist the new reservation
//! 3. delete the previous ones (best effort)
//! 4. find the ready volume by name
//! 5. add the reference, rolling back the reservation on failure
//! 6. reload the reservation

use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::context::ServiceContext;
use crate::application::references::ReferenceTracker;
use crate::application::volume_manager::find_volume_by_name;
use crate::domain::error::VolapiError;
use crate::domain::filter::Filter;
use crate::domain::predicate::{Predicate, ReservationPredicateFields};
use crate::domain::repository::{RepositoryError, ReservationRepository, VolumeRepository};
use crate::domain::reservation::{ReservationId, VolumeReservation};
use crate::domain::volume::{VolumeId, VolumeState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateReservationRequest {
    pub volume_name: String,
    pub owner_uuid: Uuid,
    pub vm_uuid: Uuid,
    pub job_uuid: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListReservationsQuery {
    pub owner_uuid: Option<Uuid>,
    pub volume_name: Option<String>,
    pub vm_uuid: Option<Uuid>,
    pub job_uuid: Option<Uuid>,
    pub predicate: Option<Predicate>,
}

#[async_trait]
pub trait ReservationService: Send + Sync {
    /// Create a reservation, superseding earlier ones for the same claim
    async fn create_reservation(
        &self,
        request: CreateReservationRequest,
    ) -> Result<VolumeReservation, VolapiError>;

    /// Delete a reservation owned by `owner_uuid`
    async fn remove_reservation(&self, uuid: ReservationId, owner_uuid: Uuid) -> Result<(), VolapiError>;

    /// List reservations matching every supplied field
    async fn list_reservations(
        &self,
        query: ListReservationsQuery,
    ) -> Result<Vec<VolumeReservation>, VolapiError>;
}

pub struct StandardReservationService {
    reservations: Arc<dyn ReservationRepository>,
    volumes: Arc<dyn VolumeRepository>,
    references: Arc<ReferenceTracker>,
}

impl StandardReservationService {
    pub fn new(context: &ServiceContext) -> Self {
        Self {
            reservations: context.reservations.clone(),
            volumes: context.volumes.clone(),
            references: context.references.clone(),
        }
    }

    /// Undo a reservation whose reference could not be established.
    /// Failures are logged; the caller returns the original error.
    async fn roll_back(&self, reservation: &VolumeReservation, volume_uuid: VolumeId) {
        if let Err(e) = self.reservations.delete(reservation.uuid).await {
            error!(
                "Rollback: failed to delete reservation {} for volume '{}': {}",
                reservation.uuid, reservation.volume_name, e
            );
        }
        if let Err(e) = self
            .references
            .remove_reference(volume_uuid, reservation.vm_uuid)
            .await
        {
            error!(
                "Rollback: failed to remove reference of vm {} on volume {}: {}",
                reservation.vm_uuid, volume_uuid, e
            );
        }
    }
}

#[async_trait]
impl ReservationService for StandardReservationService {
    async fn create_reservation(
        &self,
        request: CreateReservationRequest,
    ) -> Result<VolumeReservation, VolapiError> {
        info!(
            "Reserving volume '{}' for vm {} (owner {}, job {})",
            request.volume_name, request.vm_uuid, request.owner_uuid, request.job_uuid
        );

        let claim = Filter::and_all([
            Filter::eq("volume_name", request.volume_name.as_str()),
            Filter::eq("vm_uuid", request.vm_uuid.to_string()),
            Filter::eq("owner_uuid", request.owner_uuid.to_string()),
        ]);
        let previous = self.reservations.find(&claim).await?;

        let reservation = VolumeReservation::new(
            request.volume_name,
            request.owner_uuid,
            request.vm_uuid,
            request.job_uuid,
        );
        self.reservations.create(&reservation).await?;

        for stale in previous.iter().filter(|r| r.uuid != reservation.uuid) {
            match self.reservations.delete(stale.uuid).await {
                Ok(()) => {
                    counter!("volapi_reservations_superseded_total").increment(1);
                    debug!("Reservation {} superseded by {}", stale.uuid, reservation.uuid);
                }
                Err(e) => warn!(
                    "Failed to delete superseded reservation {}: {}",
                    stale.uuid, e
                ),
            }
        }

        let volume = find_volume_by_name(
            self.volumes.as_ref(),
            &reservation.volume_name,
            reservation.owner_uuid,
            Some(VolumeState::Ready),
        )
        .await?;

        match volume {
            Some(volume) => {
                if let Err(e) = self
                    .references
                    .add_reference(volume.uuid, reservation.vm_uuid)
                    .await
                {
                    warn!(
                        "Failed to reference volume {} for reservation {}: {}",
                        volume.uuid, reservation.uuid, e
                    );
                    self.roll_back(&reservation, volume.uuid).await;
                    return Err(e);
                }
            }
            None => debug!(
                "No ready volume '{}' yet; reference deferred to volume creation",
                reservation.volume_name
            ),
        }

        let stored = self
            .reservations
            .find_by_id(reservation.uuid)
            .await?
            .ok_or(VolapiError::ReservationNotFound {
                uuid: reservation.uuid.0,
            })?;

        counter!("volapi_reservations_created_total").increment(1);
        info!(
            "Reservation {} created ({} superseded)",
            stored.uuid,
            previous.len()
        );
        Ok(stored)
    }

    async fn remove_reservation(&self, uuid: ReservationId, owner_uuid: Uuid) -> Result<(), VolapiError> {
        let not_found = VolapiError::ReservationNotFound { uuid: uuid.0 };
        let reservation = self
            .reservations
            .find_by_id(uuid)
            .await?
            .ok_or(not_found)?;

        if reservation.owner_uuid != owner_uuid {
            warn!(
                "Owner {} attempted to remove reservation {} owned by {}",
                owner_uuid, uuid, reservation.owner_uuid
            );
            return Err(VolapiError::ReservationOwnerMismatch { uuid: uuid.0 });
        }

        self.reservations.delete(uuid).await.map_err(|e| match e {
            RepositoryError::NotFound(_) => VolapiError::ReservationNotFound { uuid: uuid.0 },
            other => other.into(),
        })?;
        info!("Reservation {} removed", uuid);
        Ok(())
    }

    async fn list_reservations(
        &self,
        query: ListReservationsQuery,
    ) -> Result<Vec<VolumeReservation>, VolapiError> {
        let mut clauses = Vec::new();
        if let Some(owner) = query.owner_uuid {
            clauses.push(Filter::eq("owner_uuid", owner.to_string()));
        }
        if let Some(name) = query.volume_name {
            clauses.push(Filter::eq("volume_name", name));
        }
        if let Some(vm) = query.vm_uuid {
            clauses.push(Filter::eq("vm_uuid", vm.to_string()));
        }
        if let Some(job) = query.job_uuid {
            clauses.push(Filter::eq("job_uuid", job.to_string()));
        }
        if let Some(predicate) = query.predicate {
            clauses.push(
                predicate
                    .to_filter(&ReservationPredicateFields)
                    .map_err(VolapiError::validation)?,
            );
        }

        let filter = Filter::and_all(clauses);
        debug!("Listing reservations with filter {}", filter);
        Ok(self.reservations.find(&filter).await?)
    }
}
