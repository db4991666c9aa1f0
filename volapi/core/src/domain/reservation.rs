// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Volume reservations.
//!
//! A reservation lets a VM that is still being provisioned claim a volume by
//! *name*, before either the VM or (possibly) the volume exists. It has no
//! state of its own: existence is the state. At most one live reservation
//! may exist per `(volume_name, vm_uuid, owner_uuid)`; creating a new one
//! supersedes the previous ones.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::volume::render_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub Uuid);

impl ReservationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeReservation {
    pub uuid: ReservationId,
    pub volume_name: String,
    pub owner_uuid: Uuid,
    pub vm_uuid: Uuid,
    pub job_uuid: Uuid,
    pub create_timestamp: i64,
}

impl VolumeReservation {
    pub fn new(volume_name: String, owner_uuid: Uuid, vm_uuid: Uuid, job_uuid: Uuid) -> Self {
        Self {
            uuid: ReservationId::new(),
            volume_name,
            owner_uuid,
            vm_uuid,
            job_uuid,
            create_timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Whether this reservation is for the same (volume, VM, owner) claim.
    pub fn claims_same_as(&self, other: &VolumeReservation) -> bool {
        self.volume_name == other.volume_name
            && self.vm_uuid == other.vm_uuid
            && self.owner_uuid == other.owner_uuid
    }

    pub fn to_view(&self) -> ReservationView {
        ReservationView {
            uuid: self.uuid.0,
            volume_name: self.volume_name.clone(),
            owner_uuid: self.owner_uuid,
            vm_uuid: self.vm_uuid,
            job_uuid: self.job_uuid,
            create_timestamp: render_timestamp(self.create_timestamp),
        }
    }
}

/// Client-facing rendering of a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationView {
    pub uuid: Uuid,
    pub volume_name: String,
    pub owner_uuid: Uuid,
    pub vm_uuid: Uuid,
    pub job_uuid: Uuid,
    pub create_timestamp: String,
}
