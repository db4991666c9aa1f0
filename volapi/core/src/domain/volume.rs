// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::error::VolapiError;

// ============================================================================
// Value Objects
// ============================================================================

/// Unique identifier for a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeId(pub Uuid);

impl VolumeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for VolumeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported volume types. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeType {
    Tritonnfs,
}

impl VolumeType {
    pub const ALL: &'static [VolumeType] = &[VolumeType::Tritonnfs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tritonnfs => "tritonnfs",
        }
    }
}

impl Default for VolumeType {
    fn default() -> Self {
        Self::Tritonnfs
    }
}

impl std::fmt::Display for VolumeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VolumeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tritonnfs" => Ok(Self::Tritonnfs),
            other => Err(format!(
                "unsupported volume type {:?}, expected one of: tritonnfs",
                other
            )),
        }
    }
}

/// Volume state lifecycle
///
/// ```text
/// creating -> ready
/// creating -> failed
/// ready | failed -> rolling_back -> ready | failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeState {
    Creating,
    Ready,
    Failed,
    RollingBack,
}

impl VolumeState {
    pub const ALL: &'static [VolumeState] = &[
        VolumeState::Creating,
        VolumeState::Ready,
        VolumeState::Failed,
        VolumeState::RollingBack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::RollingBack => "rolling_back",
        }
    }

    pub fn can_transition_to(&self, to: VolumeState) -> bool {
        use VolumeState::*;
        matches!(
            (self, to),
            (Creating, Ready)
                | (Creating, Failed)
                | (Ready, RollingBack)
                | (Failed, RollingBack)
                | (RollingBack, Ready)
                | (RollingBack, Failed)
        )
    }
}

impl std::fmt::Display for VolumeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VolumeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VolumeState::ALL
            .iter()
            .find(|state| state.as_str() == s)
            .copied()
            .ok_or_else(|| {
                format!(
                    "invalid volume state {:?}, expected one of: creating, ready, failed, rolling_back",
                    s
                )
            })
    }
}

// ============================================================================
// Aggregate Root: Volume
// ============================================================================

/// Volume aggregate root, in its stored layout.
///
/// `create_timestamp` is kept as epoch milliseconds; [`VolumeView`] renders
/// it as ISO-8601. `refs` is the set of VMs currently depending on the
/// volume and is only ever mutated through the reference tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub uuid: VolumeId,
    pub name: String,
    pub owner_uuid: Uuid,
    /// Size in MiB
    pub size: u64,
    #[serde(rename = "type")]
    pub volume_type: VolumeType,
    pub state: VolumeState,
    pub create_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_uuid: Option<Uuid>,
    #[serde(default)]
    pub networks: Vec<Uuid>,
    #[serde(default)]
    pub refs: BTreeSet<Uuid>,
}

impl Volume {
    pub fn new(
        uuid: VolumeId,
        name: String,
        owner_uuid: Uuid,
        size: u64,
        volume_type: VolumeType,
        networks: Vec<Uuid>,
    ) -> Result<Self, VolapiError> {
        if size == 0 {
            return Err(VolapiError::invalid_field("size", "size must be greater than zero"));
        }
        if name.trim().is_empty() {
            return Err(VolapiError::invalid_field("name", "name cannot be empty"));
        }

        Ok(Self {
            uuid,
            name,
            owner_uuid,
            size,
            volume_type,
            state: VolumeState::Creating,
            create_timestamp: Utc::now().timestamp_millis(),
            vm_uuid: None,
            networks,
            refs: BTreeSet::new(),
        })
    }

    // ========================================================================
    // Aggregate Commands
    // ========================================================================

    /// Move to `to`. Re-applying the current state is a no-op.
    pub fn transition_to(&mut self, to: VolumeState) -> Result<(), VolapiError> {
        if self.state == to {
            return Ok(());
        }
        if !self.state.can_transition_to(to) {
            return Err(VolapiError::InvalidStateTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Returns false if the VM was already referencing this volume.
    pub fn add_reference(&mut self, vm_uuid: Uuid) -> bool {
        self.refs.insert(vm_uuid)
    }

    /// Returns false if the VM was not referencing this volume.
    pub fn remove_reference(&mut self, vm_uuid: Uuid) -> bool {
        self.refs.remove(&vm_uuid)
    }

    // ========================================================================
    // Aggregate Queries
    // ========================================================================

    pub fn is_in_use(&self) -> bool {
        !self.refs.is_empty()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.create_timestamp).single()
    }

    pub fn to_view(&self) -> VolumeView {
        VolumeView::from(self)
    }
}

/// Client-facing rendering of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeView {
    pub uuid: Uuid,
    pub name: String,
    pub owner_uuid: Uuid,
    pub size: u64,
    #[serde(rename = "type")]
    pub volume_type: VolumeType,
    pub state: VolumeState,
    pub create_timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_uuid: Option<Uuid>,
    pub networks: Vec<Uuid>,
    pub refs: Vec<Uuid>,
}

impl From<&Volume> for VolumeView {
    fn from(volume: &Volume) -> Self {
        Self {
            uuid: volume.uuid.0,
            name: volume.name.clone(),
            owner_uuid: volume.owner_uuid,
            size: volume.size,
            volume_type: volume.volume_type,
            state: volume.state,
            create_timestamp: render_timestamp(volume.create_timestamp),
            vm_uuid: volume.vm_uuid,
            networks: volume.networks.clone(),
            refs: volume.refs.iter().copied().collect(),
        }
    }
}

/// Renders epoch milliseconds as an ISO-8601 UTC string.
pub fn render_timestamp(epoch_ms: i64) -> String {
    Utc.timestamp_millis_opt(epoch_ms)
        .single()
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Tests
// ============================================================================
