// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod context;
pub mod provisioning;
pub mod references;
pub mod reservation_manager;
pub mod volume_manager;

// Re-export services for convenience
pub use context::{ServiceContext, VolumeSettings};
pub use references::ReferenceTracker;
pub use reservation_manager::{
    CreateReservationRequest, ListReservationsQuery, ReservationService, StandardReservationService,
};
pub use volume_manager::{
    CreateVolumeRequest, ListVolumesQuery, StandardVolumeService, UpdateVolumeRequest, VolumeService,
    VolumeSize, VolumeTarget,
};
