// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository abstractions defined in
//! the domain layer, following the Repository pattern from DDD.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! Both repositories are backend-agnostic: they serialize aggregates to JSON
//! and delegate to whichever [`RecordStore`](crate::domain::store::RecordStore)
//! the service was started with (in-memory or PostgreSQL).
//!
//! # Design Principles
//!
//! 1. **Technology Agnostic**: Domain layer has no knowledge of persistence
//! 2. **Error Mapping**: Store errors mapped to domain RepositoryError
//! 3. **Stable Ordering**: Find results are ordered by creation time, then uuid

pub mod reservations;
pub mod volumes;

pub use reservations::RecordReservationRepository;
pub use volumes::RecordVolumeRepository;
