// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root: one repository per
//! aggregate, interface defined here, implemented over a
//! [`RecordStore`](crate::domain::store::RecordStore) in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Bucket |
//! |-------|-----------|--------|
//! | `VolumeRepository` | `Volume` | `volapi_volumes` |
//! | `ReservationRepository` | `VolumeReservation` | `volapi_volume_reservations` |
//!
//! Reads that feed a read-modify-write cycle return [`Versioned`] so the
//! caller can hand the etag back on update.

use async_trait::async_trait;

use crate::domain::filter::Filter;
use crate::domain::reservation::{ReservationId, VolumeReservation};
use crate::domain::store::StoreError;
use crate::domain::volume::{Volume, VolumeId};

/// A value paired with the store version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub etag: String,
}

/// Repository interface for Volume aggregates
#[async_trait]
pub trait VolumeRepository: Send + Sync {
    /// Insert a new volume; fails with `AlreadyExists` if the uuid is taken.
    async fn create(&self, volume: &Volume) -> Result<Versioned<Volume>, RepositoryError>;

    /// Find volume by uuid
    async fn find_by_id(&self, id: VolumeId) -> Result<Option<Versioned<Volume>>, RepositoryError>;

    /// Conditional update; fails with `Conflict` if `etag` is stale.
    async fn update(&self, volume: &Volume, etag: &str) -> Result<Versioned<Volume>, RepositoryError>;

    /// Conditional delete; fails with `Conflict` if `etag` is stale.
    async fn delete(&self, id: VolumeId, etag: &str) -> Result<(), RepositoryError>;

    /// Find volumes matching a native filter
    async fn find(&self, filter: &Filter) -> Result<Vec<Volume>, RepositoryError>;
}

/// Repository interface for VolumeReservation aggregates
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Insert a new reservation; fails with `AlreadyExists` if the uuid is taken.
    async fn create(&self, reservation: &VolumeReservation) -> Result<(), RepositoryError>;

    /// Find reservation by uuid
    async fn find_by_id(&self, id: ReservationId) -> Result<Option<VolumeReservation>, RepositoryError>;

    /// Delete reservation by uuid
    async fn delete(&self, id: ReservationId) -> Result<(), RepositoryError>;

    /// Find reservations matching a native filter
    async fn find(&self, filter: &Filter) -> Result<Vec<VolumeReservation>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for RepositoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ObjectNotFound { bucket, key } => {
                RepositoryError::NotFound(format!("{}/{}", bucket, key))
            }
            StoreError::EtagConflict { bucket, key } => {
                RepositoryError::Conflict(format!("{}/{}", bucket, key))
            }
            StoreError::UniqueKeyConflict { bucket, key } => {
                RepositoryError::AlreadyExists(format!("{}/{}", bucket, key))
            }
            StoreError::InvalidFilter(msg) => RepositoryError::InvalidQuery(msg),
            StoreError::Serialization(msg) => RepositoryError::Serialization(msg),
            StoreError::Unavailable(msg) => RepositoryError::Database(msg),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
