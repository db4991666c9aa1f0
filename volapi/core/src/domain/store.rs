// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Record Store Trait - Anti-Corruption Layer for the durable object store
//!
//! Volumes and reservations are persisted as JSON objects in named buckets of
//! a key/value store with secondary-index search and optimistic concurrency.
//! Every write returns a fresh version token (etag); conditional writes
//! supply the etag they last observed, or [`WriteCondition::MustNotExist`]
//! for first creation, and the store refuses the write with
//! [`StoreError::EtagConflict`] if the stored version has moved on.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::filter::Filter;

/// Logical collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Volumes,
    VolumeReservations,
}

impl Bucket {
    pub const ALL: &'static [Bucket] = &[Bucket::Volumes, Bucket::VolumeReservations];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Volumes => "volapi_volumes",
            Self::VolumeReservations => "volapi_volume_reservations",
        }
    }

    /// Attributes the store keeps a secondary index on.
    pub fn indexed_attributes(&self) -> &'static [&'static str] {
        match self {
            Self::Volumes => &[
                "uuid",
                "owner_uuid",
                "name",
                "vm_uuid",
                "type",
                "size",
                "state",
                "create_timestamp",
                "networks",
                "refs",
            ],
            Self::VolumeReservations => &[
                "uuid",
                "owner_uuid",
                "vm_uuid",
                "job_uuid",
                "volume_name",
                "create_timestamp",
            ],
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Precondition attached to a mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    Unconditional,
    /// Unique-key enforcement: fail if the key is already taken.
    MustNotExist,
    /// Optimistic concurrency: fail unless the stored etag still matches.
    Etag(String),
}

/// A stored object with its current version token.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub key: String,
    pub value: Value,
    pub etag: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: &'static str, key: String },

    #[error("Etag conflict on {bucket}/{key}")]
    EtagConflict { bucket: &'static str, key: String },

    #[error("Unique key already exists: {bucket}/{key}")]
    UniqueKeyConflict { bucket: &'static str, key: String },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Writes `value` under `key`, returning the new etag.
    async fn put_object(
        &self,
        bucket: Bucket,
        key: &str,
        value: Value,
        condition: WriteCondition,
    ) -> Result<String, StoreError>;

    async fn get_object(&self, bucket: Bucket, key: &str) -> Result<StoredObject, StoreError>;

    async fn delete_object(
        &self,
        bucket: Bucket,
        key: &str,
        condition: WriteCondition,
    ) -> Result<(), StoreError>;

    async fn find_objects(&self, bucket: Bucket, filter: &Filter) -> Result<Vec<StoredObject>, StoreError>;

    /// Deletes every object matching `filter`, returning how many went.
    async fn delete_many(&self, bucket: Bucket, filter: &Filter) -> Result<usize, StoreError>;

    /// Cheap liveness probe for health reporting.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Rejects filters that reference attributes the bucket does not index.
pub fn check_indexed(bucket: Bucket, filter: &Filter) -> Result<(), StoreError> {
    let indexed = bucket.indexed_attributes();
    match filter.attributes().into_iter().find(|a| !indexed.contains(a)) {
        Some(attr) => Err(StoreError::InvalidFilter(format!(
            "{} is not an indexed attribute of {}",
            attr, bucket
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_indexed() {
        let ok = Filter::parse("(&(owner_uuid=x)(state=ready))").unwrap();
        assert!(check_indexed(Bucket::Volumes, &ok).is_ok());

        let bad = Filter::parse("(secret=x)").unwrap();
        assert!(matches!(
            check_indexed(Bucket::Volumes, &bad),
            Err(StoreError::InvalidFilter(_))
        ));

        let state = Filter::parse("(state=ready)").unwrap();
        assert!(check_indexed(Bucket::VolumeReservations, &state).is_err());
    }
}
