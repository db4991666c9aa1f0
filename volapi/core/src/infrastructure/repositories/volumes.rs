// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Record Volume
//!
//! Volume repository over the record store bucket `volapi_volumes`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements VolumeRepository

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::filter::Filter;
use crate::domain::repository::{RepositoryError, Versioned, VolumeRepository};
use crate::domain::store::{Bucket, RecordStore, StoreError, StoredObject, WriteCondition};
use crate::domain::volume::{Volume, VolumeId};

const BUCKET: Bucket = Bucket::Volumes;

pub struct RecordVolumeRepository {
    store: Arc<dyn RecordStore>,
}

impl RecordVolumeRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

fn decode(object: StoredObject) -> Result<Versioned<Volume>, RepositoryError> {
    let value: Volume = serde_json::from_value(object.value)?;
    Ok(Versioned {
        value,
        etag: object.etag,
    })
}

#[async_trait]
impl VolumeRepository for RecordVolumeRepository {
    async fn create(&self, volume: &Volume) -> Result<Versioned<Volume>, RepositoryError> {
        let value = serde_json::to_value(volume)?;
        let etag = self
            .store
            .put_object(BUCKET, &volume.uuid.to_string(), value, WriteCondition::MustNotExist)
            .await?;
        Ok(Versioned {
            value: volume.clone(),
            etag,
        })
    }

    async fn find_by_id(&self, id: VolumeId) -> Result<Option<Versioned<Volume>>, RepositoryError> {
        match self.store.get_object(BUCKET, &id.to_string()).await {
            Ok(object) => decode(object).map(Some),
            Err(StoreError::ObjectNotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, volume: &Volume, etag: &str) -> Result<Versioned<Volume>, RepositoryError> {
        let value = serde_json::to_value(volume)?;
        let etag = self
            .store
            .put_object(
                BUCKET,
                &volume.uuid.to_string(),
                value,
                WriteCondition::Etag(etag.to_string()),
            )
            .await?;
        Ok(Versioned {
            value: volume.clone(),
            etag,
        })
    }

    async fn delete(&self, id: VolumeId, etag: &str) -> Result<(), RepositoryError> {
        self.store
            .delete_object(BUCKET, &id.to_string(), WriteCondition::Etag(etag.to_string()))
            .await?;
        Ok(())
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Volume>, RepositoryError> {
        let mut volumes = self
            .store
            .find_objects(BUCKET, filter)
            .await?
            .into_iter()
            .map(|object| decode(object).map(|v| v.value))
            .collect::<Result<Vec<_>, _>>()?;
        volumes.sort_by(|a, b| {
            a.create_timestamp
                .cmp(&b.create_timestamp)
                .then_with(|| a.uuid.cmp(&b.uuid))
        });
        Ok(volumes)
    }
}
