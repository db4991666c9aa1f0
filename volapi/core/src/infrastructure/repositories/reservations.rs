// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Reservation repository over the record store bucket
//! `volapi_volume_reservations`.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::filter::Filter;
use crate::domain::repository::{RepositoryError, ReservationRepository};
use crate::domain::reservation::{ReservationId, VolumeReservation};
use crate::domain::store::{Bucket, RecordStore, StoreError, WriteCondition};

const BUCKET: Bucket = Bucket::VolumeReservations;

pub struct RecordReservationRepository {
    store: Arc<dyn RecordStore>,
}

impl RecordReservationRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReservationRepository for RecordReservationRepository {
    async fn create(&self, reservation: &VolumeReservation) -> Result<(), RepositoryError> {
        let value = serde_json::to_value(reservation)?;
        self.store
            .put_object(
                BUCKET,
                &reservation.uuid.to_string(),
                value,
                WriteCondition::MustNotExist,
            )
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: ReservationId) -> Result<Option<VolumeReservation>, RepositoryError> {
        match self.store.get_object(BUCKET, &id.to_string()).await {
            Ok(object) => Ok(Some(serde_json::from_value(object.value)?)),
            Err(StoreError::ObjectNotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: ReservationId) -> Result<(), RepositoryError> {
        self.store
            .delete_object(BUCKET, &id.to_string(), WriteCondition::Unconditional)
            .await?;
        Ok(())
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<VolumeReservation>, RepositoryError> {
        let mut reservations = self
            .store
            .find_objects(BUCKET, filter)
            .await?
            .into_iter()
            .map(|object| serde_json::from_value::<VolumeReservation>(object.value))
            .collect::<Result<Vec<_>, _>>()?;
        reservations.sort_by(|a, b| {
            a.create_timestamp
                .cmp(&b.create_timestamp)
                .then_with(|| a.uuid.cmp(&b.uuid))
        });
        Ok(reservations)
    }
}
