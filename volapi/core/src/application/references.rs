// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reference Tracker
//!
//! Sole writer of a volume's `refs` set. Both the volume service and the
//! reservation service go through it; nothing else mutates `refs`.
//!
//! Each mutation is a read-modify-write guarded by the record's etag. On an
//! etag conflict the whole cycle is retried, up to `max_attempts` times;
//! any other error aborts immediately.

use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::error::{VolapiError, VolumeLookup};
use crate::domain::repository::{RepositoryError, VolumeRepository};
use crate::domain::volume::{Volume, VolumeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Add,
    Remove,
}

pub struct ReferenceTracker {
    volumes: Arc<dyn VolumeRepository>,
    max_attempts: u32,
}

impl ReferenceTracker {
    pub fn new(volumes: Arc<dyn VolumeRepository>, max_attempts: u32) -> Self {
        Self {
            volumes,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Adds `vm_uuid` to the volume's references. Idempotent.
    pub async fn add_reference(&self, volume_id: VolumeId, vm_uuid: Uuid) -> Result<Volume, VolapiError> {
        self.apply(volume_id, vm_uuid, Change::Add).await
    }

    /// Removes `vm_uuid` from the volume's references. Idempotent.
    pub async fn remove_reference(&self, volume_id: VolumeId, vm_uuid: Uuid) -> Result<Volume, VolapiError> {
        self.apply(volume_id, vm_uuid, Change::Remove).await
    }

    async fn apply(&self, volume_id: VolumeId, vm_uuid: Uuid, change: Change) -> Result<Volume, VolapiError> {
        let not_found = || VolapiError::VolumeNotFound {
            lookup: VolumeLookup::ByUuid(volume_id.0),
        };

        for attempt in 1..=self.max_attempts {
            let current = self
                .volumes
                .find_by_id(volume_id)
                .await?
                .ok_or_else(not_found)?;

            let mut volume = current.value;
            let changed = match change {
                Change::Add => volume.add_reference(vm_uuid),
                Change::Remove => volume.remove_reference(vm_uuid),
            };
            if !changed {
                debug!(
                    "Reference {:?} of vm {} on volume {} is already in effect",
                    change, vm_uuid, volume_id
                );
                return Ok(volume);
            }

            match self.volumes.update(&volume, &current.etag).await {
                Ok(updated) => {
                    info!(
                        "Reference {:?} of vm {} on volume {} applied ({} refs)",
                        change,
                        vm_uuid,
                        volume_id,
                        updated.value.refs.len()
                    );
                    return Ok(updated.value);
                }
                Err(RepositoryError::Conflict(_)) => {
                    counter!("volapi_reference_conflict_retries_total").increment(1);
                    warn!(
                        "Concurrent update of volume {} while applying reference {:?} of vm {} (attempt {}/{})",
                        volume_id, change, vm_uuid, attempt, self.max_attempts
                    );
                }
                Err(RepositoryError::NotFound(_)) => return Err(not_found()),
                Err(e) => return Err(e.into()),
            }
        }

        Err(VolapiError::Conflict {
            message: format!(
                "volume {} kept changing while updating its references; gave up after {} attempts",
                volume_id, self.max_attempts
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filter::Filter;
    use crate::domain::repository::Versioned;
    use crate::domain::volume::VolumeType;
    use crate::infrastructure::repositories::RecordVolumeRepository;
    use crate::infrastructure::store::InMemoryRecordStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn volume() -> Volume {
        Volume::new(
            VolumeId::new(),
            "data".to_string(),
            Uuid::new_v4(),
            10240,
            VolumeType::Tritonnfs,
            vec![],
        )
        .unwrap()
    }

    /// Delegates to a real repository but fails the first `conflicts` updates.
    struct FlakyRepository {
        inner: RecordVolumeRepository,
        conflicts: Mutex<u32>,
    }

    #[async_trait]
    impl VolumeRepository for FlakyRepository {
        async fn create(&self, volume: &Volume) -> Result<Versioned<Volume>, RepositoryError> {
            self.inner.create(volume).await
        }

        async fn find_by_id(&self, id: VolumeId) -> Result<Option<Versioned<Volume>>, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn update(&self, volume: &Volume, etag: &str) -> Result<Versioned<Volume>, RepositoryError> {
            {
                let mut remaining = self.conflicts.lock();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(RepositoryError::Conflict("injected".to_string()));
                }
            }
            self.inner.update(volume, etag).await
        }

        async fn delete(&self, id: VolumeId, etag: &str) -> Result<(), RepositoryError> {
            self.inner.delete(id, etag).await
        }

        async fn find(&self, filter: &Filter) -> Result<Vec<Volume>, RepositoryError> {
            self.inner.find(filter).await
        }
    }

    fn flaky(conflicts: u32) -> Arc<FlakyRepository> {
        Arc::new(FlakyRepository {
            inner: RecordVolumeRepository::new(Arc::new(InMemoryRecordStore::new())),
            conflicts: Mutex::new(conflicts),
        })
    }

    #[tokio::test]
    async fn test_add_and_remove_are_idempotent() {
        let repo = flaky(0);
        let volume = volume();
        repo.create(&volume).await.unwrap();
        let tracker = ReferenceTracker::new(repo.clone(), 5);
        let vm = Uuid::new_v4();

        let updated = tracker.add_reference(volume.uuid, vm).await.unwrap();
        assert!(updated.refs.contains(&vm));
        let again = tracker.add_reference(volume.uuid, vm).await.unwrap();
        assert_eq!(again.refs.len(), 1);

        let removed = tracker.remove_reference(volume.uuid, vm).await.unwrap();
        assert!(removed.refs.is_empty());
        assert!(tracker.remove_reference(volume.uuid, vm).await.is_ok());
    }

    #[tokio::test]
    async fn test_retries_on_conflict() {
        let repo = flaky(2);
        let volume = volume();
        repo.create(&volume).await.unwrap();
        let tracker = ReferenceTracker::new(repo.clone(), 3);

        let vm = Uuid::new_v4();
        let updated = tracker.add_reference(volume.uuid, vm).await.unwrap();
        assert!(updated.refs.contains(&vm));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let repo = flaky(10);
        let volume = volume();
        repo.create(&volume).await.unwrap();
        let tracker = ReferenceTracker::new(repo.clone(), 3);

        let err = tracker.add_reference(volume.uuid, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, VolapiError::Conflict { .. }));
        assert_eq!(*repo.conflicts.lock(), 7);
    }

    #[tokio::test]
    async fn test_missing_volume() {
        let tracker = ReferenceTracker::new(flaky(0), 3);
        let err = tracker
            .add_reference(VolumeId::new(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, VolapiError::VolumeNotFound { .. }));
    }
}
