// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory record store for development, standalone mode and tests.
//!
//! Same contract as the PostgreSQL store: every write mints a fresh etag,
//! conditional writes are checked under the bucket's write lock, and
//! filters are evaluated in process.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::domain::filter::Filter;
use crate::domain::store::{
    check_indexed, Bucket, RecordStore, StoreError, StoredObject, WriteCondition,
};

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    etag: String,
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    buckets: RwLock<HashMap<Bucket, BTreeMap<String, Entry>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently stored in `bucket`.
    pub fn len(&self, bucket: Bucket) -> usize {
        self.buckets.read().get(&bucket).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, bucket: Bucket) -> bool {
        self.len(bucket) == 0
    }
}

fn check_condition(
    bucket: Bucket,
    key: &str,
    current: Option<&Entry>,
    condition: &WriteCondition,
) -> Result<(), StoreError> {
    match (condition, current) {
        (WriteCondition::Unconditional, _) => Ok(()),
        (WriteCondition::MustNotExist, None) => Ok(()),
        (WriteCondition::MustNotExist, Some(_)) => Err(StoreError::UniqueKeyConflict {
            bucket: bucket.name(),
            key: key.to_string(),
        }),
        (WriteCondition::Etag(expected), Some(entry)) if &entry.etag == expected => Ok(()),
        (WriteCondition::Etag(_), Some(_)) => Err(StoreError::EtagConflict {
            bucket: bucket.name(),
            key: key.to_string(),
        }),
        (WriteCondition::Etag(_), None) => Err(StoreError::ObjectNotFound {
            bucket: bucket.name(),
            key: key.to_string(),
        }),
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn put_object(
        &self,
        bucket: Bucket,
        key: &str,
        value: Value,
        condition: WriteCondition,
    ) -> Result<String, StoreError> {
        let mut buckets = self.buckets.write();
        let objects = buckets.entry(bucket).or_default();
        check_condition(bucket, key, objects.get(key), &condition)?;

        let etag = Uuid::new_v4().to_string();
        objects.insert(
            key.to_string(),
            Entry {
                value,
                etag: etag.clone(),
            },
        );
        Ok(etag)
    }

    async fn get_object(&self, bucket: Bucket, key: &str) -> Result<StoredObject, StoreError> {
        let buckets = self.buckets.read();
        buckets
            .get(&bucket)
            .and_then(|objects| objects.get(key))
            .map(|entry| StoredObject {
                key: key.to_string(),
                value: entry.value.clone(),
                etag: entry.etag.clone(),
            })
            .ok_or_else(|| StoreError::ObjectNotFound {
                bucket: bucket.name(),
                key: key.to_string(),
            })
    }

    async fn delete_object(
        &self,
        bucket: Bucket,
        key: &str,
        condition: WriteCondition,
    ) -> Result<(), StoreError> {
        let mut buckets = self.buckets.write();
        let objects = buckets.entry(bucket).or_default();
        let current = objects.get(key).ok_or_else(|| StoreError::ObjectNotFound {
            bucket: bucket.name(),
            key: key.to_string(),
        })?;
        check_condition(bucket, key, Some(current), &condition)?;
        objects.remove(key);
        Ok(())
    }

    async fn find_objects(&self, bucket: Bucket, filter: &Filter) -> Result<Vec<StoredObject>, StoreError> {
        check_indexed(bucket, filter)?;
        let buckets = self.buckets.read();
        Ok(buckets
            .get(&bucket)
            .map(|objects| {
                objects
                    .iter()
                    .filter(|(_, entry)| filter.matches(&entry.value))
                    .map(|(key, entry)| StoredObject {
                        key: key.clone(),
                        value: entry.value.clone(),
                        etag: entry.etag.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_many(&self, bucket: Bucket, filter: &Filter) -> Result<usize, StoreError> {
        check_indexed(bucket, filter)?;
        let mut buckets = self.buckets.write();
        let objects = buckets.entry(bucket).or_default();
        let before = objects.len();
        objects.retain(|_, entry| !filter.matches(&entry.value));
        Ok(before - objects.len())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(uuid: &str, name: &str) -> Value {
        json!({"uuid": uuid, "name": name, "owner_uuid": "o1", "refs": []})
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryRecordStore::new();
        let etag = store
            .put_object(Bucket::Volumes, "v1", record("v1", "data"), WriteCondition::MustNotExist)
            .await
            .unwrap();

        let object = store.get_object(Bucket::Volumes, "v1").await.unwrap();
        assert_eq!(object.etag, etag);
        assert_eq!(object.value["name"], "data");
        assert_eq!(store.len(Bucket::Volumes), 1);
        assert!(store.is_empty(Bucket::VolumeReservations));
    }

    #[tokio::test]
    async fn test_must_not_exist_enforces_unique_key() {
        let store = InMemoryRecordStore::new();
        store
            .put_object(Bucket::Volumes, "v1", record("v1", "a"), WriteCondition::MustNotExist)
            .await
            .unwrap();
        let err = store
            .put_object(Bucket::Volumes, "v1", record("v1", "b"), WriteCondition::MustNotExist)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueKeyConflict { .. }));
    }

    #[tokio::test]
    async fn test_etag_conflict() {
        let store = InMemoryRecordStore::new();
        let first = store
            .put_object(Bucket::Volumes, "v1", record("v1", "a"), WriteCondition::MustNotExist)
            .await
            .unwrap();
        let second = store
            .put_object(Bucket::Volumes, "v1", record("v1", "b"), WriteCondition::Etag(first.clone()))
            .await
            .unwrap();
        assert_ne!(first, second);

        let stale = store
            .put_object(Bucket::Volumes, "v1", record("v1", "c"), WriteCondition::Etag(first.clone()))
            .await
            .unwrap_err();
        assert!(matches!(stale, StoreError::EtagConflict { .. }));

        let stale_delete = store
            .delete_object(Bucket::Volumes, "v1", WriteCondition::Etag(first))
            .await
            .unwrap_err();
        assert!(matches!(stale_delete, StoreError::EtagConflict { .. }));
        assert!(store
            .delete_object(Bucket::Volumes, "v1", WriteCondition::Etag(second))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_find_and_delete_many() {
        let store = InMemoryRecordStore::new();
        for (key, name) in [("v1", "a"), ("v2", "b"), ("v3", "a")] {
            store
                .put_object(Bucket::Volumes, key, record(key, name), WriteCondition::Unconditional)
                .await
                .unwrap();
        }

        let found = store
            .find_objects(Bucket::Volumes, &Filter::eq("name", "a"))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let all = store.find_objects(Bucket::Volumes, &Filter::match_all()).await.unwrap();
        assert_eq!(all.len(), 3);

        let removed = store
            .delete_many(Bucket::Volumes, &Filter::eq("name", "a"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len(Bucket::Volumes), 1);
    }

    #[tokio::test]
    async fn test_unindexed_filter_is_rejected() {
        let store = InMemoryRecordStore::new();
        let err = store
            .find_objects(Bucket::VolumeReservations, &Filter::eq("state", "ready"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilter(_)));
    }

    #[tokio::test]
    async fn test_missing_object() {
        let store = InMemoryRecordStore::new();
        assert!(matches!(
            store.get_object(Bucket::Volumes, "nope").await,
            Err(StoreError::ObjectNotFound { .. })
        ));
        assert!(matches!(
            store
                .delete_object(Bucket::Volumes, "nope", WriteCondition::Unconditional)
                .await,
            Err(StoreError::ObjectNotFound { .. })
        ));
    }
}
