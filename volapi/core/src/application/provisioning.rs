// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning selection for NFS server VMs.
//!
//! Pure functions: which package sizes the VM, which image it boots, and the
//! create-VM payload built from both.

use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::catalog::{Image, Package};
use crate::domain::compute::{
    VmCreateRequest, VmNetwork, NFS_SERVER_BRAND, NFS_VOLUME_TAG, NFS_VOLUME_TAG_VALUE,
};
use crate::domain::error::VolapiError;
use crate::domain::volume::{VolumeId, VolumeType};

/// Smallest package whose quota is at least `requested` MiB.
pub fn select_package(
    packages: &[Package],
    requested: u64,
    volume_type: VolumeType,
) -> Result<&Package, VolapiError> {
    if packages.is_empty() {
        return Err(VolapiError::PackageNotFound {
            volume_type: volume_type.to_string(),
        });
    }

    packages
        .iter()
        .filter(|p| p.quota >= requested)
        .min_by(|a, b| a.quota.cmp(&b.quota).then_with(|| a.name.cmp(&b.name)))
        .ok_or_else(|| VolapiError::VolumeSizeNotAvailable {
            requested,
            available_sizes: available_sizes(packages),
        })
}

/// Distinct package quotas, ascending.
pub fn available_sizes(packages: &[Package]) -> Vec<u64> {
    let mut sizes: Vec<u64> = packages.iter().map(|p| p.quota).collect();
    sizes.sort_unstable();
    sizes.dedup();
    sizes
}

/// Most recently published image; ties broken by version.
pub fn select_image<'a>(images: &'a [Image], name: &str) -> Result<&'a Image, VolapiError> {
    images
        .iter()
        .max_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.version.cmp(&b.version))
        })
        .ok_or_else(|| VolapiError::ImageNotFound {
            name: name.to_string(),
        })
}

pub fn build_vm_request(
    vm_uuid: Uuid,
    volume_uuid: VolumeId,
    volume_name: &str,
    owner_uuid: Uuid,
    package: &Package,
    image: &Image,
    networks: &[Uuid],
) -> VmCreateRequest {
    let tags = BTreeMap::from([(NFS_VOLUME_TAG.to_string(), NFS_VOLUME_TAG_VALUE.to_string())]);
    let internal_metadata = BTreeMap::from([
        ("volume_uuid".to_string(), volume_uuid.to_string()),
        ("volume_name".to_string(), volume_name.to_string()),
    ]);

    VmCreateRequest {
        uuid: vm_uuid,
        owner_uuid,
        alias: format!("nfs-volume-{}", volume_uuid),
        billing_id: package.uuid,
        image_uuid: image.uuid,
        brand: NFS_SERVER_BRAND.to_string(),
        networks: networks.iter().map(|uuid| VmNetwork { uuid: *uuid }).collect(),
        tags,
        internal_metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn package(name: &str, quota: u64) -> Package {
        Package {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            quota,
            active: true,
        }
    }

    fn image(version: &str, published: i64) -> Image {
        Image {
            uuid: Uuid::new_v4(),
            name: "sdc-nfsserver".to_string(),
            version: version.to_string(),
            published_at: Utc.timestamp_opt(published, 0).single(),
            state: Some("active".to_string()),
        }
    }

    #[test]
    fn test_best_fit_package() {
        let packages = vec![
            package("nfs_100", 102400),
            package("nfs_10", 10240),
            package("nfs_20", 20480),
        ];
        let selected = select_package(&packages, 15000, VolumeType::Tritonnfs).unwrap();
        assert_eq!(selected.quota, 20480);
        let exact = select_package(&packages, 10240, VolumeType::Tritonnfs).unwrap();
        assert_eq!(exact.quota, 10240);
    }

    #[test]
    fn test_too_large_lists_available_sizes() {
        let packages = vec![package("nfs_20", 20480), package("nfs_10", 10240), package("nfs_10b", 10240)];
        match select_package(&packages, 50000, VolumeType::Tritonnfs) {
            Err(VolapiError::VolumeSizeNotAvailable { requested, available_sizes }) => {
                assert_eq!(requested, 50000);
                assert_eq!(available_sizes, vec![10240, 20480]);
            }
            other => panic!("expected size error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_catalog_is_package_not_found() {
        assert!(matches!(
            select_package(&[], 10240, VolumeType::Tritonnfs),
            Err(VolapiError::PackageNotFound { .. })
        ));
    }

    #[test]
    fn test_newest_image_wins() {
        let images = vec![image("1.0.0", 100), image("1.2.0", 300), image("1.1.0", 200)];
        assert_eq!(select_image(&images, "sdc-nfsserver").unwrap().version, "1.2.0");
        assert!(matches!(
            select_image(&[], "sdc-nfsserver"),
            Err(VolapiError::ImageNotFound { .. })
        ));
    }

    #[test]
    fn test_vm_request() {
        let network = Uuid::new_v4();
        let volume = VolumeId::new();
        let request = build_vm_request(
            Uuid::new_v4(),
            volume,
            "data",
            Uuid::new_v4(),
            &package("nfs_10", 10240),
            &image("1.0.0", 1),
            &[network],
        );
        assert_eq!(request.networks, vec![VmNetwork { uuid: network }]);
        assert_eq!(request.tags.get("smartdc_role").map(String::as_str), Some("nfsserver"));
        assert_eq!(request.internal_metadata["volume_uuid"], volume.to_string());
    }
}
