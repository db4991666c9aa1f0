// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Package and image catalogs.
//!
//! Packages size the NFS server VM; a volume's size is the `quota` of the
//! package its VM was provisioned with. Images provide the NFS server OS.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::compute::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub uuid: Uuid,
    pub name: String,
    /// Disk quota in MiB
    pub quota: u64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub uuid: Uuid,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[async_trait]
pub trait PackageCatalog: Send + Sync {
    /// Active packages whose name starts with `name_prefix`.
    async fn list_packages(&self, name_prefix: &str) -> Result<Vec<Package>, ClientError>;
}

#[async_trait]
pub trait ImageCatalog: Send + Sync {
    /// Active images named exactly `name`.
    async fn list_images(&self, name: &str) -> Result<Vec<Image>, ClientError>;
}
