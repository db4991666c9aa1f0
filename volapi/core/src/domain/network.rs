// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Network ownership validation.
//!
//! A volume may only be attached to fabric networks its owner can provision
//! on. The validator reports every failing network, grouped by which check
//! failed, rather than stopping at the first one.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::compute::ClientError;
use crate::domain::error::InvalidNetworks;

#[async_trait]
pub trait NetworkValidator: Send + Sync {
    /// Returns the failing networks; an empty result means all passed.
    async fn validate_networks(
        &self,
        networks: &[Uuid],
        owner_uuid: Uuid,
    ) -> Result<InvalidNetworks, ClientError>;
}
