// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! NAPI Network Validator
//!
//! - `GET /networks/:uuid?provisionable_by=<owner>` - Fetch one network
//!
//! A network passes if it exists, lists the owner in `owner_uuids`, and is
//! a fabric network. All networks are checked concurrently.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use super::{check_status, http_client, transport_error, trim_base};
use crate::domain::compute::ClientError;
use crate::domain::error::InvalidNetworks;
use crate::domain::network::NetworkValidator;

const SERVICE: &str = "napi";

pub struct NapiClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct NetworkRecord {
    #[serde(default)]
    owner_uuids: Option<Vec<Uuid>>,
    #[serde(default)]
    fabric: Option<bool>,
}

enum Verdict {
    Ok,
    Missing,
    NonOwned,
    NonFabric,
}

impl NapiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            base_url: trim_base(base_url),
        })
    }

    async fn check_network(&self, network: Uuid, owner_uuid: Uuid) -> Result<Verdict, ClientError> {
        let response = self
            .client
            .get(format!("{}/networks/{}", self.base_url, network))
            .query(&[("provisionable_by", owner_uuid.to_string())])
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = match check_status(SERVICE, &format!("network {}", network), response).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(Verdict::Missing),
            Err(e) => return Err(e),
        };

        let record: NetworkRecord = response
            .json()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let owned = record
            .owner_uuids
            .as_ref()
            .is_some_and(|owners| owners.contains(&owner_uuid));
        if !owned {
            return Ok(Verdict::NonOwned);
        }
        if record.fabric != Some(true) {
            return Ok(Verdict::NonFabric);
        }
        Ok(Verdict::Ok)
    }
}

#[async_trait]
impl NetworkValidator for NapiClient {
    async fn validate_networks(
        &self,
        networks: &[Uuid],
        owner_uuid: Uuid,
    ) -> Result<InvalidNetworks, ClientError> {
        let verdicts = join_all(
            networks
                .iter()
                .map(|network| self.check_network(*network, owner_uuid)),
        )
        .await;

        let mut invalid = InvalidNetworks::default();
        for (network, verdict) in networks.iter().zip(verdicts) {
            match verdict? {
                Verdict::Ok => {}
                Verdict::Missing => invalid.missing.push(*network),
                Verdict::NonOwned => invalid.non_owned.push(*network),
                Verdict::NonFabric => invalid.non_fabric.push(*network),
            }
        }
        Ok(invalid)
    }
}
