// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! IMGAPI Image Catalog Client
//!
//! - `GET /images?name=..&state=active` - List active images by name

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{check_status, http_client, transport_error, trim_base};
use crate::domain::catalog::{Image, ImageCatalog};
use crate::domain::compute::ClientError;

const SERVICE: &str = "imgapi";

pub struct ImgapiClient {
    client: Client,
    base_url: String,
}

impl ImgapiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            base_url: trim_base(base_url),
        })
    }
}

#[async_trait]
impl ImageCatalog for ImgapiClient {
    async fn list_images(&self, name: &str) -> Result<Vec<Image>, ClientError> {
        let response = self
            .client
            .get(format!("{}/images", self.base_url))
            .query(&[("name", name), ("state", "active")])
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, "images", response).await?;

        response
            .json()
            .await
            .map_err(|e| transport_error(SERVICE, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_lists_images_by_name() {
        let mut server = mockito::Server::new_async().await;
        let uuid = Uuid::new_v4();
        let mock = server
            .mock("GET", "/images")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("name".into(), "sdc-nfsserver".into()),
                Matcher::UrlEncoded("state".into(), "active".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!([{
                    "uuid": uuid,
                    "name": "sdc-nfsserver",
                    "version": "20260101T000000Z",
                    "published_at": "2026-01-01T00:00:00Z",
                    "state": "active"
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let client = ImgapiClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let images = client.list_images("sdc-nfsserver").await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].uuid, uuid);
        assert!(images[0].published_at.is_some());
        mock.assert_async().await;
    }
}
