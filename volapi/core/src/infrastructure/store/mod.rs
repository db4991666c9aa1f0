// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Record Store Infrastructure Module
//!
//! Provides concrete implementations of the RecordStore trait.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;

use std::sync::Arc;
use anyhow::Context;
use crate::domain::config::{StoreBackend, StoreConfig};
use crate::domain::store::RecordStore;

/// Factory function to create the record store from configuration
pub async fn create_record_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory record store; volumes will not survive a restart");
            Ok(Arc::new(InMemoryRecordStore::new()))
        }
        StoreBackend::Postgres => {
            let connection_string = config
                .connection_string
                .as_deref()
                .context("spec.store.connection_string is required for the postgres backend")?;
            let store = PostgresRecordStore::connect(connection_string, config.max_connections)
                .await
                .context("Failed to connect to PostgreSQL record store")?;
            tracing::info!("Connected to PostgreSQL record store");
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_factory_memory() {
        let store = create_record_store(&StoreConfig::default()).await.unwrap();
        assert!(store.ping().await.is_ok());
        assert!(Arc::strong_count(&store) == 1);
    }

    #[tokio::test]
    async fn test_factory_postgres_requires_connection_string() {
        let config = StoreConfig {
            backend: StoreBackend::Postgres,
            connection_string: None,
            max_connections: 5,
        };
        assert!(create_record_store(&config).await.is_err());
    }
}
