// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`volapi-core`)
//!
//! HTTP surface that translates requests into application service calls.
//! No business logic lives here; parameter syntax is checked in [`params`]
//! and everything else is delegated to `crate::application`.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Axum router and handlers |
//! | [`params`] | Query/body validation into typed requests |
//! | [`error`] | `VolapiError` to HTTP status and body |

pub mod api;
pub mod error;
pub mod params;

pub use api::{app, AppState, API_VERSION};
