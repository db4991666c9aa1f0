// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer (`volapi-core`)
//!
//! Volume and reservation aggregates, the error taxonomy, the predicate and
//! native filter languages, and the traits behind which every external
//! collaborator (record store, compute, catalogs, networks) sits.

pub mod catalog;
pub mod compute;
pub mod config;
pub mod error;
pub mod filter;
pub mod network;
pub mod predicate;
pub mod repository;
pub mod reservation;
pub mod size;
pub mod store;
pub mod validation;
pub mod volume;
