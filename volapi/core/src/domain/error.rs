// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Volume API Error Taxonomy
//!
//! Every failure that can reach a client is one of the [`VolapiError`]
//! variants below. Variants carry their supplementary data as named fields
//! (available sizes, failing networks, offending parameters) so that the
//! presentation layer can render a structured body without a follow-up
//! request from the client.
//!
//! Infrastructure errors (`StoreError`, `RepositoryError`, `ClientError`)
//! convert into [`VolapiError::Internal`] unless the caller knows better and
//! reclassifies them first (e.g. a repository miss during a volume lookup
//! becomes [`VolapiError::VolumeNotFound`]).

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::compute::ClientError;
use crate::domain::repository::RepositoryError;
use crate::domain::volume::VolumeState;

/// A single violated input constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub code: FieldErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldErrorCode {
    Missing,
    Invalid,
    UnexpectedParameter,
}

impl FieldError {
    pub fn missing(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("{} is required", field),
            field,
            code: FieldErrorCode::Missing,
        }
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: FieldErrorCode::Invalid,
            message: message.into(),
        }
    }

    pub fn unexpected(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("unexpected parameter: {}", field),
            field,
            code: FieldErrorCode::UnexpectedParameter,
        }
    }
}

/// How a volume was looked up, for not-found reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeLookup {
    ByUuid(Uuid),
    ByName { name: String, owner_uuid: Uuid },
}

impl std::fmt::Display for VolumeLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ByUuid(uuid) => write!(f, "uuid {}", uuid),
            Self::ByName { name, owner_uuid } => {
                write!(f, "name {} (owner {})", name, owner_uuid)
            }
        }
    }
}

/// Networks that failed ownership validation, grouped by failed check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidNetworks {
    pub missing: Vec<Uuid>,
    #[serde(rename = "nonOwned")]
    pub non_owned: Vec<Uuid>,
    #[serde(rename = "nonFabric")]
    pub non_fabric: Vec<Uuid>,
}

impl InvalidNetworks {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.non_owned.is_empty() && self.non_fabric.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum VolapiError {
    #[error("Validation failed: {}", summarize(.errors))]
    Validation { errors: Vec<FieldError> },

    #[error("Volume not found: {lookup}")]
    VolumeNotFound { lookup: VolumeLookup },

    #[error("Volume reservation not found: {uuid}")]
    ReservationNotFound { uuid: Uuid },

    #[error("No image found for the NFS server role: {name}")]
    ImageNotFound { name: String },

    #[error("No package found for volume type {volume_type}")]
    PackageNotFound { volume_type: String },

    #[error("Volume with name {name} already exists")]
    VolumeAlreadyExists { name: String },

    #[error("Volume {uuid} is in use by {} VM(s)", .references.len())]
    VolumeInUse { uuid: Uuid, references: Vec<Uuid> },

    #[error("Volume reservation {uuid} does not belong to the requesting owner")]
    ReservationOwnerMismatch { uuid: Uuid },

    #[error("Concurrent modification: {message}")]
    Conflict { message: String },

    #[error("Volume size {requested} not available")]
    VolumeSizeNotAvailable { requested: u64, available_sizes: Vec<u64> },

    #[error("Invalid networks")]
    InvalidNetworks { networks: InvalidNetworks },

    #[error("Invalid volume state transition from {from} to {to}")]
    InvalidStateTransition { from: VolumeState, to: VolumeState },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl VolapiError {
    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self::Validation { errors }
    }

    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![FieldError::invalid(field, message)],
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable code rendered in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::VolumeNotFound { .. } => "VolumeNotFound",
            Self::ReservationNotFound { .. } => "ReservationNotFound",
            Self::ImageNotFound { .. } => "ImageNotFound",
            Self::PackageNotFound { .. } => "PackageNotFound",
            Self::VolumeAlreadyExists { .. } => "VolumeAlreadyExists",
            Self::VolumeInUse { .. } => "VolumeInUse",
            Self::ReservationOwnerMismatch { .. } => "ReservationOwnerMismatch",
            Self::Conflict { .. } => "ConcurrencyConflict",
            Self::VolumeSizeNotAvailable { .. } => "VolumeSizeNotAvailable",
            Self::InvalidNetworks { .. } => "InvalidNetworks",
            Self::InvalidStateTransition { .. } => "InvalidStateTransition",
            Self::Internal { .. } => "InternalError",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::VolumeNotFound { .. }
                | Self::ReservationNotFound { .. }
                | Self::ImageNotFound { .. }
                | Self::PackageNotFound { .. }
        )
    }
}

impl From<RepositoryError> for VolapiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(message) => Self::Conflict { message },
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}

impl From<ClientError> for VolapiError {
    fn from(err: ClientError) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_error() {
        let err = VolapiError::validation(vec![
            FieldError::missing("owner_uuid"),
            FieldError::unexpected("bogus"),
        ]);
        let message = err.to_string();
        assert!(message.contains("owner_uuid is required"));
        assert!(message.contains("unexpected parameter: bogus"));
        assert_eq!(err.code(), "ValidationError");
    }

    #[test]
    fn test_repository_conflict_maps_to_conflict() {
        let err: VolapiError = RepositoryError::Conflict("etag mismatch".to_string()).into();
        assert!(matches!(err, VolapiError::Conflict { .. }));
        assert_eq!(err.code(), "ConcurrencyConflict");
    }

    #[test]
    fn test_invalid_networks_serializes_camel_case() {
        let networks = InvalidNetworks {
            missing: vec![Uuid::nil()],
            ..Default::default()
        };
        let json = serde_json::to_value(&networks).unwrap();
        assert!(json.get("nonOwned").is_some());
        assert!(json.get("nonFabric").is_some());
        assert!(!networks.is_empty());
    }
}
