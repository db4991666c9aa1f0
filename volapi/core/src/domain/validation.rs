// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Field Validation
//!
//! Syntax-level validators shared by the HTTP layer and the predicate
//! schemas. Each validator returns a [`FieldError`] rather than failing
//! fast; [`Validator`] collects them so a request reports every violated
//! constraint at once.

use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use regex::Regex;
use uuid::Uuid;

use crate::domain::error::{FieldError, VolapiError};

pub const MAX_VOLUME_NAME_LENGTH: usize = 256;

static VOLUME_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{1,}$").expect("volume name pattern compiles")
});

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid pattern compiles")
});

pub fn validate_uuid(field: &str, value: &str) -> Result<Uuid, FieldError> {
    if !UUID_RE.is_match(value) {
        return Err(FieldError::invalid(field, format!("{} must be a UUID", field)));
    }
    Uuid::parse_str(value).map_err(|_| FieldError::invalid(field, format!("{} must be a UUID", field)))
}

pub fn validate_volume_name(field: &str, value: &str) -> Result<(), FieldError> {
    if value.len() > MAX_VOLUME_NAME_LENGTH {
        return Err(FieldError::invalid(
            field,
            format!("{} must be at most {} characters", field, MAX_VOLUME_NAME_LENGTH),
        ));
    }
    if !VOLUME_NAME_RE.is_match(value) {
        return Err(FieldError::invalid(
            field,
            format!(
                "{} must match {}",
                field,
                VOLUME_NAME_RE.as_str()
            ),
        ));
    }
    Ok(())
}

/// Accepts a positive JSON integer or its decimal string form.
pub fn validate_size_value(field: &str, value: &Value) -> Result<u64, FieldError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(size) if size > 0 => Ok(size),
        _ => Err(FieldError::invalid(
            field,
            format!("{} must be a positive integer", field),
        )),
    }
}

/// Accepts JSON booleans and the strings "true" / "false".
pub fn validate_boolean(field: &str, value: &Value) -> Result<bool, FieldError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "true" => Ok(true),
        Value::String(s) if s == "false" => Ok(false),
        _ => Err(FieldError::invalid(field, format!("{} must be a boolean", field))),
    }
}

/// Collects field errors across a whole request.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags every key not in `allowed`.
    pub fn reject_unexpected<'a>(
        &mut self,
        keys: impl IntoIterator<Item = &'a String>,
        allowed: &[&str],
    ) {
        let unexpected: BTreeSet<&String> = keys
            .into_iter()
            .filter(|k| !allowed.contains(&k.as_str()))
            .collect();
        self.errors
            .extend(unexpected.into_iter().map(|k| FieldError::unexpected(k.as_str())));
    }

    /// Records the error, if any, and passes the value through.
    pub fn check<T>(&mut self, result: Result<T, FieldError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.errors.push(err);
                None
            }
        }
    }

    /// Like [`Validator::check`] for a mandatory field.
    pub fn require<T>(&mut self, field: &str, value: Option<Result<T, FieldError>>) -> Option<T> {
        match value {
            Some(result) => self.check(result),
            None => {
                self.errors.push(FieldError::missing(field));
                None
            }
        }
    }

    pub fn push(&mut self, err: FieldError) {
        self.errors.push(err);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = FieldError>) {
        self.errors.extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), VolapiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(VolapiError::validation(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_volume_names() {
        assert!(validate_volume_name("name", "data-vol_1.x").is_ok());
        assert!(validate_volume_name("name", "ab").is_ok());
        assert!(validate_volume_name("name", "a").is_err());
        assert!(validate_volume_name("name", "-leading").is_err());
        assert!(validate_volume_name("name", "has space").is_err());
        assert!(validate_volume_name("name", &"a".repeat(257)).is_err());
        assert!(validate_volume_name("name", &"a".repeat(256)).is_ok());
    }

    #[test]
    fn test_uuids() {
        assert!(validate_uuid("vm_uuid", "6b5e9e42-1c7a-4a5c-9a0e-1d2f3a4b5c6d").is_ok());
        assert!(validate_uuid("vm_uuid", "6b5e9e421c7a4a5c9a0e1d2f3a4b5c6d").is_err());
        assert!(validate_uuid("vm_uuid", "nope").is_err());
    }

    #[test]
    fn test_sizes_and_booleans() {
        assert_eq!(validate_size_value("size", &json!(10240)).unwrap(), 10240);
        assert_eq!(validate_size_value("size", &json!("512")).unwrap(), 512);
        assert!(validate_size_value("size", &json!(0)).is_err());
        assert!(validate_size_value("size", &json!(-1)).is_err());
        assert!(validate_boolean("force", &json!("true")).unwrap());
        assert!(!validate_boolean("force", &json!(false)).unwrap());
        assert!(validate_boolean("force", &json!("yes")).is_err());
    }

    #[test]
    fn test_validator_collects_everything() {
        let mut validator = Validator::new();
        let keys = vec!["owner_uuid".to_string(), "zzz".to_string(), "aaa".to_string()];
        validator.reject_unexpected(&keys, &["owner_uuid"]);
        let owner = validator.require::<Uuid>("vm_uuid", None);
        assert!(owner.is_none());

        match validator.finish() {
            Err(VolapiError::Validation { errors }) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["aaa", "zzz", "vm_uuid"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
