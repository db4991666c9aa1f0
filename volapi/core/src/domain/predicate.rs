// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Predicates
//!
//! Clients filter list operations with a small JSON boolean language:
//!
//! ```json
//! {"and": [{"eq": ["state", "ready"]}, {"or": [{"eq": ["size", 10240]}, {"eq": ["dangling", true]}]}]}
//! ```
//!
//! `{}` is the trivial predicate and matches everything. Predicates are
//! parsed into [`Predicate`], checked against a per-entity [`PredicateSchema`]
//! (allowed fields and per-field value validators), then translated into a
//! native store [`Filter`]. Validation happens before translation, so an
//! unknown field or an invalid value is always a validation error.

use serde_json::{Map, Value};

use crate::domain::error::FieldError;
use crate::domain::filter::Filter;
use crate::domain::validation;
use crate::domain::volume::{VolumeState, VolumeType};

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn trivial() -> Self {
        Self::And(Vec::new())
    }

    pub fn is_trivial(&self) -> bool {
        matches!(self, Self::And(children) if children.iter().all(Predicate::is_trivial))
    }

    pub fn parse(input: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(input).map_err(|e| format!("predicate is not valid JSON: {}", e))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, String> {
        let object = value
            .as_object()
            .ok_or_else(|| "predicate must be a JSON object".to_string())?;
        if object.is_empty() {
            return Ok(Self::trivial());
        }
        if object.len() != 1 {
            return Err("predicate object must have exactly one operator".to_string());
        }
        Self::from_operator(object)
    }

    fn from_operator(object: &Map<String, Value>) -> Result<Self, String> {
        let (op, args) = object
            .iter()
            .next()
            .ok_or_else(|| "predicate object must have exactly one operator".to_string())?;
        match op.as_str() {
            "eq" => {
                let pair = args
                    .as_array()
                    .filter(|a| a.len() == 2)
                    .ok_or_else(|| "eq expects a [field, value] pair".to_string())?;
                let field = pair[0]
                    .as_str()
                    .ok_or_else(|| "eq field name must be a string".to_string())?;
                match &pair[1] {
                    Value::String(_) | Value::Number(_) | Value::Bool(_) => {}
                    _ => return Err(format!("eq value for {} must be a scalar", field)),
                }
                Ok(Self::Eq(field.to_string(), pair[1].clone()))
            }
            "and" | "or" => {
                let items = args
                    .as_array()
                    .ok_or_else(|| format!("{} expects an array of predicates", op))?;
                let children = items
                    .iter()
                    .map(Self::from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                if op == "and" {
                    Ok(Self::And(children))
                } else if children.is_empty() {
                    Err("or expects at least one predicate".to_string())
                } else {
                    Ok(Self::Or(children))
                }
            }
            other => Err(format!("unknown predicate operator: {}", other)),
        }
    }

    /// Every `(field, value)` leaf, depth first.
    pub fn leaves(&self) -> Vec<(&str, &Value)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<(&'a str, &'a Value)>) {
        match self {
            Self::Eq(field, value) => out.push((field, value)),
            Self::And(children) | Self::Or(children) => {
                children.iter().for_each(|c| c.collect_leaves(out))
            }
        }
    }

    /// Validates every leaf against `schema`, collecting all violations.
    pub fn validate<S: PredicateSchema>(&self, schema: &S) -> Result<(), Vec<FieldError>> {
        let errors: Vec<FieldError> = self
            .leaves()
            .into_iter()
            .filter_map(|(field, value)| schema.leaf_filter(field, value).err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Translates into a native filter. Validates first.
    pub fn to_filter<S: PredicateSchema>(&self, schema: &S) -> Result<Filter, Vec<FieldError>> {
        self.validate(schema)?;
        Ok(self.translate(schema))
    }

    fn translate<S: PredicateSchema>(&self, schema: &S) -> Filter {
        match self {
            Self::Eq(field, value) => schema
                .leaf_filter(field, value)
                .unwrap_or_else(|_| Filter::match_all()),
            Self::And(children) => {
                Filter::and_all(children.iter().map(|c| c.translate(schema)))
            }
            Self::Or(children) => {
                let mut translated: Vec<Filter> =
                    children.iter().map(|c| c.translate(schema)).collect();
                if translated.iter().any(Filter::is_match_all) {
                    Filter::match_all()
                } else if translated.len() == 1 {
                    translated.remove(0)
                } else {
                    Filter::Or(translated)
                }
            }
        }
    }
}

/// Allowed fields for one entity type and how each leaf maps to the store.
pub trait PredicateSchema {
    fn leaf_filter(&self, field: &str, value: &Value) -> Result<Filter, FieldError>;
}

fn field_label(field: &str) -> String {
    format!("predicate.{}", field)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Fields: name, type, state, size, uuid, network, dangling.
pub struct VolumePredicateFields;

impl VolumePredicateFields {
    pub const FIELDS: &'static [&'static str] =
        &["name", "type", "state", "size", "uuid", "network", "dangling"];
}

impl PredicateSchema for VolumePredicateFields {
    fn leaf_filter(&self, field: &str, value: &Value) -> Result<Filter, FieldError> {
        let label = field_label(field);
        let text = scalar_text(value)
            .ok_or_else(|| FieldError::invalid(&label, "value must be a scalar"))?;
        match field {
            "name" => {
                validation::validate_volume_name(&label, &text)?;
                Ok(Filter::eq("name", text))
            }
            "type" => {
                text.parse::<VolumeType>()
                    .map_err(|e| FieldError::invalid(&label, e))?;
                Ok(Filter::eq("type", text))
            }
            "state" => {
                text.parse::<VolumeState>()
                    .map_err(|e| FieldError::invalid(&label, e))?;
                Ok(Filter::eq("state", text))
            }
            "size" => {
                let size = validation::validate_size_value(&label, value)?;
                Ok(Filter::eq("size", size.to_string()))
            }
            "uuid" => {
                let uuid = validation::validate_uuid(&label, &text)?;
                Ok(Filter::eq("uuid", uuid.to_string()))
            }
            "network" => {
                let uuid = validation::validate_uuid(&label, &text)?;
                Ok(Filter::eq("networks", uuid.to_string()))
            }
            "dangling" => match validation::validate_boolean(&label, value)? {
                true => Ok(Filter::Not(Box::new(Filter::present("refs")))),
                false => Ok(Filter::present("refs")),
            },
            other => Err(FieldError::invalid(
                field_label(other),
                format!(
                    "unknown predicate field {:?}, expected one of: {}",
                    other,
                    Self::FIELDS.join(", ")
                ),
            )),
        }
    }
}

/// Fields: owner_uuid, volume_name, vm_uuid, job_uuid.
pub struct ReservationPredicateFields;

impl ReservationPredicateFields {
    pub const FIELDS: &'static [&'static str] = &["owner_uuid", "volume_name", "vm_uuid", "job_uuid"];
}

impl PredicateSchema for ReservationPredicateFields {
    fn leaf_filter(&self, field: &str, value: &Value) -> Result<Filter, FieldError> {
        let label = field_label(field);
        let text = scalar_text(value)
            .ok_or_else(|| FieldError::invalid(&label, "value must be a scalar"))?;
        match field {
            "volume_name" => {
                validation::validate_volume_name(&label, &text)?;
                Ok(Filter::eq("volume_name", text))
            }
            "owner_uuid" | "vm_uuid" | "job_uuid" => {
                let uuid = validation::validate_uuid(&label, &text)?;
                Ok(Filter::eq(field, uuid.to_string()))
            }
            other => Err(FieldError::invalid(
                field_label(other),
                format!(
                    "unknown predicate field {:?}, expected one of: {}",
                    other,
                    Self::FIELDS.join(", ")
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_is_trivial() {
        let predicate = Predicate::parse("{}").unwrap();
        assert!(predicate.is_trivial());
        assert!(predicate.to_filter(&VolumePredicateFields).unwrap().is_match_all());
    }

    #[test]
    fn test_single_leaf_translates_directly() {
        let predicate = Predicate::parse(r#"{"eq": ["state", "ready"]}"#).unwrap();
        let filter = predicate.to_filter(&VolumePredicateFields).unwrap();
        assert_eq!(filter.to_string(), "(state=ready)");
    }

    #[test]
    fn test_conjunction_and_disjunction() {
        let predicate = Predicate::from_value(&json!({
            "and": [
                {"eq": ["type", "tritonnfs"]},
                {"or": [{"eq": ["size", 10240]}, {"eq": ["dangling", true]}]}
            ]
        }))
        .unwrap();
        let filter = predicate.to_filter(&VolumePredicateFields).unwrap();
        assert_eq!(
            filter.to_string(),
            "(&(type=tritonnfs)(|(size=10240)(!(refs=*))))"
        );
    }

    #[test]
    fn test_network_maps_to_networks_attribute() {
        let network = "6b5e9e42-1c7a-4a5c-9a0e-1d2f3a4b5c6d";
        let predicate = Predicate::from_value(&json!({"eq": ["network", network]})).unwrap();
        let filter = predicate.to_filter(&VolumePredicateFields).unwrap();
        assert_eq!(filter.to_string(), format!("(networks={})", network));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let predicate = Predicate::parse(r#"{"eq": ["bogus", "x"]}"#).unwrap();
        let errors = predicate.to_filter(&VolumePredicateFields).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "predicate.bogus");
    }

    #[test]
    fn test_invalid_values_are_all_reported() {
        let predicate = Predicate::from_value(&json!({
            "and": [{"eq": ["state", "exploded"]}, {"eq": ["uuid", "not-a-uuid"]}]
        }))
        .unwrap();
        let errors = predicate.validate(&VolumePredicateFields).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_malformed_predicates() {
        assert!(Predicate::parse("not json").is_err());
        assert!(Predicate::parse("[]").is_err());
        assert!(Predicate::parse(r#"{"eq": ["name"]}"#).is_err());
        assert!(Predicate::parse(r#"{"eq": ["name", {"a": 1}]}"#).is_err());
        assert!(Predicate::parse(r#"{"xor": []}"#).is_err());
        assert!(Predicate::parse(r#"{"or": []}"#).is_err());
        assert!(Predicate::parse(r#"{"eq": ["name", "a"], "and": []}"#).is_err());
    }

    #[test]
    fn test_reservation_fields() {
        let vm = "0f3b5f84-2b8a-4c58-9a9c-6b1b5e0e5d9a";
        let predicate = Predicate::from_value(&json!({"eq": ["vm_uuid", vm]})).unwrap();
        let filter = predicate.to_filter(&ReservationPredicateFields).unwrap();
        assert_eq!(filter.to_string(), format!("(vm_uuid={})", vm));

        let bad = Predicate::from_value(&json!({"eq": ["state", "ready"]})).unwrap();
        assert!(bad.to_filter(&ReservationPredicateFields).is_err());
    }
}
