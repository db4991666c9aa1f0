// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Request parameter validation.
//!
//! Each endpoint has one function here turning raw query parameters and an
//! optional JSON body into a typed application request. Every violated
//! constraint is collected before anything is returned, and parameters the
//! endpoint does not know are rejected by name.

use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::application::{
    CreateReservationRequest, CreateVolumeRequest, ListReservationsQuery, ListVolumesQuery,
    UpdateVolumeRequest, VolumeTarget,
};
use crate::domain::error::{FieldError, VolapiError};
use crate::domain::filter::Filter;
use crate::domain::predicate::Predicate;
use crate::domain::reservation::ReservationId;
use crate::domain::size::SizeSpec;
use crate::domain::validation::{
    validate_boolean, validate_size_value, validate_uuid, validate_volume_name, Validator,
};
use crate::domain::volume::{VolumeId, VolumeState, VolumeType};

pub type QueryParams = HashMap<String, String>;
pub type Body = Map<String, Value>;

/// Parses a request body. An empty body is an empty object.
pub fn body_object(bytes: &[u8]) -> Result<Body, VolapiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Body::new());
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(VolapiError::invalid_field("body", "request body must be a JSON object")),
        Err(e) => Err(VolapiError::invalid_field(
            "body",
            format!("request body is not valid JSON: {}", e),
        )),
    }
}

/// Unwraps a field the validator has already required.
fn required<T>(field: &str, value: Option<T>) -> Result<T, VolapiError> {
    value.ok_or_else(|| VolapiError::validation(vec![FieldError::missing(field)]))
}

fn body_str<'a>(body: &'a Body, field: &str) -> Option<Result<&'a str, FieldError>> {
    body.get(field).map(|value| {
        value
            .as_str()
            .ok_or_else(|| FieldError::invalid(field, format!("{} must be a string", field)))
    })
}

fn body_uuid(body: &Body, field: &str) -> Option<Result<Uuid, FieldError>> {
    body_str(body, field).map(|s| s.and_then(|s| validate_uuid(field, s)))
}

fn body_name(body: &Body, field: &str) -> Option<Result<String, FieldError>> {
    body_str(body, field).map(|s| {
        s.and_then(|s| validate_volume_name(field, s).map(|()| s.to_string()))
    })
}

fn query_uuid(params: &QueryParams, field: &str) -> Option<Result<Uuid, FieldError>> {
    params.get(field).map(|s| validate_uuid(field, s))
}

fn query_name(params: &QueryParams, field: &str) -> Option<Result<String, FieldError>> {
    params
        .get(field)
        .map(|s| validate_volume_name(field, s).map(|()| s.clone()))
}

fn parse_type(field: &str, s: &str) -> Result<VolumeType, FieldError> {
    s.parse::<VolumeType>().map_err(|e| FieldError::invalid(field, e))
}

fn parse_state(field: &str, s: &str) -> Result<VolumeState, FieldError> {
    s.parse::<VolumeState>().map_err(|e| FieldError::invalid(field, e))
}

/// Size as sent on create: MiB as a number, or a string with a unit.
fn parse_create_size(value: &Value) -> Result<u64, FieldError> {
    let spec: SizeSpec = serde_json::from_value(value.clone()).map_err(|_| {
        FieldError::invalid("size", "size must be a positive integer or a string such as 10g")
    })?;
    spec.to_mebibytes()
        .map_err(|e| FieldError::invalid("size", e.to_string()))
}

pub fn volume_uuid(path: &str) -> Result<VolumeId, VolapiError> {
    validate_uuid("uuid", path)
        .map(VolumeId)
        .map_err(|e| VolapiError::validation(vec![e]))
}

pub fn reservation_uuid(path: &str) -> Result<ReservationId, VolapiError> {
    validate_uuid("uuid", path)
        .map(ReservationId)
        .map_err(|e| VolapiError::validation(vec![e]))
}

// ============================================================================
// Endpoints
// ============================================================================

pub fn ping(params: &QueryParams) -> Result<(), VolapiError> {
    let mut v = Validator::new();
    v.reject_unexpected(params.keys(), &[]);
    v.finish()
}

pub fn create_volume(params: &QueryParams, body: &Body) -> Result<CreateVolumeRequest, VolapiError> {
    let mut v = Validator::new();
    v.reject_unexpected(params.keys(), &[]);
    v.reject_unexpected(
        body.keys(),
        &["name", "owner_uuid", "size", "type", "networks", "state"],
    );

    let name = v.require("name", body_name(body, "name"));
    let owner_uuid = v.require("owner_uuid", body_uuid(body, "owner_uuid"));
    let size = body.get("size").and_then(|value| v.check(parse_create_size(value)));
    let volume_type = match body_str(body, "type") {
        Some(s) => v.check(s.and_then(|s| parse_type("type", s))),
        None => Some(VolumeType::default()),
    };
    let state = body_str(body, "state").and_then(|s| v.check(s.and_then(|s| parse_state("state", s))));

    let networks = match body.get("networks") {
        None => {
            v.push(FieldError::missing("networks"));
            None
        }
        Some(Value::Array(items)) if items.is_empty() => {
            v.push(FieldError::invalid("networks", "networks must not be empty"));
            None
        }
        Some(Value::Array(items)) => {
            let parsed: Vec<Option<Uuid>> = items
                .iter()
                .map(|item| {
                    let result = item
                        .as_str()
                        .ok_or_else(|| FieldError::invalid("networks", "networks must contain UUID strings"))
                        .and_then(|s| validate_uuid("networks", s));
                    v.check(result)
                })
                .collect();
            parsed.into_iter().collect::<Option<Vec<Uuid>>>()
        }
        Some(_) => {
            v.push(FieldError::invalid("networks", "networks must be an array of UUIDs"));
            None
        }
    };

    v.finish()?;
    Ok(CreateVolumeRequest {
        name: required("name", name)?,
        owner_uuid: required("owner_uuid", owner_uuid)?,
        size,
        volume_type: required("type", volume_type)?,
        networks: required("networks", networks)?,
        state,
    })
}

pub fn list_volumes(params: &QueryParams) -> Result<ListVolumesQuery, VolapiError> {
    let mut v = Validator::new();
    v.reject_unexpected(
        params.keys(),
        &["owner_uuid", "name", "type", "state", "size", "vm_uuid", "predicate", "filter"],
    );

    let query = ListVolumesQuery {
        owner_uuid: query_uuid(params, "owner_uuid").and_then(|r| v.check(r)),
        name: query_name(params, "name").and_then(|r| v.check(r)),
        volume_type: params.get("type").and_then(|s| v.check(parse_type("type", s))),
        state: params.get("state").and_then(|s| v.check(parse_state("state", s))),
        size: params
            .get("size")
            .and_then(|s| v.check(validate_size_value("size", &Value::String(s.clone())))),
        vm_uuid: query_uuid(params, "vm_uuid").and_then(|r| v.check(r)),
        predicate: params.get("predicate").and_then(|s| {
            v.check(Predicate::parse(s).map_err(|e| FieldError::invalid("predicate", e)))
        }),
        filter: params.get("filter").and_then(|s| {
            v.check(Filter::parse(s).map_err(|e| FieldError::invalid("filter", e.to_string())))
        }),
    };

    v.finish()?;
    Ok(query)
}

/// Optional `owner_uuid` scope, the only parameter of read endpoints on one volume.
pub fn owner_scope(params: &QueryParams) -> Result<Option<Uuid>, VolapiError> {
    let mut v = Validator::new();
    v.reject_unexpected(params.keys(), &["owner_uuid"]);
    let owner = query_uuid(params, "owner_uuid").and_then(|r| v.check(r));
    v.finish()?;
    Ok(owner)
}

pub fn update_volume(
    params: &QueryParams,
    body: &Body,
) -> Result<(Option<Uuid>, UpdateVolumeRequest), VolapiError> {
    let mut v = Validator::new();
    v.reject_unexpected(params.keys(), &[]);
    v.reject_unexpected(body.keys(), &["owner_uuid", "name", "state"]);

    let owner = body_uuid(body, "owner_uuid").and_then(|r| v.check(r));
    let name = body_name(body, "name").and_then(|r| v.check(r));
    let state = body_str(body, "state").and_then(|s| v.check(s.and_then(|s| parse_state("state", s))));
    if !body.contains_key("name") && !body.contains_key("state") {
        v.push(FieldError::invalid("body", "at least one of name, state is required"));
    }

    v.finish()?;
    Ok((owner, UpdateVolumeRequest { name, state }))
}

/// A delete addresses a volume by uuid, or by name within `owner_uuid`.
pub fn delete_volume(path: &str, params: &QueryParams) -> Result<(VolumeTarget, bool), VolapiError> {
    let mut v = Validator::new();
    v.reject_unexpected(params.keys(), &["owner_uuid", "force"]);

    let owner = query_uuid(params, "owner_uuid").and_then(|r| v.check(r));
    let force = match params.get("force") {
        Some(s) => v.check(validate_boolean("force", &Value::String(s.clone()))).unwrap_or(false),
        None => false,
    };

    let target = match Uuid::parse_str(path) {
        Ok(uuid) => Some(VolumeTarget::ByUuid {
            uuid: VolumeId(uuid),
            owner_uuid: owner,
        }),
        Err(_) => {
            let name = v.check(validate_volume_name("name", path));
            if !params.contains_key("owner_uuid") {
                v.push(FieldError::missing("owner_uuid"));
            }
            match (name, owner) {
                (Some(()), Some(owner_uuid)) => Some(VolumeTarget::ByName {
                    name: path.to_string(),
                    owner_uuid,
                }),
                _ => None,
            }
        }
    };

    v.finish()?;
    Ok((required("uuid", target)?, force))
}

/// `(owner_uuid, vm_uuid)` of an add/remove reference call.
pub fn reference(params: &QueryParams, body: &Body) -> Result<(Uuid, Uuid), VolapiError> {
    let mut v = Validator::new();
    v.reject_unexpected(params.keys(), &[]);
    v.reject_unexpected(body.keys(), &["owner_uuid", "vm_uuid"]);
    let owner = v.require("owner_uuid", body_uuid(body, "owner_uuid"));
    let vm = v.require("vm_uuid", body_uuid(body, "vm_uuid"));
    v.finish()?;
    Ok((required("owner_uuid", owner)?, required("vm_uuid", vm)?))
}

pub fn volume_sizes(params: &QueryParams) -> Result<Option<VolumeType>, VolapiError> {
    let mut v = Validator::new();
    v.reject_unexpected(params.keys(), &["type"]);
    let volume_type = params.get("type").and_then(|s| v.check(parse_type("type", s)));
    v.finish()?;
    Ok(volume_type)
}

pub fn create_reservation(
    params: &QueryParams,
    body: &Body,
) -> Result<CreateReservationRequest, VolapiError> {
    let mut v = Validator::new();
    v.reject_unexpected(params.keys(), &[]);
    v.reject_unexpected(body.keys(), &["volume_name", "owner_uuid", "vm_uuid", "job_uuid"]);

    let volume_name = v.require("volume_name", body_name(body, "volume_name"));
    let owner_uuid = v.require("owner_uuid", body_uuid(body, "owner_uuid"));
    let vm_uuid = v.require("vm_uuid", body_uuid(body, "vm_uuid"));
    let job_uuid = v.require("job_uuid", body_uuid(body, "job_uuid"));

    v.finish()?;
    Ok(CreateReservationRequest {
        volume_name: required("volume_name", volume_name)?,
        owner_uuid: required("owner_uuid", owner_uuid)?,
        vm_uuid: required("vm_uuid", vm_uuid)?,
        job_uuid: required("job_uuid", job_uuid)?,
    })
}

pub fn remove_reservation(path: &str, params: &QueryParams) -> Result<(ReservationId, Uuid), VolapiError> {
    let mut v = Validator::new();
    v.reject_unexpected(params.keys(), &["owner_uuid"]);
    let uuid = v.check(validate_uuid("uuid", path));
    let owner = v.require("owner_uuid", query_uuid(params, "owner_uuid"));
    v.finish()?;
    Ok((ReservationId(required("uuid", uuid)?), required("owner_uuid", owner)?))
}

pub fn list_reservations(params: &QueryParams) -> Result<ListReservationsQuery, VolapiError> {
    let mut v = Validator::new();
    v.reject_unexpected(
        params.keys(),
        &["owner_uuid", "volume_name", "vm_uuid", "job_uuid", "predicate"],
    );

    let query = ListReservationsQuery {
        owner_uuid: query_uuid(params, "owner_uuid").and_then(|r| v.check(r)),
        volume_name: query_name(params, "volume_name").and_then(|r| v.check(r)),
        vm_uuid: query_uuid(params, "vm_uuid").and_then(|r| v.check(r)),
        job_uuid: query_uuid(params, "job_uuid").and_then(|r| v.check(r)),
        predicate: params.get("predicate").and_then(|s| {
            v.check(Predicate::parse(s).map_err(|e| FieldError::invalid("predicate", e)))
        }),
    };

    v.finish()?;
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::FieldErrorCode;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn body(value: Value) -> Body {
        value.as_object().cloned().unwrap()
    }

    fn errors(err: VolapiError) -> Vec<FieldError> {
        match err {
            VolapiError::Validation { errors } => errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_create_volume_collects_every_error() {
        let err = create_volume(
            &params(&[("bogus", "1")]),
            &body(json!({"size": "7", "type": "nfs", "extra": true})),
        )
        .unwrap_err();
        let errors = errors(err);
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        for expected in ["bogus", "extra", "name", "owner_uuid", "size", "type", "networks"] {
            assert!(fields.contains(&expected), "missing error for {}", expected);
        }
    }

    #[test]
    fn test_create_volume_parses_size_units() {
        let owner = Uuid::new_v4();
        let network = Uuid::new_v4();
        let request = create_volume(
            &QueryParams::new(),
            &body(json!({
                "name": "data",
                "owner_uuid": owner.to_string(),
                "size": "10g",
                "networks": [network.to_string()],
            })),
        )
        .unwrap();
        assert_eq!(request.size, Some(10240));
        assert_eq!(request.volume_type, VolumeType::Tritonnfs);
        assert_eq!(request.networks, vec![network]);

        let numeric = create_volume(
            &QueryParams::new(),
            &body(json!({
                "name": "data",
                "owner_uuid": owner.to_string(),
                "size": 500,
                "networks": [network.to_string()],
            })),
        )
        .unwrap();
        assert_eq!(numeric.size, Some(500));
    }

    #[test]
    fn test_list_volumes_rejects_unknown_params() {
        let err = list_volumes(&params(&[("colour", "red"), ("state", "ready")])).unwrap_err();
        let errors = errors(err);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "colour");
        assert_eq!(errors[0].code, FieldErrorCode::UnexpectedParameter);
    }

    #[test]
    fn test_list_volumes_parses_predicate_and_filter() {
        let query = list_volumes(&params(&[
            ("predicate", r#"{"eq": ["state", "ready"]}"#),
            ("filter", "(size=10240)"),
            ("owner_uuid", "123e4567-e89b-12d3-a456-426614174000"),
        ]))
        .unwrap();
        assert!(query.predicate.is_some());
        assert_eq!(query.filter, Some(Filter::eq("size", "10240")));
        assert!(query.owner_uuid.is_some());

        assert!(list_volumes(&params(&[("predicate", "not json")])).is_err());
        assert!(list_volumes(&params(&[("filter", "(size=10240")])).is_err());
    }

    #[test]
    fn test_list_volumes_rejects_deeply_nested_filter() {
        let nested = format!("{}(name=a){}", "(!".repeat(20_000), ")".repeat(20_000));
        let err = list_volumes(&params(&[("filter", &nested)])).unwrap_err();
        assert_eq!(errors(err)[0].field, "filter");

        let nested = format!("{}(name=a){}", "(|".repeat(40), ")".repeat(40));
        assert!(list_volumes(&params(&[("filter", &nested)])).is_err());
    }

    #[test]
    fn test_delete_by_name_requires_owner() {
        let err = delete_volume("data", &QueryParams::new()).unwrap_err();
        assert_eq!(errors(err)[0].code, FieldErrorCode::Missing);

        let owner = Uuid::new_v4().to_string();
        let (target, force) =
            delete_volume("data", &params(&[("owner_uuid", &owner), ("force", "true")])).unwrap();
        assert!(matches!(target, VolumeTarget::ByName { ref name, .. } if name == "data"));
        assert!(force);

        let uuid = Uuid::new_v4();
        let (target, force) = delete_volume(&uuid.to_string(), &QueryParams::new()).unwrap();
        assert_eq!(
            target,
            VolumeTarget::ByUuid { uuid: VolumeId(uuid), owner_uuid: None }
        );
        assert!(!force);
    }

    #[test]
    fn test_create_reservation_requires_every_field() {
        let err = create_reservation(&QueryParams::new(), &Body::new()).unwrap_err();
        assert_eq!(errors(err).len(), 4);
    }

    #[test]
    fn test_update_needs_something_to_change() {
        assert!(update_volume(&QueryParams::new(), &Body::new()).is_err());
        let (owner, update) =
            update_volume(&QueryParams::new(), &body(json!({"state": "ready"}))).unwrap();
        assert!(owner.is_none());
        assert_eq!(update.state, Some(VolumeState::Ready));
    }

    #[test]
    fn test_body_object() {
        assert!(body_object(b"").unwrap().is_empty());
        assert!(body_object(b"  \n").unwrap().is_empty());
        assert!(body_object(b"[1]").is_err());
        assert!(body_object(b"{").is_err());
        assert_eq!(body_object(br#"{"a": 1}"#).unwrap().len(), 1);
    }

    #[test]
    fn test_ping_takes_no_params() {
        assert!(ping(&QueryParams::new()).is_ok());
        assert!(ping(&params(&[("x", "1")])).is_err());
    }
}
