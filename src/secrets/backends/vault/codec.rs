//! Mapping between [`Authentication`] and the KV v2 envelope.
//!
//! A read returns `{"data": {...}, "metadata": {"created_time", "version"}}`.
//! Identity, tenant and owning resource come from the key, never from the
//! payload. Missing sections are fatal; missing leaves take their zero value;
//! a leaf of the wrong type fails the whole decode.

use super::path::SecretPath;
use crate::domain::{Authentication, AuthenticationId, AvailabilityStatus};
use crate::errors::DecodeError;
use crate::secrets::SecretValue;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

/// `data` map written for `record`; absent optional fields are omitted
pub fn encode(record: &Authentication) -> Value {
    let mut data = Map::new();
    if let Some(user_id) = record.user_id {
        data.insert("user_id".into(), json!(user_id));
    }
    data.insert("source_id".into(), json!(record.source_id));
    data.insert("authtype".into(), json!(record.auth_type));
    insert_opt(&mut data, "name", record.name.as_deref());
    insert_opt(&mut data, "username", record.username.as_deref());
    insert_opt(&mut data, "password", record.password.as_ref().map(SecretValue::expose));
    data.insert("extra".into(), Value::Object(record.extra.clone()));
    insert_opt(&mut data, "availability_status", record.availability_status.map(|s| s.as_str()));
    insert_opt(&mut data, "availability_status_error", record.availability_status_error.as_deref());
    insert_time(&mut data, "last_checked_at", record.last_checked_at);
    insert_time(&mut data, "last_available_at", record.last_available_at);
    insert_time(&mut data, "created_at", Some(record.created_at));
    insert_time(&mut data, "updated_at", record.updated_at);
    Value::Object(data)
}

/// Full envelope as a read would return it
pub fn encode_envelope(record: &Authentication) -> Value {
    let mut metadata = Map::new();
    metadata.insert("created_time".into(), json!(format_time(record.created_at)));
    if let Some(version) = record.version {
        metadata.insert("version".into(), json!(version));
    }
    json!({ "data": encode(record), "metadata": metadata })
}

pub fn decode(path: &SecretPath, envelope: &Value) -> Result<Authentication, DecodeError> {
    let envelope = envelope
        .as_object()
        .ok_or_else(|| wrong_type("envelope", "object"))?;
    let data = section(envelope, "data")?;
    let metadata = section(envelope, "metadata")?;

    let created_at = match time_field(data, "created_at")? {
        Some(at) => at,
        None => time_field(metadata, "created_time")?.unwrap_or(DateTime::UNIX_EPOCH),
    };
    let availability_status = match str_field(data, "availability_status")? {
        Some(raw) => Some(raw.parse::<AvailabilityStatus>().map_err(|_| {
            DecodeError::InvalidValue {
                field: "availability_status".to_string(),
                reason: format!("unknown status '{}'", raw),
            }
        })?),
        None => None,
    };
    let extra = match data.get("extra") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(wrong_type("extra", "object")),
    };

    Ok(Authentication {
        id: AuthenticationId::from(path.uuid),
        tenant_id: path.tenant_id,
        user_id: i64_field(data, "user_id")?,
        resource_type: path.resource_type,
        resource_id: path.resource_id,
        source_id: i64_field(data, "source_id")?.unwrap_or_default(),
        auth_type: str_field(data, "authtype")?.unwrap_or_default(),
        name: str_field(data, "name")?,
        username: str_field(data, "username")?,
        password: str_field(data, "password")?.map(SecretValue::new),
        extra,
        availability_status,
        availability_status_error: str_field(data, "availability_status_error")?,
        last_checked_at: time_field(data, "last_checked_at")?,
        last_available_at: time_field(data, "last_available_at")?,
        created_at,
        updated_at: time_field(data, "updated_at")?,
        version: u64_field(metadata, "version")?,
    })
}

/// Record carrying only what the key itself encodes, for secrets whose
/// payload cannot be decoded but must still be addressable
pub fn key_only(path: &SecretPath) -> Authentication {
    Authentication {
        id: AuthenticationId::from(path.uuid),
        tenant_id: path.tenant_id,
        user_id: None,
        resource_type: path.resource_type,
        resource_id: path.resource_id,
        source_id: 0,
        auth_type: String::new(),
        name: None,
        username: None,
        password: None,
        extra: Map::new(),
        availability_status: None,
        availability_status_error: None,
        last_checked_at: None,
        last_available_at: None,
        created_at: DateTime::UNIX_EPOCH,
        updated_at: None,
        version: None,
    }
}

fn insert_opt(data: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        data.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn insert_time(data: &mut Map<String, Value>, key: &str, value: Option<DateTime<Utc>>) {
    if let Some(at) = value {
        data.insert(key.to_string(), Value::String(format_time(at)));
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn wrong_type(field: &str, expected: &'static str) -> DecodeError {
    DecodeError::WrongType { field: field.to_string(), expected }
}

fn section<'a>(
    envelope: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a Map<String, Value>, DecodeError> {
    match envelope.get(name) {
        None | Some(Value::Null) => Err(DecodeError::MissingSection(name)),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(wrong_type(name, "object")),
    }
}

fn str_field(map: &Map<String, Value>, key: &str) -> Result<Option<String>, DecodeError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(wrong_type(key, "string")),
    }
}

fn i64_field(map: &Map<String, Value>, key: &str) -> Result<Option<i64>, DecodeError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| wrong_type(key, "integer")),
    }
}

fn u64_field(map: &Map<String, Value>, key: &str) -> Result<Option<u64>, DecodeError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| wrong_type(key, "unsigned integer")),
    }
}

fn time_field(map: &Map<String, Value>, key: &str) -> Result<Option<DateTime<Utc>>, DecodeError> {
    match str_field(map, key)? {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(|e| DecodeError::InvalidValue {
                field: key.to_string(),
                reason: e.to_string(),
            }),
    }
}
