//! Authentication records and their owning resources.

use crate::errors::{AuthStoreError, Result};
use crate::secrets::SecretValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of resource a credential authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    Source,
    Endpoint,
    Application,
    ApplicationAuthentication,
}

impl ResourceType {
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Source,
        ResourceType::Endpoint,
        ResourceType::Application,
        ResourceType::ApplicationAuthentication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "Source",
            Self::Endpoint => "Endpoint",
            Self::Application => "Application",
            Self::ApplicationAuthentication => "ApplicationAuthentication",
        }
    }

    /// Table holding resources of this type
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Source => "sources",
            Self::Endpoint => "endpoints",
            Self::Application => "applications",
            Self::ApplicationAuthentication => "application_authentications",
        }
    }
}

impl FromStr for ResourceType {
    type Err = AuthStoreError;

    fn from_str(s: &str) -> Result<Self> {
        ResourceType::ALL.into_iter().find(|rt| rt.as_str() == s).ok_or_else(|| {
            AuthStoreError::bad_request_field(
                format!("invalid resource type '{}'", s),
                "resource_type",
            )
        })
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability as reported by the external health-check pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    Available,
    Unavailable,
    InProgress,
    PartiallyAvailable,
}

impl AvailabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
            Self::InProgress => "in_progress",
            Self::PartiallyAvailable => "partially_available",
        }
    }
}

impl FromStr for AvailabilityStatus {
    type Err = AuthStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(Self::Available),
            "unavailable" => Ok(Self::Unavailable),
            "in_progress" => Ok(Self::InProgress),
            "partially_available" => Ok(Self::PartiallyAvailable),
            other => Err(AuthStoreError::bad_request_field(
                format!("invalid availability status '{}'", other),
                "availability_status",
            )),
        }
    }
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-assigned identity of an authentication.
///
/// Numeric for the relational backends, a UUID for the key-value backend.
/// Callers must treat it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthenticationId(String);

impl AuthenticationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse as a relational primary key
    pub fn as_database_id(&self) -> Result<i64> {
        self.0.parse::<i64>().map_err(|_| {
            AuthStoreError::bad_request_field(
                format!("invalid authentication id '{}'", self.0),
                "id",
            )
        })
    }

    /// Parse as a key-value identity
    pub fn as_uuid(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.0).map_err(|_| {
            AuthStoreError::bad_request_field(
                format!("invalid authentication id '{}'", self.0),
                "id",
            )
        })
    }
}

impl From<i64> for AuthenticationId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<Uuid> for AuthenticationId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for AuthenticationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored credential
#[derive(Debug, Clone, PartialEq)]
pub struct Authentication {
    pub id: AuthenticationId,
    pub tenant_id: i64,
    pub user_id: Option<i64>,
    pub resource_type: ResourceType,
    pub resource_id: i64,
    pub source_id: i64,
    pub auth_type: String,
    pub name: Option<String>,
    pub username: Option<String>,
    /// Ciphertext, reference or plaintext depending on backend and read path
    pub password: Option<SecretValue>,
    pub extra: Map<String, Value>,
    pub availability_status: Option<AvailabilityStatus>,
    pub availability_status_error: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_available_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Revision marker, only surfaced by the key-value backend
    pub version: Option<u64>,
}

impl Authentication {
    /// Whether a caller bound to `user_id` may see this record
    pub fn is_visible_to(&self, user_id: Option<i64>) -> bool {
        match self.user_id {
            None => true,
            Some(owner) => user_id == Some(owner),
        }
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, patch: AuthenticationPatch) {
        if let Some(auth_type) = patch.auth_type {
            self.auth_type = auth_type;
        }
        if let Some(name) = patch.name {
            self.name = Some(name);
        }
        if let Some(username) = patch.username {
            self.username = Some(username);
        }
        if let Some(password) = patch.password {
            self.password = Some(password);
        }
        if let Some(extra) = patch.extra {
            self.extra = extra;
        }
        if let Some(status) = patch.availability_status {
            self.availability_status = Some(status);
        }
        if let Some(error) = patch.availability_status_error {
            self.availability_status_error = Some(error);
        }
        if let Some(at) = patch.last_checked_at {
            self.last_checked_at = Some(at);
        }
        if let Some(at) = patch.last_available_at {
            self.last_available_at = Some(at);
        }
    }

    /// Event payload for publication; never carries the password
    pub fn to_event(&self) -> AuthenticationEvent {
        AuthenticationEvent {
            id: self.id.clone(),
            tenant_id: self.tenant_id,
            user_id: self.user_id,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            source_id: self.source_id,
            auth_type: self.auth_type.clone(),
            name: self.name.clone(),
            username: self.username.clone(),
            extra: self.extra.clone(),
            availability_status: self.availability_status,
            availability_status_error: self.availability_status_error.clone(),
            last_checked_at: self.last_checked_at,
            last_available_at: self.last_available_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }
}

/// Serializable view of an authentication for change events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthenticationEvent {
    pub id: AuthenticationId,
    pub tenant_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub resource_type: ResourceType,
    pub resource_id: i64,
    pub source_id: i64,
    #[serde(rename = "authtype")]
    pub auth_type: String,
    pub name: Option<String>,
    pub username: Option<String>,
    pub extra: Map<String, Value>,
    pub availability_status: Option<AvailabilityStatus>,
    pub availability_status_error: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_available_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// Input for creating an authentication.
///
/// The owning user is taken from the scope the store is bound to.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAuthentication {
    pub resource_type: ResourceType,
    pub resource_id: i64,
    /// Required for ApplicationAuthentication and for bulk creation
    #[serde(default)]
    pub source_id: Option<i64>,
    #[serde(rename = "authtype")]
    pub auth_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretValue>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl NewAuthentication {
    /// Start a new record for a resource given by its textual type name
    pub fn for_resource(resource_type: &str, resource_id: i64, auth_type: &str) -> Result<Self> {
        Ok(Self::new(resource_type.parse()?, resource_id, auth_type))
    }

    pub fn new(resource_type: ResourceType, resource_id: i64, auth_type: impl Into<String>) -> Self {
        Self {
            resource_type,
            resource_id,
            source_id: None,
            auth_type: auth_type.into(),
            name: None,
            username: None,
            password: None,
            extra: Map::new(),
        }
    }

    pub fn with_source_id(mut self, source_id: i64) -> Self {
        self.source_id = Some(source_id);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretValue::new(password));
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Materialize the record a backend will persist
    pub fn into_record(
        self,
        id: AuthenticationId,
        tenant_id: i64,
        user_id: Option<i64>,
        source_id: i64,
        created_at: DateTime<Utc>,
    ) -> Authentication {
        Authentication {
            id,
            tenant_id,
            user_id,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            source_id,
            auth_type: self.auth_type,
            name: self.name,
            username: self.username,
            password: self.password,
            extra: self.extra,
            availability_status: None,
            availability_status_error: None,
            last_checked_at: None,
            last_available_at: None,
            created_at,
            updated_at: None,
            version: None,
        }
    }
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthenticationPatch {
    #[serde(default, rename = "authtype")]
    pub auth_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretValue>,
    #[serde(default)]
    pub extra: Option<Map<String, Value>>,
    #[serde(default)]
    pub availability_status: Option<AvailabilityStatus>,
    #[serde(default)]
    pub availability_status_error: Option<String>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_available_at: Option<DateTime<Utc>>,
}

impl AuthenticationPatch {
    pub fn is_empty(&self) -> bool {
        self.auth_type.is_none()
            && self.name.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.extra.is_none()
            && self.availability_status.is_none()
            && self.availability_status_error.is_none()
            && self.last_checked_at.is_none()
            && self.last_available_at.is_none()
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretValue::new(password));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user_id: Option<i64>) -> Authentication {
        NewAuthentication::new(ResourceType::Application, 7, "basic")
            .with_username("svc")
            .with_password("p1")
            .into_record(AuthenticationId::from(1), 10, user_id, 3, Utc::now())
    }

    #[test]
    fn test_resource_type_parsing() {
        for rt in ResourceType::ALL {
            assert_eq!(rt.as_str().parse::<ResourceType>().unwrap(), rt);
        }
        let err = "Bogus".parse::<ResourceType>().unwrap_err();
        assert!(matches!(err, AuthStoreError::BadRequest { .. }));
        assert!("source".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_resource_type_serde_uses_exact_names() {
        let json = serde_json::to_string(&ResourceType::ApplicationAuthentication).unwrap();
        assert_eq!(json, "\"ApplicationAuthentication\"");
        assert!(serde_json::from_str::<ResourceType>("\"Bogus\"").is_err());
    }

    #[test]
    fn test_new_authentication_rejects_bogus_type() {
        assert!(NewAuthentication::for_resource("Bogus", 1, "basic").is_err());
        let new = NewAuthentication::for_resource("Endpoint", 4, "basic").unwrap();
        assert_eq!(new.resource_type, ResourceType::Endpoint);
    }

    #[test]
    fn test_identity_parsing() {
        assert_eq!(AuthenticationId::from(42).as_database_id().unwrap(), 42);
        assert!(AuthenticationId::new("not-a-number").as_database_id().is_err());

        let uuid = Uuid::new_v4();
        assert_eq!(AuthenticationId::from(uuid).as_uuid().unwrap(), uuid);
        assert!(AuthenticationId::new("42").as_uuid().is_err());
    }

    #[test]
    fn test_two_tier_visibility() {
        let owned = record(Some(5));
        assert!(owned.is_visible_to(Some(5)));
        assert!(!owned.is_visible_to(Some(6)));
        assert!(!owned.is_visible_to(None));

        let shared = record(None);
        assert!(shared.is_visible_to(None));
        assert!(shared.is_visible_to(Some(6)));
    }

    #[test]
    fn test_apply_patch_only_touches_supplied_fields() {
        let mut auth = record(None);
        auth.apply(AuthenticationPatch::default().with_name("renamed"));

        assert_eq!(auth.name.as_deref(), Some("renamed"));
        assert_eq!(auth.username.as_deref(), Some("svc"));
        assert_eq!(auth.password.as_ref().unwrap().expose(), "p1");
        assert!(AuthenticationPatch::default().is_empty());
    }

    #[test]
    fn test_event_never_contains_password() {
        let event = serde_json::to_value(record(Some(5)).to_event()).unwrap();
        assert!(event.get("password").is_none());
        assert_eq!(event["authtype"], "basic");
        assert_eq!(event["resource_type"], "Application");
        assert!(!event.to_string().contains("p1"));
    }

    #[test]
    fn test_availability_status_parsing() {
        assert_eq!(
            "partially_available".parse::<AvailabilityStatus>().unwrap(),
            AvailabilityStatus::PartiallyAvailable
        );
        assert!("broken".parse::<AvailabilityStatus>().is_err());
    }
}
