//! Key layout inside the KV v2 mount.
//!
//! Values live at `{mount}/data/{tenant}/{ResourceType}_{ResourceID}_{uuid}` and
//! are removed through the matching `{mount}/metadata/...` path. There is no
//! secondary index: every lookup starts from the tenant listing.

use crate::domain::{Authentication, ResourceType};
use crate::errors::DecodeError;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecretPath {
    pub tenant_id: i64,
    pub resource_type: ResourceType,
    pub resource_id: i64,
    pub uuid: Uuid,
}

impl SecretPath {
    /// Fresh identity for a new record
    pub fn generate(tenant_id: i64, resource_type: ResourceType, resource_id: i64) -> Self {
        Self { tenant_id, resource_type, resource_id, uuid: Uuid::new_v4() }
    }

    /// Location of an already stored record
    pub fn for_record(record: &Authentication) -> Result<Self, DecodeError> {
        let uuid = Uuid::parse_str(record.id.as_str()).map_err(|e| DecodeError::InvalidValue {
            field: "id".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            tenant_id: record.tenant_id,
            resource_type: record.resource_type,
            resource_id: record.resource_id,
            uuid,
        })
    }

    /// Final path segment, `{ResourceType}_{ResourceID}_{uuid}`
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.resource_type, self.resource_id, self.uuid)
    }

    pub fn data_path(&self, mount: &str) -> String {
        format!("{}/data/{}/{}", mount, self.tenant_id, self.key())
    }

    pub fn metadata_path(&self, mount: &str) -> String {
        format!("{}/metadata/{}/{}", mount, self.tenant_id, self.key())
    }

    /// Listing prefix holding every key of a tenant
    pub fn tenant_prefix(mount: &str, tenant_id: i64) -> String {
        format!("{}/metadata/{}/", mount, tenant_id)
    }

    pub fn belongs_to(&self, resource_type: ResourceType, resource_id: i64) -> bool {
        self.resource_type == resource_type && self.resource_id == resource_id
    }

    /// Parse a listed key under `tenant_id`
    pub fn parse_key(tenant_id: i64, key: &str) -> Result<Self, DecodeError> {
        let invalid = |reason: &str| DecodeError::InvalidValue {
            field: "key".to_string(),
            reason: format!("{} in '{}'", reason, key),
        };

        // Resource type names never contain '_', the uuid never does either
        let mut parts = key.rsplitn(3, '_');
        let (Some(uuid), Some(resource_id), Some(resource_type)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected ResourceType_ResourceID_uuid"));
        };

        Ok(Self {
            tenant_id,
            resource_type: resource_type
                .parse::<ResourceType>()
                .map_err(|_| invalid("unknown resource type"))?,
            resource_id: resource_id.parse::<i64>().map_err(|_| invalid("non-numeric resource id"))?,
            uuid: Uuid::parse_str(uuid).map_err(|_| invalid("invalid uuid"))?,
        })
    }

    /// Parse a full data or metadata path such as `secret/data/7/Source_3_<uuid>`
    pub fn parse_full(path: &str) -> Result<Self, DecodeError> {
        let invalid = || DecodeError::InvalidValue {
            field: "path".to_string(),
            reason: format!("'{}' is not a tenant secret path", path),
        };

        let mut segments = path.trim_end_matches('/').rsplitn(3, '/');
        let (Some(key), Some(tenant), Some(rest)) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(invalid());
        };
        if !(rest.ends_with("/data") || rest.ends_with("/metadata")) {
            return Err(invalid());
        }

        let tenant_id = tenant.parse::<i64>().map_err(|_| invalid())?;
        Self::parse_key(tenant_id, key)
    }
}

impl fmt::Display for SecretPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let uuid = Uuid::parse_str("6f9619ff-8b86-d011-b42d-00cf4fc964ff").unwrap();
        let path = SecretPath {
            tenant_id: 4,
            resource_type: ResourceType::Application,
            resource_id: 7,
            uuid,
        };

        assert_eq!(path.key(), "Application_7_6f9619ff-8b86-d011-b42d-00cf4fc964ff");
        assert_eq!(
            path.data_path("secret"),
            "secret/data/4/Application_7_6f9619ff-8b86-d011-b42d-00cf4fc964ff"
        );
        assert_eq!(
            path.metadata_path("kv"),
            "kv/metadata/4/Application_7_6f9619ff-8b86-d011-b42d-00cf4fc964ff"
        );
        assert_eq!(SecretPath::tenant_prefix("secret", 4), "secret/metadata/4/");
        assert!(path.belongs_to(ResourceType::Application, 7));
        assert!(!path.belongs_to(ResourceType::Endpoint, 7));
    }

    #[test]
    fn test_parse_key() {
        let path = SecretPath::generate(2, ResourceType::ApplicationAuthentication, 19);
        assert_eq!(SecretPath::parse_key(2, &path.key()).unwrap(), path);

        assert!(SecretPath::parse_key(2, "Source_x_6f9619ff-8b86-d011-b42d-00cf4fc964ff").is_err());
        assert!(SecretPath::parse_key(2, "Bogus_1_6f9619ff-8b86-d011-b42d-00cf4fc964ff").is_err());
        assert!(SecretPath::parse_key(2, "Source_1_not-a-uuid").is_err());
        assert!(SecretPath::parse_key(2, "nounderscores").is_err());
    }

    #[test]
    fn test_parse_full() {
        let path = SecretPath::generate(9, ResourceType::Endpoint, 1);
        assert_eq!(SecretPath::parse_full(&path.data_path("secret")).unwrap(), path);
        assert_eq!(SecretPath::parse_full(&path.metadata_path("a/b")).unwrap(), path);

        assert!(SecretPath::parse_full(&path.key()).is_err());
        assert!(SecretPath::parse_full("secret/other/9/Endpoint_1_x").is_err());
    }
}
