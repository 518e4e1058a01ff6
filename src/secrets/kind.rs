use crate::errors::AuthStoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Secret store governing every credential of a deployment.
///
/// Chosen once at startup; never switched per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretStoreKind {
    /// Relational table with an encrypted password column
    Database,
    /// Vault KV v2
    Vault,
    /// Relational table holding references into an external secrets service
    SecretsManager,
    /// No secret store; every operation is rejected
    None,
}

impl SecretStoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Vault => "vault",
            Self::SecretsManager => "secrets-manager",
            Self::None => "none",
        }
    }
}

impl FromStr for SecretStoreKind {
    type Err = AuthStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" => Ok(Self::Database),
            "vault" => Ok(Self::Vault),
            "secrets-manager" | "secrets_manager" => Ok(Self::SecretsManager),
            "none" | "" => Ok(Self::None),
            other => Err(AuthStoreError::bad_request(format!(
                "unknown secret store '{}', expected database, vault, secrets-manager or none",
                other
            ))),
        }
    }
}

impl fmt::Display for SecretStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for kind in [
            SecretStoreKind::Database,
            SecretStoreKind::Vault,
            SecretStoreKind::SecretsManager,
            SecretStoreKind::None,
        ] {
            assert_eq!(kind.as_str().parse::<SecretStoreKind>().unwrap(), kind);
        }
        assert_eq!("VAULT".parse::<SecretStoreKind>().unwrap(), SecretStoreKind::Vault);
        assert!("redis".parse::<SecretStoreKind>().is_err());
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let json = serde_json::to_string(&SecretStoreKind::SecretsManager).unwrap();
        assert_eq!(json, "\"secrets-manager\"");
    }
}
