//! API tokens, user roles and authorization.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for a token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(Uuid);

impl TokenId {
    /// Generate a new random token ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", self.0)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role carried by a token's user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Full access, including releasing other users' locks.
    #[serde(rename = "admin")]
    Admin,
    /// May create, modify and delete resources.
    #[serde(rename = "operations")]
    Operations,
    /// May only read.
    #[serde(rename = "read-only")]
    ReadOnly,
}

impl Role {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "admin" => Ok(Self::Admin),
            "operations" => Ok(Self::Operations),
            "read-only" => Ok(Self::ReadOnly),
            _ => Err(crate::Error::InvalidRole(s.to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Operations => "operations",
            Self::ReadOnly => "read-only",
        }
    }

    /// Check if this role may perform mutations.
    pub fn can_write(&self) -> bool {
        matches!(self, Self::Admin | Self::Operations)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated token with its owning user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    /// Username the token acts as; this is the lock principal.
    pub username: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Token {
    /// Check if the token is valid (not expired or revoked).
    pub fn is_valid(&self) -> bool {
        let now = OffsetDateTime::now_utc();

        if self.revoked_at.is_some() {
            return false;
        }

        if let Some(expires_at) = self.expires_at
            && now > expires_at
        {
            return false;
        }

        true
    }

    pub fn can_read(&self) -> bool {
        self.is_valid()
    }

    pub fn can_write(&self) -> bool {
        self.is_valid() && self.role.can_write()
    }

    pub fn is_admin(&self) -> bool {
        self.is_valid() && self.role.is_admin()
    }
}

/// Hash a token secret for storage lookup (SHA-256, lowercase hex).
pub fn hash_token(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn token(role: Role) -> Token {
        Token {
            id: TokenId::new(),
            username: "ops".to_string(),
            role,
            expires_at: None,
            revoked_at: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("admin").unwrap(), Role::Admin);
        assert_eq!(Role::parse("operations").unwrap(), Role::Operations);
        assert_eq!(Role::parse("read-only").unwrap(), Role::ReadOnly);
        assert!(Role::parse("root").is_err());
    }

    #[test]
    fn test_role_permissions() {
        assert!(token(Role::Admin).is_admin());
        assert!(token(Role::Operations).can_write());
        assert!(!token(Role::Operations).is_admin());
        assert!(!token(Role::ReadOnly).can_write());
        assert!(token(Role::ReadOnly).can_read());
    }

    #[test]
    fn test_revoked_and_expired_tokens_are_invalid() {
        let mut t = token(Role::Admin);
        t.revoked_at = Some(OffsetDateTime::now_utc());
        assert!(!t.is_valid());
        assert!(!t.is_admin());

        let mut t = token(Role::Admin);
        t.expires_at = Some(OffsetDateTime::now_utc() - Duration::minutes(1));
        assert!(!t.can_read());
    }

    #[test]
    fn test_hash_token_matches_admin_fixture() {
        assert_eq!(
            hash_token("test-admin-token"),
            crate::config::AdminConfig::for_testing().token_hash
        );
    }
}
