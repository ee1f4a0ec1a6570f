//! Opaque identity value types: protected objects and principals

use std::fmt;

use crate::error::{AclError, Result};

/// Separator between the type qualifier and the username in a serialized
/// user identity.
pub const SID_SEPARATOR: char = '-';

/// Reference to one protected object instance: a type name plus a string
/// identifier. Stable equality; the store resolves it to a persisted row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectIdentityRef {
    kind: String,
    identifier: String,
}

impl ObjectIdentityRef {
    pub fn new(kind: impl Into<String>, identifier: impl Into<String>) -> Self {
        ObjectIdentityRef {
            kind: kind.into(),
            identifier: identifier.into(),
        }
    }

    /// The protected-object type name
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The object's string identifier within its type
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl fmt::Display for ObjectIdentityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.identifier)
    }
}

/// A principal: either a role or a user qualified by its provider type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    /// An opaque role string, stored verbatim
    Role(String),
    /// A user, qualified by the type that can load it
    User { kind: String, username: String },
}

impl Principal {
    pub fn role(name: impl Into<String>) -> Self {
        Principal::Role(name.into())
    }

    pub fn user(kind: impl Into<String>, username: impl Into<String>) -> Self {
        Principal::User {
            kind: kind.into(),
            username: username.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Principal::User { .. })
    }

    /// The identifier persisted in the security-identity table: the bare
    /// role string, or `<kind>-<username>` for users.
    pub fn identifier(&self) -> String {
        match self {
            Principal::Role(name) => name.clone(),
            Principal::User { kind, username } => {
                format!("{}{}{}", kind, SID_SEPARATOR, username)
            }
        }
    }

    /// Recover a principal from a stored identifier.
    ///
    /// User identifiers split at the first separator: type qualifiers never
    /// contain one, usernames may (`app::auth::User-some-user@example.com`).
    pub fn parse(identifier: &str, is_user: bool) -> Result<Self> {
        if !is_user {
            return Ok(Principal::Role(identifier.to_string()));
        }
        match identifier.split_once(SID_SEPARATOR) {
            Some((kind, username)) if !kind.is_empty() && !username.is_empty() => {
                Ok(Principal::user(kind, username))
            }
            _ => Err(AclError::InvalidArgument(format!(
                "malformed user identifier {:?}",
                identifier
            ))),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        let sid = Principal::role("ROLE_ADMIN");
        assert_eq!(sid.identifier(), "ROLE_ADMIN");
        assert_eq!(Principal::parse("ROLE_ADMIN", false).unwrap(), sid);
    }

    #[test]
    fn role_with_separator_stays_verbatim() {
        let sid = Principal::parse("IS_AUTHENTICATED-ANONYMOUSLY", false).unwrap();
        assert_eq!(sid, Principal::role("IS_AUTHENTICATED-ANONYMOUSLY"));
    }

    #[test]
    fn user_round_trip_with_separator_in_username() {
        let sid = Principal::user("app::auth::User", "some-user@example.com");
        let identifier = sid.identifier();
        assert_eq!(identifier, "app::auth::User-some-user@example.com");
        let parsed = Principal::parse(&identifier, true).unwrap();
        assert_eq!(parsed, sid);
    }

    #[test]
    fn user_without_separator_is_rejected() {
        assert!(matches!(
            Principal::parse("invalidIdentifier", true),
            Err(AclError::InvalidArgument(_))
        ));
    }

    #[test]
    fn user_with_empty_username_is_rejected() {
        assert!(matches!(
            Principal::parse("app::auth::User-", true),
            Err(AclError::InvalidArgument(_))
        ));
    }
}
