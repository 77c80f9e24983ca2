//! Branded ID newtypes.
//!
//! Session identifiers are supplied by clients and stay plain strings. IDs the
//! server mints itself (connections) are UUID v7 newtypes so they cannot be
//! confused with a session key.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one attached client connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a new time-ordered connection ID (`client_<uuid v7>`).
    #[must_use]
    pub fn new() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }

    /// Create from an existing string value.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn new_ids_carry_client_prefix() {
        let id = ConnectionId::new();
        assert!(id.as_str().starts_with("client_"));
    }

    #[test]
    fn display_matches_inner() {
        let id = ConnectionId::from("client_abc");
        assert_eq!(id.to_string(), "client_abc");
    }

    #[test]
    fn serializes_transparently() {
        let id = ConnectionId::from_string("client_1".into());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"client_1\"");
    }
}
