//! Component, session and transaction identifiers.

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies a deployed component: `app/module/distinct/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentIdentifier {
    app_name: String,
    module_name: String,
    distinct_name: String,
    name: String,
}

impl ComponentIdentifier {
    /// Create a new identifier.
    ///
    /// `module_name` and `name` are required; the application and distinct
    /// names may be empty.
    pub fn new(
        app_name: impl Into<String>,
        module_name: impl Into<String>,
        name: impl Into<String>,
        distinct_name: impl Into<String>,
    ) -> Result<Self> {
        let module_name = module_name.into();
        let name = name.into();
        if module_name.is_empty() {
            return Err(RelayError::MissingArgument { name: "module_name" });
        }
        if name.is_empty() {
            return Err(RelayError::MissingArgument { name: "name" });
        }
        Ok(Self {
            app_name: app_name.into(),
            module_name,
            distinct_name: distinct_name.into(),
            name,
        })
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn distinct_name(&self) -> &str {
        &self.distinct_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ComponentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.app_name.is_empty() {
            write!(f, "{}/", self.app_name)?;
        }
        write!(f, "{}/", self.module_name)?;
        if !self.distinct_name.is_empty() {
            write!(f, "{}/", self.distinct_name)?;
        }
        f.write_str(&self.name)
    }
}

/// Identifies one stateful conversation with a component instance.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Vec<u8>);

impl SessionId {
    /// Generate a fresh random session id.
    pub fn random() -> Self {
        Self(Uuid::new_v4().as_bytes().to_vec())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self)
    }
}

/// Resolvable handle to a transaction propagated with an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_display() {
        let id = ComponentIdentifier::new("bank", "accounts", "Teller", "").unwrap();
        assert_eq!(id.to_string(), "bank/accounts/Teller");

        let id = ComponentIdentifier::new("", "accounts", "Teller", "blue").unwrap();
        assert_eq!(id.to_string(), "accounts/blue/Teller");
    }

    #[test]
    fn test_identifier_requires_module_and_name() {
        assert!(matches!(
            ComponentIdentifier::new("bank", "", "Teller", ""),
            Err(RelayError::MissingArgument { name: "module_name" })
        ));
        assert!(matches!(
            ComponentIdentifier::new("bank", "accounts", "", ""),
            Err(RelayError::MissingArgument { name: "name" })
        ));
    }

    #[test]
    fn test_session_id_hex() {
        let id = SessionId::from_bytes(vec![0xde, 0xad, 0x01]);
        assert_eq!(id.to_string(), "dead01");
        assert_eq!(format!("{:?}", id), "SessionId(dead01)");
    }

    #[test]
    fn test_random_session_ids_differ() {
        assert_ne!(SessionId::random(), SessionId::random());
        assert_eq!(SessionId::random().as_bytes().len(), 16);
    }
}
