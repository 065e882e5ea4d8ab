//! Component locators.
//!
//! A locator is an immutable value: identity of a remote component plus its
//! current affinity and, for stateful components, its session. Changing any of
//! those produces a new locator.

use crate::affinity::Affinity;
use crate::error::{RelayError, Result};
use crate::identifier::{ComponentIdentifier, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the interface a proxy exposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewType(String);

impl ViewType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, already-serialized primary key of an entity component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimaryKey(String);

impl PrimaryKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What sort of component a locator addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocatorKind {
    Stateless,
    Stateful { session: SessionId },
    Entity { primary_key: PrimaryKey },
    Home,
}

/// Identity and routing state of a remote component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentLocator {
    view_type: ViewType,
    identifier: ComponentIdentifier,
    affinity: Affinity,
    kind: LocatorKind,
}

impl ComponentLocator {
    /// Locator for a stateless component.
    pub fn stateless(view_type: ViewType, identifier: ComponentIdentifier, affinity: Affinity) -> Self {
        Self {
            view_type,
            identifier,
            affinity,
            kind: LocatorKind::Stateless,
        }
    }

    /// Locator for an existing session on a stateful component.
    pub fn stateful(
        view_type: ViewType,
        identifier: ComponentIdentifier,
        affinity: Affinity,
        session: SessionId,
    ) -> Self {
        Self {
            view_type,
            identifier,
            affinity,
            kind: LocatorKind::Stateful { session },
        }
    }

    /// Locator for an entity instance.
    pub fn entity(
        view_type: ViewType,
        identifier: ComponentIdentifier,
        affinity: Affinity,
        primary_key: PrimaryKey,
    ) -> Self {
        Self {
            view_type,
            identifier,
            affinity,
            kind: LocatorKind::Entity { primary_key },
        }
    }

    /// Locator for a component home.
    pub fn home(view_type: ViewType, identifier: ComponentIdentifier, affinity: Affinity) -> Self {
        Self {
            view_type,
            identifier,
            affinity,
            kind: LocatorKind::Home,
        }
    }

    pub fn view_type(&self) -> &ViewType {
        &self.view_type
    }

    pub fn identifier(&self) -> &ComponentIdentifier {
        &self.identifier
    }

    pub fn affinity(&self) -> &Affinity {
        &self.affinity
    }

    pub fn kind(&self) -> &LocatorKind {
        &self.kind
    }

    /// Copy of this locator routed to a different affinity.
    pub fn with_new_affinity(&self, affinity: Affinity) -> Self {
        Self {
            affinity,
            ..self.clone()
        }
    }

    /// Copy of this locator bound to a session.
    ///
    /// Binding the session a stateful locator already carries returns an equal
    /// locator; any other session on a stateful locator is a conflict.
    pub fn with_session(&self, session: SessionId) -> Result<Self> {
        match &self.kind {
            LocatorKind::Stateless => Ok(Self {
                kind: LocatorKind::Stateful { session },
                ..self.clone()
            }),
            LocatorKind::Stateful { session: existing } if *existing == session => Ok(self.clone()),
            LocatorKind::Stateful { session: existing } => Err(RelayError::AlreadyStateful {
                existing: existing.clone(),
            }),
            LocatorKind::Entity { .. } | LocatorKind::Home => Err(RelayError::WrongComponentKind {
                operation: "with_session".to_string(),
                target: self.to_string(),
            }),
        }
    }

    pub fn is_stateful(&self) -> bool {
        matches!(self.kind, LocatorKind::Stateful { .. })
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        match &self.kind {
            LocatorKind::Stateful { session } => Some(session),
            _ => None,
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.kind, LocatorKind::Entity { .. })
    }

    pub fn is_home(&self) -> bool {
        matches!(self.kind, LocatorKind::Home)
    }

    /// The primary key of an entity locator.
    pub fn primary_key(&self) -> Result<&PrimaryKey> {
        match &self.kind {
            LocatorKind::Entity { primary_key } => Ok(primary_key),
            _ => Err(RelayError::WrongComponentKind {
                operation: "get_primary_key".to_string(),
                target: self.to_string(),
            }),
        }
    }
}

impl fmt::Display for ComponentLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} for \"{}\", view is {}, affinity is {}",
            match self.kind {
                LocatorKind::Stateless => "Stateless locator",
                LocatorKind::Stateful { .. } => "Stateful locator",
                LocatorKind::Entity { .. } => "Entity locator",
                LocatorKind::Home => "Home locator",
            },
            self.identifier,
            self.view_type,
            self.affinity
        )?;
        match &self.kind {
            LocatorKind::Stateful { session } => write!(f, ", session is {}", session),
            LocatorKind::Entity { primary_key } => write!(f, ", key is {}", primary_key.as_str()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teller() -> ComponentLocator {
        ComponentLocator::stateless(
            ViewType::new("bank.Teller"),
            ComponentIdentifier::new("bank", "accounts", "Teller", "").unwrap(),
            Affinity::None,
        )
    }

    #[test]
    fn test_with_new_affinity_keeps_identity() {
        let locator = teller();
        let moved = locator.with_new_affinity(Affinity::node("alpha"));

        assert_eq!(moved.affinity(), &Affinity::node("alpha"));
        assert_eq!(moved.identifier(), locator.identifier());
        assert_ne!(moved, locator);
    }

    #[test]
    fn test_with_session_transitions() {
        let session = SessionId::from_bytes(vec![1]);
        let stateful = teller().with_session(session.clone()).unwrap();
        assert!(stateful.is_stateful());
        assert_eq!(stateful.session_id(), Some(&session));

        // Same session is a no-op
        assert_eq!(stateful.with_session(session.clone()).unwrap(), stateful);

        // Different session conflicts
        let err = stateful
            .with_session(SessionId::from_bytes(vec![2]))
            .unwrap_err();
        assert!(matches!(err, RelayError::AlreadyStateful { existing } if existing == session));
    }

    #[test]
    fn test_primary_key_only_on_entities() {
        assert!(matches!(
            teller().primary_key(),
            Err(RelayError::WrongComponentKind { .. })
        ));

        let entity = ComponentLocator::entity(
            ViewType::new("bank.Account"),
            ComponentIdentifier::new("bank", "accounts", "Account", "").unwrap(),
            Affinity::None,
            PrimaryKey::new("42"),
        );
        assert_eq!(entity.primary_key().unwrap().as_str(), "42");
        assert!(entity.with_session(SessionId::random()).is_err());
    }

    #[test]
    fn test_display() {
        let locator = teller().with_new_affinity(Affinity::node("alpha"));
        assert_eq!(
            locator.to_string(),
            "Stateless locator for \"bank/accounts/Teller\", view is bank.Teller, affinity is node:alpha"
        );
    }
}
