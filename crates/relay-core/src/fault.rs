//! Fault kinds and application faults.
//!
//! A `FaultKind` names a failure type together with the names of every kind it
//! extends, so "is this failure compatible with what the method declares" is a
//! plain name lookup.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a failure raised by a remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaultKind {
    name: String,
    /// Every kind this one extends, nearest first.
    ancestors: Vec<String>,
    checked: bool,
}

impl FaultKind {
    pub const IO: &'static str = "io";
    pub const REMOTE: &'static str = "remote";
    pub const SYSTEM: &'static str = "system";

    /// A checked fault kind: it must be declared by the method to pass through.
    pub fn checked(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ancestors: Vec::new(),
            checked: true,
        }
    }

    /// An unchecked fault kind: always passes through to the caller.
    pub fn unchecked(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ancestors: Vec::new(),
            checked: false,
        }
    }

    /// Derive a new kind extending `self`. Checked-ness is inherited.
    pub fn extend(&self, name: impl Into<String>) -> Self {
        let mut ancestors = Vec::with_capacity(self.ancestors.len() + 1);
        ancestors.push(self.name.clone());
        ancestors.extend(self.ancestors.iter().cloned());
        Self {
            name: name.into(),
            ancestors,
            checked: self.checked,
        }
    }

    /// Generic I/O failure.
    pub fn io() -> Self {
        Self::checked(Self::IO)
    }

    /// Generic remote failure; extends [`FaultKind::io`].
    pub fn remote() -> Self {
        Self::io().extend(Self::REMOTE)
    }

    /// System-level failure (transaction inflow and the like).
    pub fn system() -> Self {
        Self::checked(Self::SYSTEM)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// Whether the generic remote kind is this one.
    pub fn is_remote(&self) -> bool {
        self.name == Self::REMOTE
    }

    /// Whether a failure of this kind can be reported as `declared`.
    pub fn is_assignable_to(&self, declared: &FaultKind) -> bool {
        self.name == declared.name || self.ancestors.iter().any(|a| *a == declared.name)
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A failure raised by application code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    kind: FaultKind,
    message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &FaultKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
