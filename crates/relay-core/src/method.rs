//! Precomputed method descriptors for proxy methods.
//!
//! The dispatcher never looks at method names to decide what to do; it trusts
//! the `MethodKind` attached by whoever built the descriptor table.

use crate::fault::FaultKind;
use serde::{Deserialize, Serialize};

/// Classification of a proxy method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    Equals,
    IsIdentical,
    HashCode,
    ToString,
    GetPrimaryKey,
    GetHandle,
    GetHomeHandle,
    Business,
}

impl MethodKind {
    /// Whether calls of this kind are answered without touching the network.
    pub fn is_local(&self) -> bool {
        !matches!(self, MethodKind::Business)
    }
}

/// Declared return shape of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnShape {
    /// An ordinary value.
    #[default]
    Value,
    /// A future of the value.
    Future,
    /// Nothing.
    Unit,
}

/// Everything the dispatcher needs to know about a proxy method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    name: String,
    kind: MethodKind,
    return_shape: ReturnShape,
    declared_faults: Vec<FaultKind>,
    client_async: bool,
}

impl MethodDescriptor {
    /// A business method returning a value and declaring no faults.
    pub fn business(name: impl Into<String>) -> Self {
        Self::with_kind(name, MethodKind::Business)
    }

    /// A descriptor of the given kind.
    pub fn with_kind(name: impl Into<String>, kind: MethodKind) -> Self {
        Self {
            name: name.into(),
            kind,
            return_shape: ReturnShape::Value,
            declared_faults: Vec::new(),
            client_async: false,
        }
    }

    /// Set the declared return shape.
    pub fn returning(mut self, shape: ReturnShape) -> Self {
        self.return_shape = shape;
        self
    }

    /// Add a declared checked fault kind.
    pub fn declaring(mut self, fault: FaultKind) -> Self {
        self.declared_faults.push(fault);
        self
    }

    /// Mark the method as asynchronous on the client side.
    pub fn client_async(mut self, client_async: bool) -> Self {
        self.client_async = client_async;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn return_shape(&self) -> ReturnShape {
        self.return_shape
    }

    pub fn declared_faults(&self) -> &[FaultKind] {
        &self.declared_faults
    }

    pub fn is_client_async(&self) -> bool {
        self.client_async
    }
}
