//! Serializable handles to component instances and homes.
//!
//! A handle is the persistent form of a proxy: it carries the locator the
//! proxy held when the handle was taken and can be stored and restored later.

use crate::error::{RelayError, Result};
use crate::locator::ComponentLocator;
use serde::{Deserialize, Serialize};

/// Handle to a component instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentHandle {
    locator: ComponentLocator,
}

impl ComponentHandle {
    /// Create a handle for an instance locator. Home locators are rejected.
    pub fn new(locator: ComponentLocator) -> Result<Self> {
        if locator.is_home() {
            return Err(RelayError::WrongComponentKind {
                operation: "get_handle".to_string(),
                target: locator.to_string(),
            });
        }
        Ok(Self { locator })
    }

    pub fn locator(&self) -> &ComponentLocator {
        &self.locator
    }

    pub fn into_locator(self) -> ComponentLocator {
        self.locator
    }

    /// JSON form used when a proxy is passed as a call argument.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Handle to a component home.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HomeHandle {
    locator: ComponentLocator,
}

impl HomeHandle {
    /// Create a handle for a home locator.
    pub fn new(locator: ComponentLocator) -> Result<Self> {
        if !locator.is_home() {
            return Err(RelayError::WrongComponentKind {
                operation: "get_home_handle".to_string(),
                target: locator.to_string(),
            });
        }
        Ok(Self { locator })
    }

    pub fn locator(&self) -> &ComponentLocator {
        &self.locator
    }
}
