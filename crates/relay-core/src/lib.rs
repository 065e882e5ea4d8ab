//! Relay Core - shared value types for remote component invocation.
//!
//! This crate holds the pieces both sides of a relay connection agree on:
//! component identifiers and locators, affinities, session and transaction
//! ids, method descriptors, fault kinds, and the common error type.
//!
//! Client-side dispatch lives in `relay-client`; the server request contract
//! lives in `relay-server`.
//!
//! # Example
//!
//! ```
//! use relay_core::{Affinity, ComponentIdentifier, ComponentLocator, SessionId, ViewType};
//!
//! let identifier = ComponentIdentifier::new("bank", "accounts", "Teller", "")?;
//! let locator = ComponentLocator::stateless(ViewType::new("bank.Teller"), identifier, Affinity::None);
//!
//! let session = SessionId::random();
//! let stateful = locator.with_session(session.clone())?;
//! assert_eq!(stateful.session_id(), Some(&session));
//! # Ok::<(), relay_core::RelayError>(())
//! ```

pub mod affinity;
pub mod config;
pub mod error;
pub mod fault;
pub mod handle;
pub mod identifier;
pub mod locator;
pub mod method;

pub use affinity::Affinity;
pub use config::{InvocationConfig, InvocationTimeout, ServerConfig};
pub use error::{RelayError, Result};
pub use fault::{Fault, FaultKind};
pub use handle::{ComponentHandle, HomeHandle};
pub use identifier::{ComponentIdentifier, SessionId, TransactionId};
pub use locator::{ComponentLocator, LocatorKind, PrimaryKey, ViewType};
pub use method::{MethodDescriptor, MethodKind, ReturnShape};
