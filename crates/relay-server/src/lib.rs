//! Relay Server - the server side of remote component invocation.
//!
//! Transports implement the [`ServerRequest`] contract (plus
//! [`InvocationRequest`] or [`SessionOpenRequest`]); a [`Deployment`] runs the
//! same invocation logic over any of them. [`LoopbackReceiver`] is an
//! in-process transport that connects a deployment directly to client proxies.
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_server::{Deployment, LoopbackReceiver};
//!
//! let deployment = Deployment::builder("node-a")
//!     .component(identifier, Arc::new(Teller::default()))
//!     .build();
//! registry.register_node(Arc::new(LoopbackReceiver::new(deployment))).await;
//! ```

pub mod deployment;
pub mod loopback;
pub mod request;
pub mod transaction;

pub use deployment::{Component, ComponentCall, ComponentKind, Deployment, DeploymentBuilder};
pub use loopback::{LoopbackReceiver, LoopbackRequest};
pub use request::{InvocationRequest, ServerRequest, SessionOpenRequest};
pub use transaction::{
    InflowGuard, LocalTransactionCoordinator, Transaction, TransactionCoordinator,
    TransactionStatus,
};
