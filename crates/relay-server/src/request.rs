//! The contract a transport's request object fulfils for server-side logic.
//!
//! Invocation logic in [`Deployment`](crate::deployment::Deployment) only
//! ever talks to requests through these traits, so it runs unchanged over
//! any transport that implements them.
//!
//! The `write_*` operations are terminal: once one has been called the
//! request is finished and must not be reused. This is caller discipline,
//! not something the traits enforce.

use crate::transaction::Transaction;
use relay_core::{Affinity, ComponentIdentifier, MethodDescriptor, RelayError, Result, SessionId};
use serde_json::Value;
use std::net::SocketAddr;

/// Obligations common to every server request.
pub trait ServerRequest: Send + Sync {
    /// Executor on which the request's work runs.
    fn request_executor(&self) -> tokio::runtime::Handle;

    fn peer_address(&self) -> Option<SocketAddr> {
        None
    }

    fn local_address(&self) -> Option<SocketAddr> {
        None
    }

    /// Name of the transport protocol.
    fn protocol(&self) -> &str;

    /// The client's routing hint, if the transport carries one.
    fn weak_affinity(&self) -> Affinity {
        Affinity::None
    }

    /// Check this before [`transaction`](Self::transaction) to skip needless inflow work.
    fn has_transaction(&self) -> bool;

    /// Inflow the request's transaction. May be called at most once.
    ///
    /// A second call fails with [`RelayError::TransactionAlreadyInflowed`].
    /// If inflow itself fails the invocation must be abandoned.
    fn transaction(&self) -> Result<Option<Transaction>>;

    /// Whether the client is blocked waiting for this request.
    fn is_blocking_caller(&self) -> bool;

    fn component_identifier(&self) -> &ComponentIdentifier;

    fn write_exception(&self, error: RelayError);

    fn write_no_such_component(&self);

    fn write_cancel_response(&self);

    fn write_not_stateful(&self);

    /// Turn a stateless invocation into a stateful one.
    ///
    /// Fails if the invocation is already stateful, if the target is not a
    /// stateful component, or if a different session was committed earlier in
    /// this request.
    fn convert_to_stateful(&self, session: SessionId) -> Result<()>;
}

/// A request to invoke a method on a component.
pub trait InvocationRequest: ServerRequest {
    fn method(&self) -> &MethodDescriptor;

    fn arguments(&self) -> &[Value];

    /// Session the invocation runs in, including one committed by
    /// [`convert_to_stateful`](ServerRequest::convert_to_stateful).
    fn session_id(&self) -> Option<SessionId>;

    fn attachment(&self, _key: &str) -> Option<Value> {
        None
    }

    fn write_result(&self, value: Value);

    /// Release a blocked caller; the result follows later.
    fn write_proceed_async(&self);

    fn write_no_such_method(&self);

    /// Tell the client to commit a new strong affinity.
    fn update_strong_affinity(&self, affinity: Affinity);
}

/// A request to open a session on a stateful component.
pub trait SessionOpenRequest: ServerRequest {
    fn write_session_opened(&self, session: SessionId);
}
