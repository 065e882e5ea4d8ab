//! Relay Client - invocation dispatch for remote component proxies.
//!
//! Every [`Proxy`] is backed by an [`InvocationHandler`] that tracks where the
//! component lives (its locator, strong affinity and session) and where calls
//! recently landed (weak affinity). Business calls are resolved to an endpoint
//! by a [`LocatedActionRunner`], carried by an [`InvocationContext`], and
//! either awaited or handed back as futures depending on the handler's mode
//! and the method's return shape.
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_client::{ClientContext, ReceiverRegistry};
//! use relay_core::MethodDescriptor;
//!
//! let registry = Arc::new(ReceiverRegistry::new());
//! registry.register_node(receiver).await;
//!
//! let context = ClientContext::builder(registry).build();
//! let proxy = context.create_proxy(locator);
//! let balance = proxy
//!     .call(&MethodDescriptor::business("balance"), vec![])
//!     .await?
//!     .into_value()?;
//! ```

pub mod client_context;
pub mod future_slot;
pub mod handler;
pub mod invocation;
pub mod proxy;
pub mod registry;
pub mod runner;
pub mod sticky;
pub mod translate;

pub use client_context::{ClientContext, ClientContextBuilder, TransactionSource};
pub use future_slot::take_future_result;
pub use handler::{DispatchMode, HandlerSeed, InvocationHandler};
pub use invocation::{
    BlockingCaller, Invocation, InvocationContext, InvocationReceiver, Outcome, Reply,
    ResponseFuture, ResponseSink,
};
pub use proxy::{Argument, InvocationReturn, Proxy};
pub use registry::ReceiverRegistry;
pub use runner::{LocatedAction, LocatedActionRunner, ResolvedTarget};
pub use sticky::{AuthConfig, CredentialSource, DefaultCredentials, Sticky, TlsContext};
pub use translate::translate_failure;
