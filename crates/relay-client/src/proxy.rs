//! Client proxies and the values that flow through them.

use crate::client_context::ClientContext;
use crate::handler::InvocationHandler;
use crate::invocation::ResponseFuture;
use relay_core::{
    ComponentHandle, ComponentLocator, HomeHandle, MethodDescriptor, PrimaryKey, RelayError,
    Result,
};
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Local stand-in for a remote component.
#[derive(Clone)]
pub struct Proxy {
    handler: Arc<InvocationHandler>,
    context: Arc<ClientContext>,
}

impl Proxy {
    pub fn new(handler: Arc<InvocationHandler>, context: Arc<ClientContext>) -> Self {
        Self { handler, context }
    }

    /// Dispatch `method` with `arguments`.
    pub async fn invoke(
        &self,
        method: &MethodDescriptor,
        arguments: Vec<Argument>,
    ) -> Result<InvocationReturn> {
        self.handler.invoke(self, method, arguments).await
    }

    /// Shorthand for a business call with plain JSON arguments.
    pub async fn call(&self, method: &MethodDescriptor, arguments: Vec<Value>) -> Result<InvocationReturn> {
        let arguments = arguments.into_iter().map(Argument::Value).collect();
        self.invoke(method, arguments).await
    }

    /// The asynchronous twin of this proxy.
    pub fn asynchronous(&self) -> Proxy {
        Proxy::new(self.handler.async_handler(), self.context.clone())
    }

    pub fn handler(&self) -> &Arc<InvocationHandler> {
        &self.handler
    }

    pub fn context(&self) -> &Arc<ClientContext> {
        &self.context
    }

    pub fn locator(&self) -> Arc<ComponentLocator> {
        self.handler.locator()
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        *self.handler == *other.handler
    }
}

impl Eq for Proxy {}

impl Hash for Proxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handler.hash(state);
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.handler, f)
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Proxy").field(&self.handler).finish()
    }
}

/// A call argument.
#[derive(Debug, Clone)]
pub enum Argument {
    Value(Value),
    /// Sent as the proxy's serialized [`ComponentHandle`].
    Proxy(Proxy),
}

impl Argument {
    pub fn into_value(self) -> Result<Value> {
        match self {
            Argument::Value(value) => Ok(value),
            Argument::Proxy(proxy) => {
                ComponentHandle::new(ComponentLocator::clone(&proxy.locator()))?.to_value()
            }
        }
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument::Value(value)
    }
}

impl From<Proxy> for Argument {
    fn from(proxy: Proxy) -> Self {
        Argument::Proxy(proxy)
    }
}

/// What a dispatched call produced.
#[derive(Debug)]
pub enum InvocationReturn {
    Value(Value),
    Bool(bool),
    Hash(u64),
    Text(String),
    PrimaryKey(PrimaryKey),
    Handle(ComponentHandle),
    HomeHandle(HomeHandle),
    Future(ResponseFuture),
    Unit,
}

impl InvocationReturn {
    /// The returned value, if the call produced one directly.
    pub fn into_value(self) -> Result<Value> {
        match self {
            InvocationReturn::Value(value) => Ok(value),
            InvocationReturn::Bool(b) => Ok(Value::Bool(b)),
            InvocationReturn::Hash(h) => Ok(Value::from(h)),
            InvocationReturn::Text(text) => Ok(Value::String(text)),
            InvocationReturn::PrimaryKey(key) => Ok(Value::String(key.as_str().to_string())),
            InvocationReturn::Handle(handle) => handle.to_value(),
            InvocationReturn::HomeHandle(handle) => Ok(serde_json::to_value(handle)?),
            InvocationReturn::Unit => Ok(Value::Null),
            InvocationReturn::Future(_) => Err(RelayError::Other(
                "Call returned a future, not a value".to_string(),
            )),
        }
    }

    pub fn into_future(self) -> Option<ResponseFuture> {
        match self {
            InvocationReturn::Future(future) => Some(future),
            _ => None,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, InvocationReturn::Unit)
    }
}
