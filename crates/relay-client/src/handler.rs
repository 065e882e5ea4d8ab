//! Client-side invocation dispatch.
//!
//! An [`InvocationHandler`] sits behind every proxy. It owns the proxy's
//! locator, held in a lock-free slot that is swapped (never mutated) on every
//! strong-affinity or session change, plus the advisory weak affinity and the
//! sticky per-proxy configuration.
//!
//! Identity-style calls (equality, hashing, string form, handles) are answered
//! locally. Business calls are located through the context's
//! [`LocatedActionRunner`](crate::runner::LocatedActionRunner), sent through an
//! [`InvocationContext`], and then either awaited (synchronous handlers) or
//! handed back as a future according to the method's return shape.

use crate::client_context::ClientContext;
use crate::future_slot::set_future_result;
use crate::invocation::{BlockingCaller, Invocation, InvocationContext, Outcome, ResponseFuture};
use crate::proxy::{Argument, InvocationReturn, Proxy};
use crate::runner::{LocatedAction, ResolvedTarget};
use crate::sticky::{AuthConfig, Sticky, TlsContext};
use crate::translate::translate_failure;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use relay_core::{
    Affinity, ComponentHandle, ComponentLocator, HomeHandle, InvocationConfig, InvocationTimeout,
    MethodDescriptor, MethodKind, RelayError, Result, ReturnShape, SessionId,
};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Whether a handler waits for results or hands back futures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchMode {
    Synchronous,
    Asynchronous,
}

/// The fields a new handler starts from.
#[derive(Debug, Clone)]
pub struct HandlerSeed {
    locator: ComponentLocator,
    authentication: Sticky<AuthConfig>,
    tls: Sticky<TlsContext>,
    invocation_timeout: InvocationTimeout,
    attachments: HashMap<String, Value>,
    mode: DispatchMode,
}

impl HandlerSeed {
    /// A synchronous seed with dynamic credentials and no attachments.
    pub fn new(locator: ComponentLocator) -> Self {
        Self {
            locator,
            authentication: Sticky::Dynamic,
            tls: Sticky::Dynamic,
            invocation_timeout: InvocationTimeout::Global,
            attachments: HashMap::new(),
            mode: DispatchMode::Synchronous,
        }
    }

    pub fn authentication(mut self, authentication: Sticky<AuthConfig>) -> Self {
        self.authentication = authentication;
        self
    }

    pub fn tls(mut self, tls: Sticky<TlsContext>) -> Self {
        self.tls = tls;
        self
    }

    pub fn invocation_timeout(mut self, timeout: InvocationTimeout) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    pub fn attachments(mut self, attachments: HashMap<String, Value>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Dispatcher behind a proxy.
pub struct InvocationHandler {
    mode: DispatchMode,
    locator: ArcSwap<ComponentLocator>,
    weak_affinity: ArcSwap<Affinity>,
    invocation_timeout: ArcSwap<InvocationTimeout>,
    authentication: ArcSwap<Sticky<AuthConfig>>,
    tls: ArcSwap<Sticky<TlsContext>>,
    attachments: ArcSwap<HashMap<String, Value>>,
    description: OnceLock<String>,
}

impl InvocationHandler {
    /// Create a synchronous handler.
    pub fn new(
        locator: ComponentLocator,
        authentication: Sticky<AuthConfig>,
        tls: Sticky<TlsContext>,
    ) -> Self {
        Self::from_seed(HandlerSeed::new(locator).authentication(authentication).tls(tls))
    }

    /// Create a handler from an explicit seed.
    ///
    /// A stateful locator seeds the weak affinity with its own affinity, since
    /// the session lives where it was created.
    pub fn from_seed(seed: HandlerSeed) -> Self {
        let weak_affinity = if seed.locator.is_stateful() {
            seed.locator.affinity().clone()
        } else {
            Affinity::None
        };

        Self {
            mode: seed.mode,
            locator: ArcSwap::from_pointee(seed.locator),
            weak_affinity: ArcSwap::from_pointee(weak_affinity),
            invocation_timeout: ArcSwap::from_pointee(seed.invocation_timeout),
            authentication: ArcSwap::from_pointee(seed.authentication),
            tls: ArcSwap::from_pointee(seed.tls),
            attachments: ArcSwap::from_pointee(seed.attachments),
            description: OnceLock::new(),
        }
    }

    /// Dispatch a proxy method call.
    pub async fn invoke(
        self: &Arc<Self>,
        proxy: &Proxy,
        method: &MethodDescriptor,
        arguments: Vec<Argument>,
    ) -> Result<InvocationReturn> {
        match method.kind() {
            MethodKind::Equals | MethodKind::IsIdentical => {
                let equal = matches!(
                    arguments.first(),
                    Some(Argument::Proxy(other)) if **self == **other.handler()
                );
                Ok(InvocationReturn::Bool(equal))
            }
            MethodKind::HashCode => Ok(InvocationReturn::Hash(self.hash_code())),
            MethodKind::ToString => Ok(InvocationReturn::Text(self.description().to_string())),
            MethodKind::GetPrimaryKey => {
                let locator = self.locator();
                Ok(InvocationReturn::PrimaryKey(locator.primary_key()?.clone()))
            }
            MethodKind::GetHandle => {
                let handle = ComponentHandle::new(ComponentLocator::clone(&self.locator()))?;
                Ok(InvocationReturn::Handle(handle))
            }
            MethodKind::GetHomeHandle => {
                let handle = HomeHandle::new(ComponentLocator::clone(&self.locator()))?;
                Ok(InvocationReturn::HomeHandle(handle))
            }
            MethodKind::Business => self.invoke_business(proxy.context(), method, arguments).await,
        }
    }

    async fn invoke_business(
        self: &Arc<Self>,
        context: &Arc<ClientContext>,
        method: &MethodDescriptor,
        arguments: Vec<Argument>,
    ) -> Result<InvocationReturn> {
        let arguments = arguments
            .into_iter()
            .map(Argument::into_value)
            .collect::<Result<Vec<_>>>()?;

        let locator = self.locator();
        let weak_affinity = self.weak_affinity();
        let authentication = self.authentication();
        let tls = self.tls();
        let action = BusinessAction {
            handler: self,
            context,
            method,
            arguments,
        };

        context
            .runner()
            .perform_located_action(locator, &action, &weak_affinity, &authentication, &tls)
            .await
    }

    /// Snapshot of the current locator.
    pub fn locator(&self) -> Arc<ComponentLocator> {
        self.locator.load_full()
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn is_async_handler(&self) -> bool {
        self.mode == DispatchMode::Asynchronous
    }

    /// The asynchronous twin of this handler.
    ///
    /// Returns `self` for an asynchronous handler. Otherwise builds a new
    /// handler from the current locator, sticky configuration, timeout and
    /// attachments; its weak affinity is independent of this one's.
    pub fn async_handler(self: &Arc<Self>) -> Arc<Self> {
        if self.is_async_handler() {
            return self.clone();
        }
        let seed = HandlerSeed::new(ComponentLocator::clone(&self.locator()))
            .authentication(self.authentication())
            .tls(self.tls())
            .invocation_timeout(self.invocation_timeout())
            .attachments(self.attachments())
            .mode(DispatchMode::Asynchronous);
        Arc::new(Self::from_seed(seed))
    }

    pub fn weak_affinity(&self) -> Affinity {
        (**self.weak_affinity.load()).clone()
    }

    /// Last writer wins.
    pub fn set_weak_affinity(&self, affinity: Affinity) {
        self.weak_affinity.store(Arc::new(affinity));
    }

    /// Commit `affinity` to the locator, retrying until it sticks.
    pub fn set_strong_affinity(&self, affinity: Affinity) {
        let mut attempts = 0;
        loop {
            let current = self.locator.load_full();
            if *current.affinity() == affinity {
                return;
            }
            let next = Arc::new(current.with_new_affinity(affinity.clone()));
            let previous = self.locator.compare_and_swap(&current, next);
            if Arc::ptr_eq(&*previous, &current) {
                debug!("Strong affinity of {} set to {}", current.identifier(), affinity);
                return;
            }
            attempts += 1;
            note_contention("set_strong_affinity", attempts);
        }
    }

    /// Replace the strong affinity only if it currently equals `expected`.
    ///
    /// Single attempt: returns false on mismatch or on a lost race.
    pub fn compare_and_set_strong_affinity(&self, expected: &Affinity, new: &Affinity) -> bool {
        let current = self.locator.load_full();
        if current.affinity() != expected {
            return false;
        }
        let next = Arc::new(current.with_new_affinity(new.clone()));
        let previous = self.locator.compare_and_swap(&current, next);
        Arc::ptr_eq(&*previous, &current)
    }

    /// Make the locator stateful with `session`.
    ///
    /// Setting the session the locator already has is a no-op; a different
    /// one fails with [`RelayError::AlreadyStateful`].
    pub fn set_session_id(&self, session: SessionId) -> Result<()> {
        let mut attempts = 0;
        loop {
            let current = self.locator.load_full();
            if let Some(existing) = current.session_id() {
                if *existing == session {
                    return Ok(());
                }
                return Err(RelayError::AlreadyStateful {
                    existing: existing.clone(),
                });
            }
            let next = Arc::new(current.with_session(session.clone())?);
            let previous = self.locator.compare_and_swap(&current, next);
            if Arc::ptr_eq(&*previous, &current) {
                debug!("{} is now stateful with session {}", current.identifier(), session);
                return Ok(());
            }
            attempts += 1;
            note_contention("set_session_id", attempts);
        }
    }

    pub fn invocation_timeout(&self) -> InvocationTimeout {
        **self.invocation_timeout.load()
    }

    pub fn set_invocation_timeout(&self, timeout: InvocationTimeout) {
        self.invocation_timeout.store(Arc::new(timeout));
    }

    pub fn authentication(&self) -> Sticky<AuthConfig> {
        (**self.authentication.load()).clone()
    }

    pub fn set_authentication(&self, authentication: Sticky<AuthConfig>) {
        self.authentication.store(Arc::new(authentication));
    }

    pub fn tls(&self) -> Sticky<TlsContext> {
        (**self.tls.load()).clone()
    }

    pub fn set_tls(&self, tls: Sticky<TlsContext>) {
        self.tls.store(Arc::new(tls));
    }

    pub fn attachment(&self, key: &str) -> Option<Value> {
        self.attachments.load().get(key).cloned()
    }

    pub fn attachments(&self) -> HashMap<String, Value> {
        (**self.attachments.load()).clone()
    }

    /// Attach `value` to every future invocation. Returns the replaced value.
    pub fn put_attachment(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        let previous = self.attachments.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(key.clone(), value.clone());
            next
        });
        previous.get(&key).cloned()
    }

    pub fn remove_attachment(&self, key: &str) -> Option<Value> {
        let previous = self.attachments.rcu(|current| {
            let mut next = (**current).clone();
            next.remove(key);
            next
        });
        previous.get(key).cloned()
    }

    /// Hash over the current locator and the dispatch mode.
    pub fn hash_code(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// String form of the proxy, computed once.
    pub fn description(&self) -> &str {
        self.description
            .get_or_init(|| format!("Proxy for remote component {}", self.locator()))
    }
}

fn note_contention(operation: &str, attempts: u32) {
    if attempts == InvocationConfig::CAS_CONTENTION_WARN_ATTEMPTS {
        warn!("{} lost {} compare-and-set races, still retrying", operation, attempts);
    }
}

impl PartialEq for InvocationHandler {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.mode == other.mode && **self.locator.load() == **other.locator.load())
    }
}

impl Eq for InvocationHandler {}

impl Hash for InvocationHandler {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (**self.locator.load()).hash(state);
        self.mode.hash(state);
    }
}

impl fmt::Display for InvocationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl fmt::Debug for InvocationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationHandler")
            .field("mode", &self.mode)
            .field("locator", &**self.locator.load())
            .field("weak_affinity", &**self.weak_affinity.load())
            .finish_non_exhaustive()
    }
}

/// Body of a business call, run by the located-action runner once it has
/// picked an endpoint.
struct BusinessAction<'a> {
    handler: &'a Arc<InvocationHandler>,
    context: &'a Arc<ClientContext>,
    method: &'a MethodDescriptor,
    arguments: Vec<Value>,
}

#[async_trait]
impl LocatedAction for BusinessAction<'_> {
    /// Failures of the remote call are reshaped to the method's declared
    /// faults. Endpoint resolution failures never reach this point.
    async fn execute(&self, target: ResolvedTarget) -> Result<InvocationReturn> {
        self.call(target)
            .await
            .map_err(|e| translate_failure(self.method, e))
    }
}

impl BusinessAction<'_> {
    fn completed(&self, value: Value) -> InvocationReturn {
        match self.method.return_shape() {
            ReturnShape::Value => InvocationReturn::Value(value),
            ReturnShape::Future => InvocationReturn::Future(ResponseFuture::ready(Ok(value))),
            ReturnShape::Unit => InvocationReturn::Unit,
        }
    }

    async fn call(&self, target: ResolvedTarget) -> Result<InvocationReturn> {
        let ResolvedTarget {
            receiver,
            original_locator,
            affinity,
            authentication,
            tls,
        } = target;

        let uri = affinity.uri();
        let credentials = self.context.credentials();
        let authentication =
            authentication.resolve(|| credentials.authentication_for(uri.as_ref()));
        let tls = match tls {
            Sticky::Fixed(tls) => Some(tls),
            Sticky::Dynamic => credentials.tls_for(uri.as_ref()),
        };

        let invocation = Invocation {
            id: self.context.next_invocation_id(),
            locator: original_locator.with_new_affinity(affinity),
            method: self.method.clone(),
            arguments: self.arguments.clone(),
            weak_affinity: self.handler.weak_affinity(),
            authentication,
            tls,
            transaction: self.context.current_transaction(),
            attachments: self.handler.attachments(),
            blocking_caller: BlockingCaller::new(true),
        };
        let timeout = self
            .handler
            .invocation_timeout()
            .resolve(self.context.invocation_timeout());

        let mut call = InvocationContext::new(self.handler.clone(), receiver, invocation, timeout);
        call.send_request()?;

        if !self.handler.is_async_handler() && !self.method.is_client_async() {
            match call.await_response().await? {
                Outcome::Completed(value) => return Ok(self.completed(value)),
                Outcome::Pending => {
                    debug!(
                        "Invocation {} of {} continues asynchronously",
                        call.invocation().id,
                        self.method.name()
                    );
                }
            }
        }

        call.set_blocking_caller(false);
        let result = match self.method.return_shape() {
            ReturnShape::Future => InvocationReturn::Future(call.future_response()),
            ReturnShape::Unit => {
                call.discard_result();
                InvocationReturn::Unit
            }
            ReturnShape::Value => {
                set_future_result(call.future_response());
                InvocationReturn::Value(Value::Null)
            }
        };
        Ok(result)
    }
}
