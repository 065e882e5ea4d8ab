//! Ambient call context shared by the proxies of one client.

use crate::handler::InvocationHandler;
use crate::proxy::Proxy;
use crate::runner::LocatedActionRunner;
use crate::sticky::{AuthConfig, CredentialSource, DefaultCredentials, Sticky, TlsContext};
use relay_core::{ComponentLocator, InvocationConfig, TransactionId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Supplies the transaction active for the calling code, if any.
pub trait TransactionSource: Send + Sync {
    fn current(&self) -> Option<TransactionId>;
}

/// Runner, credentials and defaults shared by every proxy it creates.
pub struct ClientContext {
    runner: Arc<dyn LocatedActionRunner>,
    credentials: Arc<dyn CredentialSource>,
    transactions: Option<Arc<dyn TransactionSource>>,
    invocation_timeout: Duration,
    next_invocation_id: AtomicU64,
}

impl ClientContext {
    /// Start building a context around `runner`.
    pub fn builder(runner: Arc<dyn LocatedActionRunner>) -> ClientContextBuilder {
        ClientContextBuilder::new(runner)
    }

    /// A proxy for `locator` with dynamic credentials.
    pub fn create_proxy(self: &Arc<Self>, locator: ComponentLocator) -> Proxy {
        self.create_proxy_with(locator, Sticky::Dynamic, Sticky::Dynamic)
    }

    /// A proxy for `locator` with the given sticky credentials.
    pub fn create_proxy_with(
        self: &Arc<Self>,
        locator: ComponentLocator,
        authentication: Sticky<AuthConfig>,
        tls: Sticky<TlsContext>,
    ) -> Proxy {
        let handler = InvocationHandler::new(locator, authentication, tls);
        Proxy::new(Arc::new(handler), self.clone())
    }

    pub fn runner(&self) -> &dyn LocatedActionRunner {
        self.runner.as_ref()
    }

    pub fn credentials(&self) -> &dyn CredentialSource {
        self.credentials.as_ref()
    }

    /// Timeout for proxies without an override.
    pub fn invocation_timeout(&self) -> Duration {
        self.invocation_timeout
    }

    pub fn next_invocation_id(&self) -> u64 {
        self.next_invocation_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn current_transaction(&self) -> Option<TransactionId> {
        self.transactions.as_ref().and_then(|source| source.current())
    }
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("invocation_timeout", &self.invocation_timeout)
            .field("has_transactions", &self.transactions.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ClientContext`].
///
/// # Example
///
/// ```rust,ignore
/// let context = ClientContext::builder(registry)
///     .invocation_timeout(Duration::from_secs(5))
///     .build();
/// let proxy = context.create_proxy(locator);
/// ```
pub struct ClientContextBuilder {
    runner: Arc<dyn LocatedActionRunner>,
    credentials: Arc<dyn CredentialSource>,
    transactions: Option<Arc<dyn TransactionSource>>,
    invocation_timeout: Duration,
}

impl ClientContextBuilder {
    pub fn new(runner: Arc<dyn LocatedActionRunner>) -> Self {
        Self {
            runner,
            credentials: Arc::new(DefaultCredentials),
            transactions: None,
            invocation_timeout: InvocationConfig::DEFAULT_INVOCATION_TIMEOUT,
        }
    }

    /// Source of credentials for proxies without sticky configuration.
    ///
    /// Default: [`DefaultCredentials`]
    pub fn credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Source of the caller's transaction. Default: none.
    pub fn transactions(mut self, transactions: Arc<dyn TransactionSource>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    /// Default: [`InvocationConfig::DEFAULT_INVOCATION_TIMEOUT`]
    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    pub fn build(self) -> Arc<ClientContext> {
        Arc::new(ClientContext {
            runner: self.runner,
            credentials: self.credentials,
            transactions: self.transactions,
            invocation_timeout: self.invocation_timeout,
            next_invocation_id: AtomicU64::new(1),
        })
    }
}
