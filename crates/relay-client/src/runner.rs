//! Located-action contract.
//!
//! Endpoint resolution is pluggable: a [`LocatedActionRunner`] turns a locator,
//! a weak-affinity hint and the proxy's sticky credentials into a concrete
//! receiver, then runs the supplied [`LocatedAction`] against it. Retries and
//! fail-over, if any, belong to the runner.

use crate::invocation::InvocationReceiver;
use crate::proxy::InvocationReturn;
use crate::sticky::{AuthConfig, Sticky, TlsContext};
use async_trait::async_trait;
use relay_core::{Affinity, ComponentLocator, Result};
use std::fmt;
use std::sync::Arc;

/// Where a call was resolved to.
#[derive(Clone)]
pub struct ResolvedTarget {
    /// The chosen endpoint.
    pub receiver: Arc<dyn InvocationReceiver>,
    /// The locator the action was started with.
    pub original_locator: Arc<ComponentLocator>,
    /// Affinity the call should carry.
    pub affinity: Affinity,
    pub authentication: Sticky<AuthConfig>,
    pub tls: Sticky<TlsContext>,
}

impl fmt::Debug for ResolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedTarget")
            .field("receiver", &self.receiver.name())
            .field("original_locator", &self.original_locator)
            .field("affinity", &self.affinity)
            .finish_non_exhaustive()
    }
}

/// The body of a call, run once an endpoint has been chosen.
#[async_trait]
pub trait LocatedAction: Send + Sync {
    async fn execute(&self, target: ResolvedTarget) -> Result<InvocationReturn>;
}

/// Resolves endpoints and runs actions against them.
#[async_trait]
pub trait LocatedActionRunner: Send + Sync {
    async fn perform_located_action(
        &self,
        locator: Arc<ComponentLocator>,
        action: &dyn LocatedAction,
        weak_affinity: &Affinity,
        authentication: &Sticky<AuthConfig>,
        tls: &Sticky<TlsContext>,
    ) -> Result<InvocationReturn>;
}
