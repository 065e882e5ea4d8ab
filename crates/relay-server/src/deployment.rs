//! Deployed components and the server-side invocation logic.
//!
//! A [`Deployment`] maps component identifiers to [`Component`]s and runs
//! requests against them. It only sees requests through the
//! [`ServerRequest`] traits, so every transport gets the same behavior:
//!
//! 1. unknown component -> `write_no_such_component`
//! 2. transaction inflow if the request carries one (failure aborts)
//! 3. stateful component addressed without a session -> best-effort
//!    conversion to a fresh session
//! 4. client-async method -> `write_proceed_async` before execution
//! 5. execution on the request executor, bounded by the execution limit
//! 6. result or failure written back through the request

use crate::request::{InvocationRequest, ServerRequest, SessionOpenRequest};
use crate::transaction::{LocalTransactionCoordinator, Transaction, TransactionCoordinator};
use async_trait::async_trait;
use relay_core::{
    Affinity, ComponentIdentifier, MethodDescriptor, RelayError, Result, ServerConfig, SessionId,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What kind of instance a component is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Stateless,
    Stateful,
    Entity,
}

/// One call as seen by a component.
#[derive(Debug, Clone)]
pub struct ComponentCall {
    pub identifier: ComponentIdentifier,
    pub method: MethodDescriptor,
    pub arguments: Vec<Value>,
    pub session: Option<SessionId>,
    pub transaction: Option<Transaction>,
}

/// Application code behind a component identifier.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    fn kind(&self) -> ComponentKind;

    fn has_method(&self, name: &str) -> bool;

    /// Prepare state for a new session. Only called on stateful components.
    async fn open_session(&self, _session: &SessionId) -> Result<()> {
        Ok(())
    }

    /// Drop state for a session that was opened but never handed out.
    async fn close_session(&self, _session: &SessionId) -> Result<()> {
        Ok(())
    }

    async fn invoke(&self, call: ComponentCall) -> Result<Value>;
}

/// Components deployed on one node.
pub struct Deployment {
    node: String,
    components: HashMap<ComponentIdentifier, Arc<dyn Component>>,
    coordinator: Arc<dyn TransactionCoordinator>,
    max_execution_time: Duration,
}

impl Deployment {
    pub fn builder(node: impl Into<String>) -> DeploymentBuilder {
        DeploymentBuilder::new(node)
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn coordinator(&self) -> Arc<dyn TransactionCoordinator> {
        self.coordinator.clone()
    }

    pub fn component(&self, identifier: &ComponentIdentifier) -> Option<Arc<dyn Component>> {
        self.components.get(identifier).cloned()
    }

    pub fn component_kind(&self, identifier: &ComponentIdentifier) -> Option<ComponentKind> {
        self.components.get(identifier).map(|c| c.kind())
    }

    /// Run an invocation request to completion.
    pub async fn handle_invocation(&self, request: Arc<dyn InvocationRequest>) {
        let identifier = request.component_identifier().clone();
        let Some(component) = self.component(&identifier) else {
            debug!("No component {} on {}", identifier, self.node);
            request.write_no_such_component();
            return;
        };
        if !component.has_method(request.method().name()) {
            request.write_no_such_method();
            return;
        }

        let transaction = match inflow(request.as_ref()) {
            Ok(transaction) => transaction,
            Err(e) => {
                warn!("Abandoning invocation on {}: {}", identifier, e);
                request.write_exception(e);
                return;
            }
        };

        let mut session = request.session_id();
        if session.is_none() && component.kind() == ComponentKind::Stateful {
            session = self.convert_best_effort(request.as_ref(), component.as_ref()).await;
        }

        if request.method().is_client_async() {
            request.write_proceed_async();
        }

        let call = ComponentCall {
            identifier,
            method: request.method().clone(),
            arguments: request.arguments().to_vec(),
            session,
            transaction,
        };
        let limit = self.max_execution_time;
        let task = request
            .request_executor()
            .spawn(async move { tokio::time::timeout(limit, component.invoke(call)).await });

        match task.await {
            Ok(Ok(Ok(value))) => request.write_result(value),
            Ok(Ok(Err(e))) => request.write_exception(e),
            Ok(Err(_)) => request.write_exception(RelayError::Timeout(limit)),
            Err(e) if e.is_cancelled() => request.write_cancel_response(),
            Err(e) => request.write_exception(RelayError::Other(format!(
                "Component {} panicked: {}",
                request.component_identifier(),
                e
            ))),
        }
    }

    /// A stateful component was addressed with a stateless locator: give the
    /// call a fresh session if the request allows it.
    async fn convert_best_effort(
        &self,
        request: &dyn InvocationRequest,
        component: &dyn Component,
    ) -> Option<SessionId> {
        let session = SessionId::random();
        let converted = open_and_convert(request, component, &session).await;
        match converted {
            Ok(()) => {
                debug!("Converted call on {} to session {}", request.component_identifier(), session);
                request.update_strong_affinity(Affinity::node(&self.node));
                Some(session)
            }
            Err(e) => {
                debug!("Stateful conversion skipped: {}", e);
                None
            }
        }
    }

    /// Open a session on a stateful component.
    pub async fn handle_session_open(&self, request: Arc<dyn SessionOpenRequest>) {
        let identifier = request.component_identifier().clone();
        let Some(component) = self.component(&identifier) else {
            request.write_no_such_component();
            return;
        };
        if component.kind() != ComponentKind::Stateful {
            request.write_not_stateful();
            return;
        }
        if let Err(e) = inflow(request.as_ref()) {
            warn!("Abandoning session open on {}: {}", identifier, e);
            request.write_exception(e);
            return;
        }

        let session = SessionId::random();
        let opened = open_and_convert(request.as_ref(), component.as_ref(), &session).await;
        match opened {
            Ok(()) => {
                info!("Opened session {} on {}", session, identifier);
                request.write_session_opened(session);
            }
            Err(e) => request.write_exception(e),
        }
    }
}

fn inflow<R: ServerRequest + ?Sized>(request: &R) -> Result<Option<Transaction>> {
    if request.has_transaction() {
        request.transaction()
    } else {
        Ok(None)
    }
}

/// Open `session` on the component and commit it to the request.
///
/// A session the request refuses is closed again on the component.
async fn open_and_convert<R: ServerRequest + ?Sized>(
    request: &R,
    component: &dyn Component,
    session: &SessionId,
) -> Result<()> {
    component.open_session(session).await?;
    if let Err(e) = request.convert_to_stateful(session.clone()) {
        if let Err(close) = component.close_session(session).await {
            warn!("Failed to close rejected session {}: {}", session, close);
        }
        return Err(e);
    }
    Ok(())
}

/// Builder for [`Deployment`].
pub struct DeploymentBuilder {
    node: String,
    components: HashMap<ComponentIdentifier, Arc<dyn Component>>,
    coordinator: Option<Arc<dyn TransactionCoordinator>>,
    max_execution_time: Duration,
}

impl DeploymentBuilder {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            components: HashMap::new(),
            coordinator: None,
            max_execution_time: ServerConfig::MAX_EXECUTION_TIME,
        }
    }

    /// Deploy `component` under `identifier`, replacing any earlier one.
    pub fn component(mut self, identifier: ComponentIdentifier, component: Arc<dyn Component>) -> Self {
        self.components.insert(identifier, component);
        self
    }

    /// Default: a fresh [`LocalTransactionCoordinator`].
    pub fn coordinator(mut self, coordinator: Arc<dyn TransactionCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Default: [`ServerConfig::MAX_EXECUTION_TIME`]
    pub fn max_execution_time(mut self, limit: Duration) -> Self {
        self.max_execution_time = limit;
        self
    }

    pub fn build(self) -> Arc<Deployment> {
        info!(
            "Deploying {} component(s) on {}",
            self.components.len(),
            self.node
        );
        Arc::new(Deployment {
            node: self.node,
            components: self.components,
            coordinator: self
                .coordinator
                .unwrap_or_else(|| Arc::new(LocalTransactionCoordinator::new())),
            max_execution_time: self.max_execution_time,
        })
    }
}
