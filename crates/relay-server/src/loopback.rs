//! In-process loopback transport.
//!
//! A [`LoopbackReceiver`] plugs a [`Deployment`] into the client's receiver
//! seam: each client invocation becomes a [`LoopbackRequest`] whose writes are
//! turned back into client replies. No bytes are encoded; the request simply
//! forwards values.

use crate::deployment::{ComponentKind, Deployment};
use crate::request::{InvocationRequest, ServerRequest, SessionOpenRequest};
use crate::transaction::{InflowGuard, Transaction};
use async_trait::async_trait;
use relay_client::{BlockingCaller, Invocation, InvocationReceiver, Reply, ResponseSink};
use relay_core::{
    Affinity, ComponentIdentifier, ComponentLocator, MethodDescriptor, RelayError, Result,
    ReturnShape, ServerConfig, SessionId, TransactionId,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Serves client invocations for one node from a deployment.
pub struct LoopbackReceiver {
    node: String,
    deployment: Arc<Deployment>,
    executor: tokio::runtime::Handle,
}

impl LoopbackReceiver {
    /// Must be called from within a tokio runtime.
    pub fn new(deployment: Arc<Deployment>) -> Self {
        Self::with_executor(deployment, tokio::runtime::Handle::current())
    }

    pub fn with_executor(deployment: Arc<Deployment>, executor: tokio::runtime::Handle) -> Self {
        Self {
            node: deployment.node().to_string(),
            deployment,
            executor,
        }
    }

    pub fn deployment(&self) -> &Arc<Deployment> {
        &self.deployment
    }

    /// Open a session on the stateful component behind `locator`.
    ///
    /// Returns the stateful locator to build a proxy from. A locator without
    /// affinity is pinned to this node.
    pub async fn open_session(
        &self,
        locator: &ComponentLocator,
        transaction: Option<TransactionId>,
    ) -> Result<ComponentLocator> {
        let (sink, mut replies) = ResponseSink::channel();
        let request = LoopbackRequest::session_open(
            locator.clone(),
            transaction,
            sink,
            self.executor.clone(),
            &self.deployment,
        );
        self.deployment.handle_session_open(Arc::new(request)).await;

        let mut opened = None;
        while let Some(reply) = replies.recv().await {
            match reply {
                Reply::Session(session) => opened = Some(session),
                Reply::Done(Ok(_)) => break,
                Reply::Done(Err(e)) => return Err(e),
                _ => {}
            }
        }
        let session = opened.ok_or_else(|| RelayError::Transport {
            message: format!("Session open on {} produced no session", locator.identifier()),
        })?;

        let affinity = match locator.affinity() {
            Affinity::None => Affinity::node(&self.node),
            affinity => affinity.clone(),
        };
        locator.with_new_affinity(affinity).with_session(session)
    }
}

#[async_trait]
impl InvocationReceiver for LoopbackReceiver {
    fn name(&self) -> &str {
        &self.node
    }

    async fn process_invocation(&self, invocation: Invocation, sink: ResponseSink) {
        sink.weak_affinity(Affinity::node(&self.node));
        let request = LoopbackRequest::invocation(
            invocation,
            sink,
            self.executor.clone(),
            &self.deployment,
        );
        self.deployment.handle_invocation(Arc::new(request)).await;
    }
}

/// A request carried in-process from a client invocation to a deployment.
pub struct LoopbackRequest {
    locator: ComponentLocator,
    method: MethodDescriptor,
    arguments: Vec<Value>,
    weak_affinity: Affinity,
    attachments: HashMap<String, Value>,
    blocking_caller: BlockingCaller,
    target_kind: Option<ComponentKind>,
    inflow: InflowGuard,
    committed_session: Mutex<Option<SessionId>>,
    executor: tokio::runtime::Handle,
    sink: ResponseSink,
}

impl LoopbackRequest {
    /// Request for a client invocation.
    pub fn invocation(
        invocation: Invocation,
        sink: ResponseSink,
        executor: tokio::runtime::Handle,
        deployment: &Deployment,
    ) -> Self {
        let Invocation {
            locator,
            method,
            arguments,
            weak_affinity,
            transaction,
            attachments,
            blocking_caller,
            ..
        } = invocation;
        Self {
            target_kind: deployment.component_kind(locator.identifier()),
            inflow: InflowGuard::new(transaction, deployment.coordinator()),
            locator,
            method,
            arguments,
            weak_affinity,
            attachments,
            blocking_caller,
            committed_session: Mutex::new(None),
            executor,
            sink,
        }
    }

    /// Request to open a session on the component behind `locator`.
    pub fn session_open(
        locator: ComponentLocator,
        transaction: Option<TransactionId>,
        sink: ResponseSink,
        executor: tokio::runtime::Handle,
        deployment: &Deployment,
    ) -> Self {
        Self {
            target_kind: deployment.component_kind(locator.identifier()),
            inflow: InflowGuard::new(transaction, deployment.coordinator()),
            locator,
            method: MethodDescriptor::business("open_session").returning(ReturnShape::Unit),
            arguments: Vec::new(),
            weak_affinity: Affinity::None,
            attachments: HashMap::new(),
            blocking_caller: BlockingCaller::new(true),
            committed_session: Mutex::new(None),
            executor,
            sink,
        }
    }

    fn committed(&self) -> std::sync::MutexGuard<'_, Option<SessionId>> {
        self.committed_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ServerRequest for LoopbackRequest {
    fn request_executor(&self) -> tokio::runtime::Handle {
        self.executor.clone()
    }

    fn protocol(&self) -> &str {
        ServerConfig::LOOPBACK_PROTOCOL
    }

    fn weak_affinity(&self) -> Affinity {
        self.weak_affinity.clone()
    }

    fn has_transaction(&self) -> bool {
        self.inflow.has_transaction()
    }

    fn transaction(&self) -> Result<Option<Transaction>> {
        self.inflow.inflow()
    }

    fn is_blocking_caller(&self) -> bool {
        self.blocking_caller.is_blocking()
    }

    fn component_identifier(&self) -> &ComponentIdentifier {
        self.locator.identifier()
    }

    fn write_exception(&self, error: RelayError) {
        self.sink.complete(Err(error));
    }

    fn write_no_such_component(&self) {
        self.sink.complete(Err(RelayError::NoSuchComponent {
            identifier: self.locator.identifier().to_string(),
        }));
    }

    fn write_cancel_response(&self) {
        self.sink.complete(Err(RelayError::Cancelled));
    }

    fn write_not_stateful(&self) {
        self.sink.complete(Err(RelayError::NotStateful {
            identifier: self.locator.identifier().to_string(),
        }));
    }

    fn convert_to_stateful(&self, session: SessionId) -> Result<()> {
        if let Some(existing) = self.locator.session_id() {
            return Err(RelayError::AlreadyStateful {
                existing: existing.clone(),
            });
        }
        if self.target_kind != Some(ComponentKind::Stateful) {
            return Err(RelayError::NotStateful {
                identifier: self.locator.identifier().to_string(),
            });
        }

        let mut committed = self.committed();
        if let Some(existing) = committed.as_ref() {
            if *existing != session {
                return Err(RelayError::SessionConflict {
                    committed: existing.clone(),
                    requested: session,
                });
            }
            return Ok(());
        }
        debug!("Request on {} converted to session {}", self.locator.identifier(), session);
        *committed = Some(session.clone());
        self.sink.session(session);
        Ok(())
    }
}

impl InvocationRequest for LoopbackRequest {
    fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    fn session_id(&self) -> Option<SessionId> {
        self.committed()
            .clone()
            .or_else(|| self.locator.session_id().cloned())
    }

    fn attachment(&self, key: &str) -> Option<Value> {
        self.attachments.get(key).cloned()
    }

    fn write_result(&self, value: Value) {
        self.sink.complete(Ok(value));
    }

    fn write_proceed_async(&self) {
        self.sink.proceed_async();
    }

    fn write_no_such_method(&self) {
        self.sink.complete(Err(RelayError::NoSuchMethod {
            identifier: self.locator.identifier().to_string(),
            method: self.method.name().to_string(),
        }));
    }

    fn update_strong_affinity(&self, affinity: Affinity) {
        self.sink.strong_affinity(affinity);
    }
}

impl SessionOpenRequest for LoopbackRequest {
    fn write_session_opened(&self, session: SessionId) {
        self.sink.session(session);
        self.sink.complete(Ok(Value::Null));
    }
}
