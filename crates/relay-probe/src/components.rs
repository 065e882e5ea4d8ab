//! Sample components deployed on every probe node.

use async_trait::async_trait;
use relay_core::{
    Affinity, ComponentIdentifier, ComponentLocator, FaultKind, RelayError, Result, SessionId,
    ViewType,
};
use relay_server::{Component, ComponentCall, ComponentKind, Deployment, TransactionCoordinator};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const APP: &str = "probe";
const MODULE: &str = "samples";

/// Per-session counter.
#[derive(Default)]
pub struct Counter {
    counts: Mutex<HashMap<SessionId, i64>>,
}

#[async_trait]
impl Component for Counter {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Stateful
    }

    fn has_method(&self, name: &str) -> bool {
        matches!(name, "increment" | "get")
    }

    async fn open_session(&self, session: &SessionId) -> Result<()> {
        self.counts.lock().await.insert(session.clone(), 0);
        Ok(())
    }

    async fn close_session(&self, session: &SessionId) -> Result<()> {
        self.counts.lock().await.remove(session);
        Ok(())
    }

    async fn invoke(&self, call: ComponentCall) -> Result<Value> {
        let session = call.session.ok_or_else(|| {
            RelayError::fault(FaultKind::checked("NoSession"), "counter calls need a session")
        })?;
        let mut counts = self.counts.lock().await;
        let count = counts.entry(session).or_insert(0);
        if call.method.name() == "increment" {
            *count += call.arguments.first().and_then(Value::as_i64).unwrap_or(1);
        }
        Ok(json!(*count))
    }
}

/// Returns its first argument.
pub struct Echo;

#[async_trait]
impl Component for Echo {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Stateless
    }

    fn has_method(&self, name: &str) -> bool {
        name == "echo"
    }

    async fn invoke(&self, call: ComponentCall) -> Result<Value> {
        Ok(call.arguments.into_iter().next().unwrap_or(Value::Null))
    }
}

pub fn counter_locator() -> Result<ComponentLocator> {
    let identifier = ComponentIdentifier::new(APP, MODULE, "Counter", "")?;
    Ok(ComponentLocator::stateless(
        ViewType::new("probe.Counter"),
        identifier,
        Affinity::None,
    ))
}

pub fn echo_locator(affinity: Affinity) -> Result<ComponentLocator> {
    let identifier = ComponentIdentifier::new(APP, MODULE, "Echo", "")?;
    Ok(ComponentLocator::stateless(ViewType::new("probe.Echo"), identifier, affinity))
}

/// Deploy both samples on `node`.
pub fn deploy(node: &str, coordinator: Arc<dyn TransactionCoordinator>) -> Result<Arc<Deployment>> {
    let counter = counter_locator()?;
    let echo = echo_locator(Affinity::None)?;
    Ok(Deployment::builder(node)
        .component(counter.identifier().clone(), Arc::new(Counter::default()))
        .component(echo.identifier().clone(), Arc::new(Echo))
        .coordinator(coordinator)
        .build())
}
