//! Registry-backed endpoint resolution.
//!
//! [`ReceiverRegistry`] keeps the known nodes in registration order, each with
//! its cluster memberships and an optional endpoint URI, and resolves a call's
//! affinity to one of them.

use crate::invocation::InvocationReceiver;
use crate::proxy::InvocationReturn;
use crate::runner::{LocatedAction, LocatedActionRunner, ResolvedTarget};
use crate::sticky::{AuthConfig, Sticky, TlsContext};
use async_trait::async_trait;
use relay_core::{Affinity, ComponentLocator, RelayError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

struct Node {
    name: String,
    receiver: Arc<dyn InvocationReceiver>,
    clusters: BTreeSet<String>,
    uri: Option<Url>,
}

/// A [`LocatedActionRunner`] over a set of registered receivers.
#[derive(Default)]
pub struct ReceiverRegistry {
    nodes: RwLock<Vec<Node>>,
}

impl ReceiverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `receiver` under its node name, replacing any node of that name.
    pub async fn register_node(&self, receiver: Arc<dyn InvocationReceiver>) {
        let name = receiver.name().to_string();
        let mut nodes = self.nodes.write().await;
        if let Some(existing) = nodes.iter_mut().find(|n| n.name == name) {
            existing.receiver = receiver;
            debug!("Replaced receiver for node {}", name);
            return;
        }
        info!("Registered node {}", name);
        nodes.push(Node {
            name,
            receiver,
            clusters: BTreeSet::new(),
            uri: None,
        });
    }

    /// Returns false if no such node was registered.
    pub async fn unregister_node(&self, name: &str) -> bool {
        let mut nodes = self.nodes.write().await;
        let before = nodes.len();
        nodes.retain(|n| n.name != name);
        nodes.len() != before
    }

    pub async fn join_cluster(&self, node: &str, cluster: impl Into<String>) -> Result<()> {
        let mut nodes = self.nodes.write().await;
        let entry = find_mut(&mut nodes, node)?;
        entry.clusters.insert(cluster.into());
        Ok(())
    }

    /// Make `node` the target of [`Affinity::Uri`] affinities equal to `uri`.
    pub async fn bind_uri(&self, node: &str, uri: Url) -> Result<()> {
        let mut nodes = self.nodes.write().await;
        let entry = find_mut(&mut nodes, node)?;
        entry.uri = Some(uri);
        Ok(())
    }

    /// Registered node names in registration order.
    pub async fn node_names(&self) -> Vec<String> {
        self.nodes.read().await.iter().map(|n| n.name.clone()).collect()
    }

    async fn resolve(
        &self,
        affinity: &Affinity,
        weak_affinity: &Affinity,
    ) -> Result<(String, Arc<dyn InvocationReceiver>)> {
        let nodes = self.nodes.read().await;
        let preferred = match weak_affinity {
            Affinity::Node(name) => nodes.iter().find(|n| &n.name == name),
            _ => None,
        };

        let chosen = match affinity {
            Affinity::Node(name) => nodes.iter().find(|n| &n.name == name),
            Affinity::Cluster(cluster) => preferred
                .filter(|n| n.clusters.contains(cluster))
                .or_else(|| nodes.iter().find(|n| n.clusters.contains(cluster))),
            Affinity::Uri(uri) => nodes.iter().find(|n| n.uri.as_ref() == Some(uri)),
            Affinity::None | Affinity::Local => preferred.or_else(|| nodes.first()),
        };

        chosen
            .map(|n| (n.name.clone(), n.receiver.clone()))
            .ok_or_else(|| RelayError::Transport {
                message: format!("No receiver available for affinity {}", affinity),
            })
    }
}

fn find_mut<'a>(nodes: &'a mut [Node], name: &str) -> Result<&'a mut Node> {
    nodes
        .iter_mut()
        .find(|n| n.name == name)
        .ok_or_else(|| RelayError::Transport {
            message: format!("Unknown node: {}", name),
        })
}

#[async_trait]
impl LocatedActionRunner for ReceiverRegistry {
    async fn perform_located_action(
        &self,
        locator: Arc<ComponentLocator>,
        action: &dyn LocatedAction,
        weak_affinity: &Affinity,
        authentication: &Sticky<AuthConfig>,
        tls: &Sticky<TlsContext>,
    ) -> Result<InvocationReturn> {
        let (node, receiver) = self.resolve(locator.affinity(), weak_affinity).await?;
        let affinity = match locator.affinity() {
            Affinity::None => Affinity::Node(node),
            affinity => affinity.clone(),
        };
        debug!(
            "Resolved {} to {} (weak affinity {})",
            locator.identifier(),
            receiver.name(),
            weak_affinity
        );

        let target = ResolvedTarget {
            receiver,
            original_locator: locator,
            affinity,
            authentication: authentication.clone(),
            tls: tls.clone(),
        };
        action.execute(target).await
    }
}
