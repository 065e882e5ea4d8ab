//! Routing hints for remote components.
//!
//! An affinity tells endpoint resolution which node (or cluster) should service
//! calls for a component. Each affinity has a URI form (`node:<name>`,
//! `cluster:<name>`, `local:-`) so credentials can be derived per target.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

const NODE_SCHEME: &str = "node";
const CLUSTER_SCHEME: &str = "cluster";
const LOCAL_SCHEME: &str = "local";

/// A routing hint about which endpoint should receive calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Affinity {
    /// No preference.
    #[default]
    None,
    /// The in-process node.
    Local,
    /// A specific named node.
    Node(String),
    /// Any member of a named cluster.
    Cluster(String),
    /// A concrete endpoint URI.
    Uri(Url),
}

impl Affinity {
    pub fn node(name: impl Into<String>) -> Self {
        Affinity::Node(name.into())
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Affinity::Cluster(name.into())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Affinity::None)
    }

    /// The URI form of this affinity, or `None` for no preference.
    ///
    /// Node and cluster names are percent-encoded.
    pub fn uri(&self) -> Option<Url> {
        match self {
            Affinity::None => None,
            Affinity::Local => Url::parse(&format!("{}:-", LOCAL_SCHEME)).ok(),
            Affinity::Node(name) => named_uri(NODE_SCHEME, name),
            Affinity::Cluster(name) => named_uri(CLUSTER_SCHEME, name),
            Affinity::Uri(uri) => Some(uri.clone()),
        }
    }

    /// Parse the URI form back into an affinity.
    pub fn from_uri(uri: &Url) -> Self {
        match uri.scheme() {
            LOCAL_SCHEME => Affinity::Local,
            NODE_SCHEME => Affinity::Node(decode_name(uri.path())),
            CLUSTER_SCHEME => Affinity::Cluster(decode_name(uri.path())),
            _ => Affinity::Uri(uri.clone()),
        }
    }
}

fn named_uri(scheme: &str, name: &str) -> Option<Url> {
    Url::parse(&format!("{}:{}", scheme, urlencoding::encode(name))).ok()
}

fn decode_name(path: &str) -> String {
    urlencoding::decode(path)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Affinity::None => f.write_str("none"),
            Affinity::Local => write!(f, "{}:-", LOCAL_SCHEME),
            Affinity::Node(name) => write!(f, "{}:{}", NODE_SCHEME, name),
            Affinity::Cluster(name) => write!(f, "{}:{}", CLUSTER_SCHEME, name),
            Affinity::Uri(uri) => write!(f, "{}", uri),
        }
    }
}
