//! Centralized configuration for relay.
//!
//! Configuration constants for client invocation and the server side, plus the
//! per-proxy invocation timeout setting.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client-side invocation configuration.
pub struct InvocationConfig;

impl InvocationConfig {
    /// Timeout applied when a proxy has no override.
    pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(60);
    /// Failed compare-and-set attempts before a contention warning is logged.
    pub const CAS_CONTENTION_WARN_ATTEMPTS: u32 = 64;
    /// Protocol name used when deriving dynamic credentials.
    pub const AUTH_PROTOCOL: &'static str = "relay";
    /// URI schemes that imply a transport security context.
    pub const SECURE_SCHEMES: &'static [&'static str] = &["https", "relays"];
}

/// Server-side configuration.
pub struct ServerConfig;

impl ServerConfig {
    /// Protocol name reported by in-process loopback requests.
    pub const LOOPBACK_PROTOCOL: &'static str = "loopback";
    /// Upper bound on a single component invocation on the server.
    pub const MAX_EXECUTION_TIME: Duration = Duration::from_secs(300);
}

/// Per-proxy invocation timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InvocationTimeout {
    /// Use the client context's configured timeout.
    #[default]
    Global,
    /// Use this timeout for every call on the proxy.
    After(Duration),
}

impl InvocationTimeout {
    /// Resolve against the global timeout.
    pub fn resolve(&self, global: Duration) -> Duration {
        match self {
            InvocationTimeout::Global => global,
            InvocationTimeout::After(timeout) => *timeout,
        }
    }
}
