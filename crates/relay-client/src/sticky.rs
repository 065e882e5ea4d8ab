//! Sticky per-proxy configuration and dynamic credential derivation.
//!
//! A proxy can pin its authentication configuration and transport security
//! context (`Sticky::Fixed`), or leave them `Dynamic`, in which case they are
//! derived for every call from the URI of the endpoint the call resolves to.

use relay_core::InvocationConfig;
use serde::{Deserialize, Serialize};
use url::Url;

/// Either a pinned value or "derive per call".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sticky<T> {
    Fixed(T),
    Dynamic,
}

impl<T> Default for Sticky<T> {
    fn default() -> Self {
        Sticky::Dynamic
    }
}

impl<T: Clone> Sticky<T> {
    /// The pinned value, or the derived one.
    pub fn resolve(&self, derive: impl FnOnce() -> T) -> T {
        match self {
            Sticky::Fixed(value) => value.clone(),
            Sticky::Dynamic => derive(),
        }
    }

    pub fn fixed(&self) -> Option<&T> {
        match self {
            Sticky::Fixed(value) => Some(value),
            Sticky::Dynamic => None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Sticky::Dynamic)
    }
}

impl<T> From<Option<T>> for Sticky<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Sticky::Fixed(value),
            None => Sticky::Dynamic,
        }
    }
}

/// Opaque authentication configuration attached to an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthConfig {
    principal: Option<String>,
    mechanism: String,
    protocol: String,
}

impl AuthConfig {
    /// Unauthenticated access.
    pub fn anonymous() -> Self {
        Self {
            principal: None,
            mechanism: "ANONYMOUS".to_string(),
            protocol: InvocationConfig::AUTH_PROTOCOL.to_string(),
        }
    }

    /// Authenticate as `principal` using `mechanism`.
    pub fn principal(principal: impl Into<String>, mechanism: impl Into<String>) -> Self {
        Self {
            principal: Some(principal.into()),
            mechanism: mechanism.into(),
            protocol: InvocationConfig::AUTH_PROTOCOL.to_string(),
        }
    }

    pub fn principal_name(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn mechanism(&self) -> &str {
        &self.mechanism
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }
}

/// Opaque transport security context attached to an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TlsContext {
    profile: String,
    verify_peer: bool,
}

impl TlsContext {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            verify_peer: true,
        }
    }

    pub fn with_verify_peer(mut self, verify_peer: bool) -> Self {
        self.verify_peer = verify_peer;
        self
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn verify_peer(&self) -> bool {
        self.verify_peer
    }
}

/// Source of per-call credentials for proxies without sticky configuration.
pub trait CredentialSource: Send + Sync {
    /// Authentication configuration for a call to `target`.
    fn authentication_for(&self, target: Option<&Url>) -> AuthConfig;

    /// Transport security for a call to `target`, `None` for plaintext.
    fn tls_for(&self, target: Option<&Url>) -> Option<TlsContext>;
}

/// Derives credentials from the target URI alone.
///
/// A user name in the URI becomes the principal; secure schemes get a
/// default TLS profile named after the scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCredentials;

impl CredentialSource for DefaultCredentials {
    fn authentication_for(&self, target: Option<&Url>) -> AuthConfig {
        match target.map(|uri| uri.username()).filter(|user| !user.is_empty()) {
            Some(user) => AuthConfig::principal(user, "PLAIN"),
            None => AuthConfig::anonymous(),
        }
    }

    fn tls_for(&self, target: Option<&Url>) -> Option<TlsContext> {
        let scheme = target?.scheme();
        InvocationConfig::SECURE_SCHEMES
            .contains(&scheme)
            .then(|| TlsContext::new(format!("{}-default", scheme)))
    }
}
