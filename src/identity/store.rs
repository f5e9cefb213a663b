//! Accept/reject decisions for inbound identifiers
//!
//! The store is a pure read surface for the tunnel: it is populated at
//! startup from configuration and, when a key-value backend is attached,
//! queried on demand. One store instance is shared by every session.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::kv::KeyValueBackend;
use super::ClientId;

/// Where an accepted identifier was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// The static identifier from process configuration
    Static,
    /// The dynamic key-value backend
    Dynamic,
}

/// An identifier that passed authorization
#[derive(Debug, Clone, Copy)]
pub struct AuthorizedClient {
    /// The accepted identifier
    pub id: ClientId,
    /// Which surface accepted it
    pub source: IdentitySource,
}

/// Resolves an inbound identifier to accept/reject.
///
/// Evaluation is short-circuit: the static identifier is compared first
/// (byte-equal), and only on mismatch is the dynamic backend consulted.
/// Backend lookup failures are logged and treated as reject, never as
/// accept.
pub struct IdentityStore {
    static_id: ClientId,
    dynamic: Option<Arc<dyn KeyValueBackend>>,
}

impl IdentityStore {
    /// Create a store holding only the static identifier
    #[must_use]
    pub fn new(static_id: ClientId) -> Self {
        Self {
            static_id,
            dynamic: None,
        }
    }

    /// Attach a dynamic key-value backend
    #[must_use]
    pub fn with_dynamic(mut self, backend: Arc<dyn KeyValueBackend>) -> Self {
        self.dynamic = Some(backend);
        self
    }

    /// The configured static identifier
    #[must_use]
    pub fn static_id(&self) -> ClientId {
        self.static_id
    }

    /// The dynamic backend, if one is attached
    #[must_use]
    pub fn dynamic_backend(&self) -> Option<&Arc<dyn KeyValueBackend>> {
        self.dynamic.as_ref()
    }

    /// Decide accept/reject for an inbound identifier.
    ///
    /// Returns `None` on reject. Rejection never reveals whether the
    /// identifier was known; callers must surface one uniform close status.
    pub async fn authorize(&self, id: ClientId) -> Option<AuthorizedClient> {
        if id == self.static_id {
            return Some(AuthorizedClient {
                id,
                source: IdentitySource::Static,
            });
        }

        let backend = self.dynamic.as_ref()?;
        match backend.get(&id.to_hex()).await {
            Ok(Some(_)) => Some(AuthorizedClient {
                id,
                source: IdentitySource::Dynamic,
            }),
            Ok(None) => None,
            Err(e) => {
                warn!(client = %id, error = %e, "identity lookup failed, rejecting");
                None
            }
        }
    }
}

impl fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityStore")
            .field("static_id", &self.static_id)
            .field("dynamic", &self.dynamic.is_some())
            .finish()
    }
}
