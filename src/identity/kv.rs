//! Key-value backend for dynamically managed identities
//!
//! The tunnel consults the backend only on static-identifier mismatch, with
//! the 32-character hex form as key; any non-null value accepts. Mutation
//! happens through the management surface. Implementations must serialise
//! writes (or provide atomic semantics) and keep reads cheap, since the
//! lookup sits on the session hot path.

use async_trait::async_trait;
use dashmap::DashMap;

use super::error::KvError;

/// A key-value store holding dynamically managed identities.
///
/// Keys are the bare 32-character lowercase hex identifier form; values are
/// opaque metadata (the management surface stores JSON account records).
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Look up a key; `None` means absent.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Insert or replace a key.
    async fn put(&self, key: &str, value: String) -> Result<(), KvError>;

    /// Remove a key; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// List all entries.
    async fn list(&self) -> Result<Vec<(String, String)>, KvError>;
}

/// In-memory backend over a sharded concurrent map.
///
/// Reads are lock-free on the hot path; writes are atomic per key. Entries
/// live for the lifetime of the process (account-metadata persistence is an
/// external concern).
#[derive(Debug, Default)]
pub struct MemoryKvBackend {
    entries: DashMap<String, String>,
}

impl MemoryKvBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the backend is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueBackend for MemoryKvBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: String) -> Result<(), KvError> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn list(&self) -> Result<Vec<(String, String)>, KvError> {
        Ok(self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }
}
