//! Tracked binary payload handles.
//!
//! Every rendered image is held in a [`BlobHandle`] created by a
//! [`BlobRegistry`]. Handles are not `Clone`: ownership moves from the
//! dispatcher to the render session, and the handle is released exactly once
//! when its owner drops it (superseded by a newer image, discarded as a stale
//! result, or at teardown). The registry counts live handles so leaks are
//! observable.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Identifier of a registered blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobId(u64);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:{}", self.0)
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    live: Mutex<BTreeSet<BlobId>>,
}

impl RegistryInner {
    fn release(&self, id: BlobId) {
        let removed = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        debug_assert!(removed, "{id} released twice");
        tracing::trace!(%id, "Released blob");
    }
}

/// Registry of live blob handles.
///
/// Cheap to clone; clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct BlobRegistry {
    inner: Arc<RegistryInner>,
}

impl BlobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payload and return its handle.
    pub fn create(&self, bytes: Vec<u8>, mime_type: impl Into<String>) -> BlobHandle {
        let id = BlobId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        tracing::trace!(%id, len = bytes.len(), "Created blob");

        BlobHandle {
            id,
            bytes,
            mime_type: mime_type.into(),
            registry: Arc::clone(&self.inner),
        }
    }

    /// Number of handles created and not yet released.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the handle with this id is still alive.
    #[must_use]
    pub fn is_live(&self, id: BlobId) -> bool {
        self.inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }
}

/// Owned handle to a registered binary payload.
///
/// Dropping the handle releases it from its registry.
pub struct BlobHandle {
    id: BlobId,
    bytes: Vec<u8>,
    mime_type: String,
    registry: Arc<RegistryInner>,
}

impl BlobHandle {
    #[must_use]
    pub fn id(&self) -> BlobId {
        self.id
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Release the handle now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for BlobHandle {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobHandle")
            .field("id", &self.id)
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish_non_exhaustive()
    }
}
