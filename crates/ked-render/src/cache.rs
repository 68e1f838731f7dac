//! Render caching.
//!
//! - [`DiagramCache`]: trait for cache implementations
//! - [`NullCache`]: no-op cache (caching disabled)
//! - [`MemoryCache`]: bounded in-memory cache evicting the oldest entry
//! - [`CachedDispatch`]: dispatcher decorator consulting a cache first

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use sha2::{Digest, Sha256};

use crate::blob::BlobRegistry;
use crate::diagram::DiagramRequest;
use crate::image::Size;
use crate::kroki::Dispatch;
use crate::outcome::{ImagePayload, RenderOutcome};
use crate::plan::RenderPlan;

/// Diagram parameters for cache key computation.
#[derive(Debug, Clone, Copy)]
pub struct DiagramKey<'a> {
    pub source: &'a str,
    /// Kroki endpoint (e.g., "plantuml", "mermaid").
    pub endpoint: &'a str,
    pub format: &'a str,
}

impl<'a> DiagramKey<'a> {
    #[must_use]
    pub fn for_request(request: &'a DiagramRequest) -> Self {
        Self {
            source: &request.source,
            endpoint: request.diagram_type.kroki_endpoint(),
            format: request.output_format.as_str(),
        }
    }

    /// SHA-256 of `"{endpoint}:{format}:{source}"`, hex encoded.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let content = format!("{}:{}:{}", self.endpoint, self.format, self.source);
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A successful render kept for reuse.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedRender {
    Image {
        bytes: Arc<[u8]>,
        natural_size: Option<Size>,
    },
    Text(Arc<str>),
}

/// Trait for render cache implementations.
pub trait DiagramCache: Send + Sync {
    fn get(&self, key: DiagramKey<'_>) -> Option<CachedRender>;

    fn set(&self, key: DiagramKey<'_>, render: CachedRender);
}

/// No-op cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl DiagramCache for NullCache {
    fn get(&self, _key: DiagramKey<'_>) -> Option<CachedRender> {
        None
    }

    fn set(&self, _key: DiagramKey<'_>, _render: CachedRender) {}
}

#[derive(Debug, Default)]
struct MemoryEntries {
    renders: HashMap<String, CachedRender>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
}

/// Bounded in-memory cache.
///
/// Holds at most `capacity` entries; inserting into a full cache evicts the
/// oldest entry.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<MemoryEntries>,
    capacity: usize,
}

impl MemoryCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(MemoryEntries::default()),
            capacity,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .renders
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagramCache for MemoryCache {
    fn get(&self, key: DiagramKey<'_>) -> Option<CachedRender> {
        let hash = key.compute_hash();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .renders
            .get(&hash)
            .cloned()
    }

    fn set(&self, key: DiagramKey<'_>, render: CachedRender) {
        if self.capacity == 0 {
            return;
        }
        let hash = key.compute_hash();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if entries.renders.insert(hash.clone(), render).is_some() {
            return;
        }
        entries.order.push_back(hash);
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.renders.remove(&oldest);
                tracing::trace!(key = %oldest, "Evicted cached render");
            }
        }
    }
}

/// Dispatcher that answers from a cache before delegating.
///
/// Successful image and text outcomes are stored; failures and download-only
/// handles are never cached. Cached images are re-registered as new blobs so
/// ownership rules stay the same as for fresh renders.
pub struct CachedDispatch {
    inner: Arc<dyn Dispatch>,
    cache: Arc<dyn DiagramCache>,
    blobs: BlobRegistry,
}

impl CachedDispatch {
    pub fn new(inner: Arc<dyn Dispatch>, cache: Arc<dyn DiagramCache>, blobs: BlobRegistry) -> Self {
        Self {
            inner,
            cache,
            blobs,
        }
    }
}

impl Dispatch for CachedDispatch {
    fn dispatch(&self, plan: &RenderPlan) -> RenderOutcome {
        let key = DiagramKey::for_request(&plan.request);
        let format = plan.request.output_format;

        if let Some(cached) = self.cache.get(key) {
            tracing::debug!(
                diagram_type = %plan.request.diagram_type,
                format = %format,
                "Render cache hit"
            );
            return match cached {
                CachedRender::Image {
                    bytes,
                    natural_size,
                } => RenderOutcome::Image(ImagePayload {
                    blob: self.blobs.create(bytes.to_vec(), format.mime_type()),
                    format,
                    natural_size,
                }),
                CachedRender::Text(text) => RenderOutcome::Text(text.as_ref().to_owned()),
            };
        }

        let outcome = self.inner.dispatch(plan);
        match &outcome {
            RenderOutcome::Image(payload) => self.cache.set(
                key,
                CachedRender::Image {
                    bytes: Arc::from(payload.blob.bytes()),
                    natural_size: payload.natural_size,
                },
            ),
            RenderOutcome::Text(text) => self.cache.set(key, CachedRender::Text(Arc::from(text.as_str()))),
            RenderOutcome::DownloadOnly(_) | RenderOutcome::Failure(_) => {}
        }
        outcome
    }
}
