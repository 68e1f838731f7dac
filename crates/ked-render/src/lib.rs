//! Diagram render pipeline against a Kroki-compatible service.
//!
//! A render cycle takes the editor's current [`DiagramRequest`] through:
//! - the token codec (`ked_codec`) and transport selection ([`RenderPlan`])
//! - the dispatcher ([`KrokiClient`]), which normalizes every response into a
//!   [`RenderOutcome`]
//! - the state machine ([`RenderSession`]), which applies only the latest
//!   generation, keeps the last good render on failure and manages zoom
//!
//! [`LiveRenderer`] adds the debounce [`Scheduler`] and runs dispatches on
//! background threads.
//!
//! # Architecture
//!
//! - `diagram`: Diagram types, output formats and their compatibility
//! - `transport`: GET/POST selection and endpoint URLs
//! - `kroki`: Blocking HTTP dispatcher
//! - `blob`: Tracked image payload handles
//! - `session`: Render state machine and its collaborator traits
//! - [`share`]: Shareable location sync and restore
//! - `cache`: Optional render cache in front of the dispatcher
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ked_render::{BlobRegistry, Dispatch, KrokiClient, RenderSession, RenderSettings};
//!
//! let client = KrokiClient::new(BlobRegistry::new());
//! let mut session = RenderSession::new(target, Arc::new(RenderSettings::default()));
//!
//! let ticket = session.begin(source.snapshot())?;
//! let outcome = client.dispatch(ticket.plan());
//! session.complete(ticket, outcome);
//! ```

mod blob;
mod cache;
mod consts;
mod diagram;
mod error;
mod image;
mod kroki;
mod live;
mod outcome;
mod plan;
mod scheduler;
mod session;
mod settings;
pub mod share;
mod transport;
mod zoom;

pub use blob::{BlobHandle, BlobId, BlobRegistry};
pub use cache::{CachedDispatch, CachedRender, DiagramCache, DiagramKey, MemoryCache, NullCache};
pub use consts::{
    DEFAULT_CACHE_ENTRIES, DEFAULT_DEBOUNCE_DELAY, DEFAULT_SERVER_URL, DEFAULT_TIMEOUT,
    DEFAULT_URL_LENGTH_THRESHOLD, ERROR_PLACEHOLDER_SVG, IN_FLIGHT_MESSAGE, SCHEDULED_MESSAGE,
};
pub use diagram::{DiagramRequest, DiagramType, DisplayKind, OutputFormat};
pub use error::{FailureKind, RenderError};
pub use image::{Size, natural_size};
pub use kroki::{Dispatch, KrokiClient, create_agent};
pub use live::{LiveRenderer, SharedSession};
pub use outcome::{DeferredDownload, Fetch, ImagePayload, RenderOutcome};
pub use plan::RenderPlan;
pub use scheduler::Scheduler;
pub use session::{
    Completion, RenderObserver, RenderSession, RenderState, RenderTarget, RenderedEvent,
    SourceProvider, Ticket,
};
pub use settings::{ConfigProvider, RenderSettings, ZoomLimits};
pub use share::{RestoredLink, ShareLink};
pub use transport::{PostFormat, Transport, TransportPolicy};
pub use zoom::{ZoomSnapshot, ZoomState};
