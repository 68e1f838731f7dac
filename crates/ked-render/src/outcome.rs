//! Normalized results of a dispatch.

use std::fmt;
use std::sync::Arc;

use crate::blob::BlobHandle;
use crate::diagram::OutputFormat;
use crate::error::RenderError;
use crate::image::Size;
use crate::plan::RenderPlan;

/// A rendered image held in a tracked blob.
#[derive(Debug)]
pub struct ImagePayload {
    pub blob: BlobHandle,
    pub format: OutputFormat,
    /// Natural dimensions probed from the encoded image, when recognizable.
    pub natural_size: Option<Size>,
}

/// Result of one dispatch, consumed exactly once by the render session.
#[derive(Debug)]
pub enum RenderOutcome {
    Image(ImagePayload),
    Text(String),
    /// Download-only format; nothing has been fetched yet.
    DownloadOnly(DeferredDownload),
    Failure(RenderError),
}

impl RenderOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

/// Performs the network fetch behind a [`DeferredDownload`].
pub trait Fetch: Send + Sync {
    fn fetch(&self, plan: &RenderPlan) -> Result<BlobHandle, RenderError>;
}

/// Handle for a download-only render.
///
/// Holds the prepared request and fetches it (GET or POST, as planned) only
/// when [`DeferredDownload::fetch`] is called.
#[derive(Clone)]
pub struct DeferredDownload {
    plan: RenderPlan,
    fetcher: Arc<dyn Fetch>,
}

impl DeferredDownload {
    pub fn new(plan: RenderPlan, fetcher: Arc<dyn Fetch>) -> Self {
        Self { plan, fetcher }
    }

    /// Direct link for GET downloads. POST downloads have none.
    #[must_use]
    pub fn href(&self) -> Option<&str> {
        self.plan.share_url()
    }

    /// Suggested filename, e.g. `diagram.pdf`.
    #[must_use]
    pub fn filename(&self) -> String {
        self.plan.request.download_filename()
    }

    #[must_use]
    pub fn plan(&self) -> &RenderPlan {
        &self.plan
    }

    /// Fetch the rendered file now.
    pub fn fetch(&self) -> Result<BlobHandle, RenderError> {
        tracing::debug!(url = %self.plan.url, transport = %self.plan.transport, "Fetching deferred download");
        self.fetcher.fetch(&self.plan)
    }
}

impl fmt::Debug for DeferredDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredDownload")
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}
