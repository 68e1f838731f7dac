//! File-backed editor state and render surface.
//!
//! [`EditorBuffer`] plays the editor: it holds the current source, type and
//! format. [`FileTarget`] plays the preview pane: every applied render is
//! written to the output file.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use ked_render::{
    DeferredDownload, DiagramRequest, ImagePayload, RenderObserver, RenderTarget, RenderedEvent,
    ShareLink, Size, SourceProvider, ZoomState,
};
use url::Url;

use crate::output::Output;

/// Current editor contents.
pub(crate) struct EditorBuffer {
    request: Mutex<DiagramRequest>,
}

impl EditorBuffer {
    pub(crate) fn new(request: DiagramRequest) -> Self {
        Self {
            request: Mutex::new(request),
        }
    }

    /// Replace the source text. Returns false if it did not change.
    pub(crate) fn set_source(&self, source: String) -> bool {
        let mut request = self.request.lock().unwrap_or_else(PoisonError::into_inner);
        if request.source == source {
            return false;
        }
        request.source = source;
        true
    }
}

impl SourceProvider for EditorBuffer {
    fn snapshot(&self) -> DiagramRequest {
        self.request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Render surface writing each applied render to a file.
pub(crate) struct FileTarget {
    path: PathBuf,
    viewport: Size,
    output: Output,
    image_size: Option<Size>,
    zoom: Option<ZoomState>,
    error: Option<String>,
    location: Option<Url>,
    share: Option<ShareLink>,
    write_error: Option<io::Error>,
}

impl FileTarget {
    pub(crate) fn new(path: PathBuf, viewport: Size) -> Self {
        Self {
            path,
            viewport,
            output: Output::new(),
            image_size: None,
            zoom: None,
            error: None,
            location: None,
            share: None,
            write_error: None,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Error banner currently shown, if any.
    pub(crate) fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Zoom applied with the last image.
    pub(crate) fn zoom(&self) -> Option<&ZoomState> {
        self.zoom.as_ref()
    }

    /// Location and share link from the last successful render.
    pub(crate) fn share(&self) -> Option<(&Url, &ShareLink)> {
        self.location.as_ref().zip(self.share.as_ref())
    }

    /// Take the error from the last failed write, if any.
    pub(crate) fn take_write_error(&mut self) -> Option<io::Error> {
        self.write_error.take()
    }

    fn write(&mut self, bytes: &[u8]) {
        if let Err(e) = std::fs::write(&self.path, bytes) {
            tracing::error!(path = %self.path.display(), error = %e, "Failed to write render");
            self.write_error = Some(e);
        }
    }
}

impl RenderTarget for FileTarget {
    fn set_status(&mut self, status: Option<&str>) {
        if let Some(status) = status {
            tracing::debug!(status, "Render status");
        }
    }

    fn show_image(&mut self, image: &ImagePayload) {
        self.write(image.blob.bytes());
        self.image_size = image.natural_size;
    }

    fn show_text(&mut self, text: &str) {
        self.write(text.as_bytes());
        self.image_size = None;
    }

    fn show_download(&mut self, download: &DeferredDownload) {
        tracing::info!(
            filename = %download.filename(),
            href = download.href().unwrap_or("-"),
            "Download ready"
        );
        self.image_size = None;
    }

    fn show_placeholder(&mut self, svg: &str) {
        // Only an SVG file can hold the placeholder, and an existing file
        // holds the last good render.
        if self.path.extension().is_some_and(|ext| ext == "svg") && !self.path.exists() {
            self.write(svg.as_bytes());
        }
    }

    fn show_error(&mut self, message: &str) {
        self.output.error(&format!("Render failed: {message}"));
        self.error = Some(message.to_owned());
    }

    fn clear_error(&mut self) {
        if self.error.take().is_some() {
            self.output.success("Render recovered");
        }
    }

    fn natural_size(&self) -> Option<Size> {
        self.image_size
    }

    fn viewport_size(&self) -> Size {
        self.viewport
    }

    fn apply_zoom(&mut self, zoom: &ZoomState) {
        tracing::debug!(
            scale = %zoom.percent_label(),
            transform = %zoom.css_transform(),
            "Zoom applied"
        );
        self.zoom = Some(*zoom);
    }

    fn update_location(&mut self, location: &Url, link: &ShareLink) {
        self.location = Some(location.clone());
        self.share = Some(link.clone());
    }
}

/// Reports completed renders on the terminal.
pub(crate) struct ReportObserver {
    output: Output,
    path: PathBuf,
}

impl ReportObserver {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            output: Output::new(),
            path,
        }
    }
}

impl RenderObserver for ReportObserver {
    fn rendered(&self, event: &RenderedEvent) {
        if event.success {
            self.output.success(&format!(
                "Rendered {} as {} -> {}",
                event.diagram_type,
                event.output_format,
                self.path.display()
            ));
        } else {
            tracing::debug!(
                diagram_type = %event.diagram_type,
                format = %event.output_format,
                "Render did not apply"
            );
        }
    }
}
