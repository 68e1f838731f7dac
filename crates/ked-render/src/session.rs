//! Render session state machine.
//!
//! A [`RenderSession`] owns everything visible: the current render, the zoom
//! state and the shareable location. A render cycle is split around the
//! dispatch so the session lock is never held during network I/O:
//!
//! 1. [`RenderSession::begin`] encodes the request, mints a new generation and
//!    returns a [`Ticket`].
//! 2. The caller dispatches `ticket.plan()` without holding the session.
//! 3. [`RenderSession::complete`] applies the outcome, but only if the ticket
//!    still carries the current generation. Stale outcomes are dropped, which
//!    releases their blobs without touching the target.
//!
//! On failure the previous render stays visible, a persistent banner is shown
//! and the zoom is left alone.
//!
//! An image whose size the target has not laid out yet leaves the session
//! settling. The owner calls [`RenderSession::settle`] every
//! [`RenderSession::settle_interval`] until it reports done, without holding
//! the session in between.

use std::sync::Arc;
use std::time::Duration;

use ked_codec::CodecError;
use url::Url;

use crate::consts::{
    ERROR_PLACEHOLDER_SVG, IN_FLIGHT_MESSAGE, SCHEDULED_MESSAGE, SETTLE_MAX_ATTEMPTS,
    SETTLE_POLL_INTERVAL,
};
use crate::diagram::{DiagramRequest, DiagramType, DisplayKind, OutputFormat};
use crate::error::RenderError;
use crate::image::Size;
use crate::outcome::{DeferredDownload, ImagePayload, RenderOutcome};
use crate::plan::RenderPlan;
use crate::settings::{ConfigProvider, RenderSettings};
use crate::share::{self, ShareLink};
use crate::zoom::ZoomState;

/// Reads the editor state at trigger time.
pub trait SourceProvider: Send + Sync {
    fn snapshot(&self) -> DiagramRequest;
}

/// Surface that displays renders.
///
/// Only the session calls these methods, and only for the current generation.
pub trait RenderTarget: Send {
    /// Show a status line, or clear it with `None`.
    fn set_status(&mut self, status: Option<&str>);

    fn show_image(&mut self, image: &ImagePayload);

    fn show_text(&mut self, text: &str);

    fn show_download(&mut self, download: &DeferredDownload);

    /// Neutral SVG shown when the first render fails.
    fn show_placeholder(&mut self, svg: &str);

    /// Persistent error banner; stays until [`RenderTarget::clear_error`].
    fn show_error(&mut self, message: &str);

    fn clear_error(&mut self);

    /// Natural size of the displayed image once the surface has laid it out.
    fn natural_size(&self) -> Option<Size>;

    fn viewport_size(&self) -> Size;

    fn apply_zoom(&mut self, zoom: &ZoomState);

    /// New shareable location after a successful render.
    fn update_location(&mut self, location: &Url, link: &ShareLink) {
        let _ = (location, link);
    }
}

/// Notification emitted after every completed, current render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEvent {
    pub success: bool,
    /// Source text of the render.
    pub code: String,
    pub diagram_type: DiagramType,
    pub output_format: OutputFormat,
}

/// Consumer of [`RenderedEvent`]s, e.g. history tracking.
pub trait RenderObserver: Send + Sync {
    fn rendered(&self, event: &RenderedEvent);
}

/// Where the session is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    /// A trigger is waiting in the debounce scheduler.
    Scheduled,
    InFlight {
        generation: u64,
    },
}

/// Permission to complete one render cycle.
#[derive(Debug)]
pub struct Ticket {
    generation: u64,
    plan: RenderPlan,
}

impl Ticket {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn plan(&self) -> &RenderPlan {
        &self.plan
    }
}

/// Result of [`RenderSession::complete`].
#[derive(Debug)]
pub enum Completion {
    Applied,
    /// Previous render kept; the error is already on the banner.
    Failed(RenderError),
    /// A newer render owns the target; nothing was changed.
    Superseded(RenderError),
}

/// What the target currently shows.
#[derive(Debug)]
enum Displayed {
    Image(ImagePayload),
    Text(String),
    Download(DeferredDownload),
    Placeholder,
}

/// Render state for one editor.
pub struct RenderSession<T: RenderTarget> {
    target: T,
    config: Arc<dyn ConfigProvider>,
    observer: Option<Arc<dyn RenderObserver>>,
    settings: RenderSettings,
    state: RenderState,
    generation: u64,
    displayed: Option<Displayed>,
    zoom: ZoomState,
    image_size: Option<Size>,
    location: Option<Url>,
    /// A debounced trigger is waiting, even if a render is in flight.
    trigger_pending: bool,
    settling: Option<Settling>,
    settle_interval: Duration,
    settle_attempts: u32,
}

/// Image still waiting for its natural size.
#[derive(Debug, Clone, Copy)]
struct Settling {
    generation: u64,
    checks_left: u32,
}

impl<T: RenderTarget> RenderSession<T> {
    pub fn new(target: T, config: Arc<dyn ConfigProvider>) -> Self {
        let settings = config.render_settings();
        Self {
            target,
            config,
            observer: None,
            settings,
            state: RenderState::Idle,
            generation: 0,
            displayed: None,
            zoom: ZoomState::default(),
            image_size: None,
            location: None,
            trigger_pending: false,
            settling: None,
            settle_interval: SETTLE_POLL_INTERVAL,
            settle_attempts: SETTLE_MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RenderObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Keep `location` in sync with successful renders.
    #[must_use]
    pub fn with_location(mut self, location: Url) -> Self {
        self.location = Some(location);
        self
    }

    /// How often and how long to poll the target for image dimensions.
    #[must_use]
    pub fn with_settle(mut self, interval: Duration, attempts: u32) -> Self {
        self.settle_interval = interval;
        self.settle_attempts = attempts;
        self
    }

    #[must_use]
    pub fn state(&self) -> RenderState {
        self.state
    }

    /// Generation of the most recently started render.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn zoom(&self) -> &ZoomState {
        &self.zoom
    }

    #[must_use]
    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Image currently displayed, if the last applied render was an image.
    #[must_use]
    pub fn current_image(&self) -> Option<&ImagePayload> {
        match &self.displayed {
            Some(Displayed::Image(payload)) => Some(payload),
            _ => None,
        }
    }

    #[must_use]
    pub fn current_text(&self) -> Option<&str> {
        match &self.displayed {
            Some(Displayed::Text(text)) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn current_download(&self) -> Option<&DeferredDownload> {
        match &self.displayed {
            Some(Displayed::Download(download)) => Some(download),
            _ => None,
        }
    }

    /// Whether the error placeholder is shown instead of a render.
    #[must_use]
    pub fn shows_placeholder(&self) -> bool {
        matches!(self.displayed, Some(Displayed::Placeholder))
    }

    #[must_use]
    pub fn location(&self) -> Option<&Url> {
        self.location.as_ref()
    }

    /// Pause between [`RenderSession::settle`] calls.
    #[must_use]
    pub fn settle_interval(&self) -> Duration {
        self.settle_interval
    }

    /// Whether the image applied by `generation` still waits for its size.
    #[must_use]
    pub fn is_settling(&self, generation: u64) -> bool {
        self.settling
            .is_some_and(|settling| settling.generation == generation)
    }

    /// Settings read at the start of the latest cycle.
    #[must_use]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Record that a debounced trigger is pending.
    pub fn mark_scheduled(&mut self) {
        self.trigger_pending = true;
        if !matches!(self.state, RenderState::InFlight { .. }) {
            self.state = RenderState::Scheduled;
        }
        self.target.set_status(Some(SCHEDULED_MESSAGE));
    }

    /// The pending debounced trigger was dropped before it fired.
    pub fn cancel_scheduled(&mut self) {
        if !self.trigger_pending {
            return;
        }
        self.trigger_pending = false;
        match self.state {
            RenderState::Scheduled => {
                self.state = RenderState::Idle;
                self.target.set_status(None);
            }
            RenderState::InFlight { .. } => self.target.set_status(Some(IN_FLIGHT_MESSAGE)),
            RenderState::Idle => {}
        }
    }

    /// Start a render cycle for `request`.
    ///
    /// Any render still in flight becomes stale.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the source cannot be encoded. The current
    /// generation and display are unchanged in that case.
    pub fn begin(&mut self, request: DiagramRequest) -> Result<Ticket, CodecError> {
        self.settings = self.config.render_settings();
        let plan = RenderPlan::prepare(request, &self.settings)?;

        self.generation += 1;
        self.trigger_pending = false;
        self.state = RenderState::InFlight {
            generation: self.generation,
        };
        self.target.set_status(Some(IN_FLIGHT_MESSAGE));

        tracing::debug!(
            generation = self.generation,
            diagram_type = %plan.request.diagram_type,
            format = %plan.request.output_format,
            transport = %plan.transport,
            "Render started"
        );
        Ok(Ticket {
            generation: self.generation,
            plan,
        })
    }

    /// Apply the outcome of `ticket`'s dispatch.
    ///
    /// A trigger recorded while the render was in flight leaves the session
    /// [`RenderState::Scheduled`] rather than idle.
    pub fn complete(&mut self, ticket: Ticket, outcome: RenderOutcome) -> Completion {
        let Ticket { generation, plan } = ticket;

        if generation != self.generation {
            tracing::debug!(
                generation,
                current = self.generation,
                "Dropping superseded render"
            );
            drop(outcome);
            return Completion::Superseded(RenderError::Superseded { generation });
        }

        if self.trigger_pending {
            self.state = RenderState::Scheduled;
            self.target.set_status(Some(SCHEDULED_MESSAGE));
        } else {
            self.state = RenderState::Idle;
            self.target.set_status(None);
        }

        match outcome {
            RenderOutcome::Failure(err) => return self.apply_failure(&plan, err),
            RenderOutcome::Image(payload) => {
                self.target.clear_error();
                self.target.show_image(&payload);
                let reported = payload.natural_size.filter(|size| size.is_usable());
                // Replacing the previous image releases its blob.
                self.displayed = Some(Displayed::Image(payload));
                match reported {
                    Some(size) => {
                        self.settling = None;
                        self.fit_zoom(size);
                    }
                    None => {
                        self.settling = Some(Settling {
                            generation,
                            checks_left: self.settle_attempts.max(1),
                        });
                        self.settle(generation);
                    }
                }
            }
            RenderOutcome::Text(text) => {
                self.target.clear_error();
                self.target.show_text(&text);
                self.displayed = Some(Displayed::Text(text));
                self.image_size = None;
                self.settling = None;
            }
            RenderOutcome::DownloadOnly(download) => {
                self.target.clear_error();
                self.target.show_download(&download);
                self.displayed = Some(Displayed::Download(download));
                self.image_size = None;
                self.settling = None;
            }
        }

        tracing::info!(
            generation = self.generation,
            diagram_type = %plan.request.diagram_type,
            format = %plan.request.output_format,
            "Render applied"
        );
        self.emit(&plan, true);
        self.sync_location(&plan);
        Completion::Applied
    }

    fn apply_failure(&mut self, plan: &RenderPlan, err: RenderError) -> Completion {
        tracing::warn!(
            generation = self.generation,
            kind = ?err.kind(),
            error = %err,
            "Render failed"
        );
        self.target.show_error(&err.to_string());

        if self.displayed.is_none()
            && plan.request.output_format.display_kind() == DisplayKind::Image
        {
            self.target.show_placeholder(ERROR_PLACEHOLDER_SVG);
            self.displayed = Some(Displayed::Placeholder);
        }

        self.emit(plan, false);
        Completion::Failed(err)
    }

    /// Check the target once for the size of the image `generation` applied,
    /// and restore or fit the zoom when it is known.
    ///
    /// Never blocks. Returns true once there is nothing left to wait for,
    /// including when another render replaced the image. Running out of
    /// checks leaves the zoom unchanged.
    pub fn settle(&mut self, generation: u64) -> bool {
        let Some(settling) = self.settling.filter(|s| s.generation == generation) else {
            return true;
        };
        self.settling = None;

        if let Some(size) = self.target.natural_size().filter(|size| size.is_usable()) {
            self.fit_zoom(size);
            return true;
        }
        if settling.checks_left <= 1 {
            tracing::debug!(generation, "Image size never settled, zoom unchanged");
            return true;
        }
        self.settling = Some(Settling {
            checks_left: settling.checks_left - 1,
            ..settling
        });
        false
    }

    fn fit_zoom(&mut self, size: Size) {
        self.image_size = Some(size);

        // An interacted view is reapplied as is; anything else is refitted.
        if !(self.settings.preserve_zoom_on_update && self.zoom.user_has_interacted) {
            self.zoom = ZoomState::fit(size, self.target.viewport_size(), &self.settings.zoom);
        }
        self.target.apply_zoom(&self.zoom);
    }

    fn emit(&self, plan: &RenderPlan, success: bool) {
        if let Some(observer) = &self.observer {
            observer.rendered(&RenderedEvent {
                success,
                code: plan.request.source.clone(),
                diagram_type: plan.request.diagram_type,
                output_format: plan.request.output_format,
            });
        }
    }

    fn sync_location(&mut self, plan: &RenderPlan) {
        let Some(location) = &self.location else {
            return;
        };
        let (location, link) = share::sync(location, &plan.request, &plan.token, plan.transport);
        self.target.update_location(&location, &link);
        self.location = Some(location);
    }

    /// Zoom around a viewport point.
    pub fn zoom_at(&mut self, x: f64, y: f64, delta: f64) {
        self.zoom.zoom_at(x, y, delta, &self.settings.zoom);
        self.target.apply_zoom(&self.zoom);
    }

    pub fn zoom_in(&mut self) {
        let viewport = self.target.viewport_size();
        self.zoom.zoom_in(viewport, &self.settings.zoom);
        self.target.apply_zoom(&self.zoom);
    }

    pub fn zoom_out(&mut self) {
        let viewport = self.target.viewport_size();
        self.zoom.zoom_out(viewport, &self.settings.zoom);
        self.target.apply_zoom(&self.zoom);
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.zoom.pan(dx, dy);
        self.target.apply_zoom(&self.zoom);
    }

    /// Fit the current image to the viewport and forget user interaction.
    pub fn reset_zoom(&mut self) {
        match self.image_size {
            Some(size) => {
                let viewport = self.target.viewport_size();
                self.zoom.reset(size, viewport, &self.settings.zoom);
            }
            None => self.zoom = ZoomState::default(),
        }
        self.target.apply_zoom(&self.zoom);
    }

    /// Invalidate in-flight renders and release the displayed render.
    pub fn teardown(&mut self) {
        self.generation += 1;
        self.state = RenderState::Idle;
        self.trigger_pending = false;
        self.settling = None;
        self.displayed = None;
        self.image_size = None;
        self.target.set_status(None);
        tracing::debug!(generation = self.generation, "Render session torn down");
    }
}
