//! Threaded driver tying the scheduler, session and dispatcher together.
//!
//! Edits go through the debounce [`Scheduler`]; each fired trigger snapshots
//! the source, starts a cycle on the session and dispatches on its own
//! thread. Several dispatches may be in flight at once; the session's
//! generation check decides which one is applied.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use ked_codec::CodecError;

use crate::kroki::Dispatch;
use crate::scheduler::Scheduler;
use crate::session::{Completion, RenderSession, RenderTarget, SourceProvider};

/// Session shared between the driver and its dispatch threads.
pub type SharedSession<T> = Arc<Mutex<RenderSession<T>>>;

fn lock<T: RenderTarget>(session: &Mutex<RenderSession<T>>) -> MutexGuard<'_, RenderSession<T>> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait for the image applied by `generation` to report its size. The
/// session is only locked for each check, never across the sleep.
fn settle<T: RenderTarget>(session: &Mutex<RenderSession<T>>, generation: u64) {
    loop {
        let interval = {
            let session = lock(session);
            if !session.is_settling(generation) {
                return;
            }
            session.settle_interval()
        };
        thread::sleep(interval);
        if lock(session).settle(generation) {
            return;
        }
    }
}

/// Everything one render cycle needs, cheap to clone into triggers.
struct Cycle<T: RenderTarget> {
    session: SharedSession<T>,
    source: Arc<dyn SourceProvider>,
    dispatcher: Arc<dyn Dispatch>,
    in_flight: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<T: RenderTarget> Clone for Cycle<T> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            source: Arc::clone(&self.source),
            dispatcher: Arc::clone(&self.dispatcher),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<T: RenderTarget + 'static> Cycle<T> {
    /// Run a full cycle on the calling thread.
    fn run(&self) -> Result<Completion, CodecError> {
        let request = self.source.snapshot();
        let ticket = lock(&self.session).begin(request)?;
        let generation = ticket.generation();
        let outcome = self.dispatcher.dispatch(ticket.plan());
        let completion = lock(&self.session).complete(ticket, outcome);
        settle(&self.session, generation);
        Ok(completion)
    }

    /// Start a cycle and dispatch it on a new thread.
    fn spawn(&self) {
        let request = self.source.snapshot();
        let ticket = match lock(&self.session).begin(request) {
            Ok(ticket) => ticket,
            Err(err) => {
                tracing::error!(error = %err, "Failed to encode diagram source");
                return;
            }
        };

        let session = Arc::clone(&self.session);
        let dispatcher = Arc::clone(&self.dispatcher);
        // Held across the spawn so `wait_idle` never misses a started dispatch.
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|handle| !handle.is_finished());
        let handle = thread::spawn(move || {
            let generation = ticket.generation();
            let outcome = dispatcher.dispatch(ticket.plan());
            let completion = lock(&session).complete(ticket, outcome);
            settle(&session, generation);
            tracing::debug!(generation, ?completion, "Render cycle finished");
        });
        in_flight.push(handle);
    }
}

/// Debounced, concurrent renderer for one editor.
pub struct LiveRenderer<T: RenderTarget + 'static> {
    cycle: Cycle<T>,
    scheduler: Scheduler,
    auto_refresh: bool,
}

impl<T: RenderTarget + 'static> LiveRenderer<T> {
    /// Create a renderer with auto refresh enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler thread cannot be spawned.
    pub fn new(
        session: RenderSession<T>,
        source: Arc<dyn SourceProvider>,
        dispatcher: Arc<dyn Dispatch>,
    ) -> std::io::Result<Self> {
        Ok(Self {
            cycle: Cycle {
                session: Arc::new(Mutex::new(session)),
                source,
                dispatcher,
                in_flight: Arc::new(Mutex::new(Vec::new())),
            },
            scheduler: Scheduler::new()?,
            auto_refresh: true,
        })
    }

    /// Whether edits schedule renders on their own.
    #[must_use]
    pub fn with_auto_refresh(mut self, auto_refresh: bool) -> Self {
        self.auto_refresh = auto_refresh;
        self
    }

    #[must_use]
    pub fn session(&self) -> &SharedSession<T> {
        &self.cycle.session
    }

    /// The source changed. Schedules a debounced render when auto refresh is on.
    pub fn edited(&self) {
        if !self.auto_refresh {
            return;
        }
        let delay = {
            let mut session = lock(&self.cycle.session);
            session.mark_scheduled();
            session.settings().debounce_delay
        };
        let cycle = self.cycle.clone();
        self.scheduler.schedule(delay, move || cycle.spawn());
    }

    /// Deliberate action (type or format change, explicit refresh): render
    /// now, cancelling any pending debounced render.
    pub fn trigger_now(&self) {
        let cycle = self.cycle.clone();
        self.scheduler.fire_now(move || cycle.spawn());
    }

    /// Cancel the pending debounced render, if any.
    pub fn cancel_pending(&self) -> bool {
        let cancelled = self.scheduler.cancel();
        lock(&self.cycle.session).cancel_scheduled();
        cancelled
    }

    /// Render on the calling thread, bypassing the scheduler.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the source cannot be encoded.
    pub fn render_blocking(&self) -> Result<Completion, CodecError> {
        self.scheduler.cancel();
        self.cycle.run()
    }

    /// Block until every dispatch started so far has completed.
    pub fn wait_idle(&self) {
        let handles: Vec<_> = self
            .cycle
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("Render thread panicked");
            }
        }
    }

    /// Cancel pending work and release the session's render.
    ///
    /// Dispatches still in flight complete as superseded.
    pub fn teardown(&self) {
        self.scheduler.cancel();
        lock(&self.cycle.session).teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::blob::BlobRegistry;
    use crate::diagram::{DiagramRequest, DiagramType, OutputFormat};
    use crate::image::Size;
    use crate::outcome::{DeferredDownload, ImagePayload, RenderOutcome};
    use crate::plan::RenderPlan;
    use crate::session::RenderState;
    use crate::settings::RenderSettings;
    use crate::zoom::ZoomState;

    #[derive(Default)]
    struct MemoryTarget {
        image: Option<Vec<u8>>,
        status: Option<String>,
        natural: Option<Size>,
    }

    impl RenderTarget for MemoryTarget {
        fn set_status(&mut self, status: Option<&str>) {
            self.status = status.map(str::to_owned);
        }
        fn show_image(&mut self, image: &ImagePayload) {
            self.image = Some(image.blob.bytes().to_vec());
        }
        fn show_text(&mut self, _text: &str) {}
        fn show_download(&mut self, _download: &DeferredDownload) {}
        fn show_placeholder(&mut self, _svg: &str) {}
        fn show_error(&mut self, _message: &str) {}
        fn clear_error(&mut self) {}
        fn natural_size(&self) -> Option<Size> {
            self.natural
        }
        fn viewport_size(&self) -> Size {
            Size::new(100.0, 100.0)
        }
        fn apply_zoom(&mut self, _zoom: &ZoomState) {}
    }

    /// Source whose text can change between snapshots.
    struct EditableSource(Mutex<String>);

    impl SourceProvider for EditableSource {
        fn snapshot(&self) -> DiagramRequest {
            DiagramRequest::new(
                self.0.lock().unwrap().clone(),
                DiagramType::GraphViz,
                OutputFormat::Svg,
            )
        }
    }

    /// Echoes the source as the image; sources starting with "slow" wait for
    /// a release signal first, and "unsized" ones carry no dimensions.
    struct GatedDispatch {
        blobs: BlobRegistry,
        calls: AtomicUsize,
        gate: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl Dispatch for GatedDispatch {
        fn dispatch(&self, plan: &RenderPlan) -> RenderOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if plan.request.source.starts_with("slow") {
                let gate = self.gate.lock().unwrap().take();
                if let Some(gate) = gate {
                    gate.recv_timeout(Duration::from_secs(5)).unwrap();
                }
            }
            RenderOutcome::Image(ImagePayload {
                blob: self
                    .blobs
                    .create(plan.request.source.clone().into_bytes(), "image/svg+xml"),
                format: OutputFormat::Svg,
                natural_size: (!plan.request.source.starts_with("unsized"))
                    .then(|| Size::new(10.0, 10.0)),
            })
        }
    }

    fn renderer(
        source: &Arc<EditableSource>,
        dispatch: &Arc<GatedDispatch>,
        debounce: Duration,
    ) -> LiveRenderer<MemoryTarget> {
        settling_renderer(source, dispatch, debounce, Duration::ZERO, 1)
    }

    fn settling_renderer(
        source: &Arc<EditableSource>,
        dispatch: &Arc<GatedDispatch>,
        debounce: Duration,
        settle_interval: Duration,
        settle_attempts: u32,
    ) -> LiveRenderer<MemoryTarget> {
        let settings = RenderSettings {
            debounce_delay: debounce,
            ..RenderSettings::for_server("http://kroki.local")
        };
        let session = RenderSession::new(MemoryTarget::default(), Arc::new(settings))
            .with_settle(settle_interval, settle_attempts);
        LiveRenderer::new(
            session,
            Arc::clone(source) as Arc<dyn SourceProvider>,
            Arc::clone(dispatch) as Arc<dyn Dispatch>,
        )
        .unwrap()
    }

    fn gated(blobs: &BlobRegistry) -> (Arc<GatedDispatch>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let dispatch = Arc::new(GatedDispatch {
            blobs: blobs.clone(),
            calls: AtomicUsize::new(0),
            gate: Mutex::new(Some(rx)),
        });
        (dispatch, tx)
    }

    fn wait_for_calls(dispatch: &GatedDispatch, expected: usize) {
        for _ in 0..200 {
            if dispatch.calls.load(Ordering::SeqCst) >= expected {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("dispatch was not called {expected} times");
    }

    #[test]
    fn test_edit_burst_renders_once() {
        let blobs = BlobRegistry::new();
        let (dispatch, _gate) = gated(&blobs);
        let source = Arc::new(EditableSource(Mutex::new(String::new())));
        let live = renderer(&source, &dispatch, Duration::from_millis(30));

        for text in ["a", "a ->", "a -> b"] {
            *source.0.lock().unwrap() = text.to_owned();
            live.edited();
        }
        wait_for_calls(&dispatch, 1);
        live.wait_idle();

        assert_eq!(dispatch.calls.load(Ordering::SeqCst), 1);
        let session = live.session().lock().unwrap();
        assert_eq!(session.target().image.as_deref(), Some(&b"a -> b"[..]));
        assert_eq!(session.target().status, None);
    }

    #[test]
    fn test_slow_earlier_render_does_not_clobber_later() {
        let blobs = BlobRegistry::new();
        let (dispatch, release_slow) = gated(&blobs);
        let source = Arc::new(EditableSource(Mutex::new("slow R1".to_owned())));
        let live = renderer(&source, &dispatch, Duration::from_millis(10));

        live.trigger_now();
        wait_for_calls(&dispatch, 1);

        *source.0.lock().unwrap() = "fast R2".to_owned();
        live.trigger_now();
        wait_for_calls(&dispatch, 2);

        // Let R2 finish first, then release R1.
        thread::sleep(Duration::from_millis(50));
        release_slow.send(()).unwrap();
        live.wait_idle();

        let session = live.session().lock().unwrap();
        assert_eq!(session.target().image.as_deref(), Some(&b"fast R2"[..]));
        assert_eq!(blobs.live_count(), 1);
    }

    #[test]
    fn test_auto_refresh_off_ignores_edits() {
        let blobs = BlobRegistry::new();
        let (dispatch, _gate) = gated(&blobs);
        let source = Arc::new(EditableSource(Mutex::new("a".to_owned())));
        let live = renderer(&source, &dispatch, Duration::from_millis(1)).with_auto_refresh(false);

        live.edited();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(dispatch.calls.load(Ordering::SeqCst), 0);

        assert!(matches!(live.render_blocking().unwrap(), Completion::Applied));
        assert_eq!(dispatch.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_releases_blobs() {
        let blobs = BlobRegistry::new();
        let (dispatch, _gate) = gated(&blobs);
        let source = Arc::new(EditableSource(Mutex::new("a".to_owned())));
        let live = renderer(&source, &dispatch, Duration::from_millis(1));

        live.render_blocking().unwrap();
        assert_eq!(blobs.live_count(), 1);
        live.teardown();
        assert_eq!(blobs.live_count(), 0);
    }

    #[test]
    fn test_session_unlocked_while_image_settles() {
        let blobs = BlobRegistry::new();
        let (dispatch, _gate) = gated(&blobs);
        let source = Arc::new(EditableSource(Mutex::new("unsized".to_owned())));
        // Up to a second of size checks.
        let live = settling_renderer(
            &source,
            &dispatch,
            Duration::from_millis(1),
            Duration::from_millis(20),
            50,
        );

        let started = Instant::now();
        live.trigger_now();
        loop {
            {
                let session = live.session().lock().unwrap();
                if session.current_image().is_some() {
                    assert!(session.is_settling(1));
                    break;
                }
            }
            assert!(started.elapsed() < Duration::from_secs(2), "render never applied");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(started.elapsed() < Duration::from_millis(500));

        live.session().lock().unwrap().target_mut().natural = Some(Size::new(10.0, 10.0));
        live.wait_idle();

        let session = live.session().lock().unwrap();
        assert!(!session.is_settling(1));
        // 10x10 centered in the 100x100 viewport at scale 1.
        assert!((session.zoom().translate_x - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_edit_during_render_stays_scheduled() {
        let blobs = BlobRegistry::new();
        let (dispatch, release_slow) = gated(&blobs);
        let source = Arc::new(EditableSource(Mutex::new("slow R1".to_owned())));
        let live = renderer(&source, &dispatch, Duration::from_secs(5));

        live.trigger_now();
        wait_for_calls(&dispatch, 1);
        live.edited();
        release_slow.send(()).unwrap();
        live.wait_idle();

        assert_eq!(live.session().lock().unwrap().state(), RenderState::Scheduled);
        assert!(live.cancel_pending());
        let session = live.session().lock().unwrap();
        assert_eq!(session.state(), RenderState::Idle);
        assert_eq!(session.target().status, None);
    }
}
