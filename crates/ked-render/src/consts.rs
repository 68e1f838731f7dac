//! Internal constants for the render pipeline.

use std::time::Duration;

/// Default Kroki server.
pub const DEFAULT_SERVER_URL: &str = "https://kroki.io";

/// Default GET URL length above which requests switch to POST.
pub const DEFAULT_URL_LENGTH_THRESHOLD: usize = 4096;

/// Default HTTP timeout for Kroki requests (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default debounce delay for edit-triggered renders.
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(1000);

/// Padding (px) kept around the diagram when fitting it to the viewport.
pub const DEFAULT_FIT_PADDING: f64 = 40.0;

pub const DEFAULT_MIN_SCALE: f64 = 0.1;
pub const DEFAULT_MAX_SCALE: f64 = 5.0;
pub const DEFAULT_SCALE_STEP: f64 = 0.1;

/// Interval between natural-size checks while an image settles.
pub const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Checks before giving up on natural size; the zoom is then left unchanged.
pub const SETTLE_MAX_ATTEMPTS: u32 = 20;

/// Default number of rendered payloads kept in the render cache.
pub const DEFAULT_CACHE_ENTRIES: usize = 50;

/// Loading message shown while a debounced render is pending.
pub const SCHEDULED_MESSAGE: &str = "Diagram update scheduled...";

/// Loading message shown while a render is in flight.
pub const IN_FLIGHT_MESSAGE: &str = "Generating diagram...";

/// Placeholder shown when the very first image render fails.
pub const ERROR_PLACEHOLDER_SVG: &str = r##"<svg width="400" height="300" xmlns="http://www.w3.org/2000/svg"><rect width="100%" height="100%" fill="#f8f9fa" stroke="#dee2e6" stroke-width="1"/><text x="50%" y="50%" dominant-baseline="middle" text-anchor="middle" fill="#9ca3af" font-family="Arial" font-size="14">Previous diagram (error occurred)</text></svg>"##;
