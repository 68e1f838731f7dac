//! Render settings consumed by the pipeline.
//!
//! The pipeline never reads configuration files itself. It asks a
//! [`ConfigProvider`] for a [`RenderSettings`] snapshot at the start of each
//! render cycle, so settings changed between cycles take effect on the next one.

use std::time::Duration;

use crate::consts::{
    DEFAULT_DEBOUNCE_DELAY, DEFAULT_FIT_PADDING, DEFAULT_MAX_SCALE, DEFAULT_MIN_SCALE,
    DEFAULT_SCALE_STEP, DEFAULT_SERVER_URL, DEFAULT_TIMEOUT, DEFAULT_URL_LENGTH_THRESHOLD,
};
use crate::transport::{PostFormat, TransportPolicy};

/// Zoom limits and fit padding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLimits {
    pub min_scale: f64,
    pub max_scale: f64,
    /// Increment used by zoom in/out controls.
    pub scale_step: f64,
    /// Padding (px) on every side when fitting to the viewport.
    pub fit_padding: f64,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            min_scale: DEFAULT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
            scale_step: DEFAULT_SCALE_STEP,
            fit_padding: DEFAULT_FIT_PADDING,
        }
    }
}

/// Settings snapshot for one render cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    /// Base URL of the Kroki-compatible service, without trailing slash.
    pub server_url: String,
    /// Send every request as POST regardless of URL length.
    pub always_use_post: bool,
    /// Maximum GET URL length before switching to POST.
    pub url_length_threshold: usize,
    /// Timeout applied to every dispatched request.
    pub request_timeout: Duration,
    pub post_format: PostFormat,
    /// Trailing delay used to coalesce edit bursts.
    pub debounce_delay: Duration,
    /// Restore the user's zoom/pan after re-renders once they have interacted.
    pub preserve_zoom_on_update: bool,
    pub zoom: ZoomLimits,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_owned(),
            always_use_post: false,
            url_length_threshold: DEFAULT_URL_LENGTH_THRESHOLD,
            request_timeout: DEFAULT_TIMEOUT,
            post_format: PostFormat::Plain,
            debounce_delay: DEFAULT_DEBOUNCE_DELAY,
            preserve_zoom_on_update: true,
            zoom: ZoomLimits::default(),
        }
    }
}

impl RenderSettings {
    /// Settings for the given server with all other values defaulted.
    #[must_use]
    pub fn for_server(server_url: &str) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_owned(),
            ..Self::default()
        }
    }

    /// Transport selection inputs derived from these settings.
    #[must_use]
    pub fn transport_policy(&self) -> TransportPolicy {
        TransportPolicy {
            always_use_post: self.always_use_post,
            url_length_threshold: self.url_length_threshold,
            post_format: self.post_format,
        }
    }
}

/// Source of render settings.
///
/// Read once per render cycle.
pub trait ConfigProvider: Send + Sync {
    fn render_settings(&self) -> RenderSettings;
}

impl ConfigProvider for RenderSettings {
    fn render_settings(&self) -> RenderSettings {
        self.clone()
    }
}
