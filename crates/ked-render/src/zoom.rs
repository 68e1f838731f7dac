//! Viewport zoom and pan state.
//!
//! The transform maps image coordinates to viewport coordinates as
//! `viewport = image * scale + translate`. Any user interaction sets
//! `user_has_interacted`, which tells the render session to keep the view
//! across re-renders instead of refitting.

use crate::image::Size;
use crate::settings::ZoomLimits;

/// Zoom/pan transform plus the interaction flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomState {
    pub scale: f64,
    pub translate_x: f64,
    pub translate_y: f64,
    /// Set by zoom/pan gestures, cleared by [`ZoomState::reset`].
    pub user_has_interacted: bool,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            translate_x: 0.0,
            translate_y: 0.0,
            user_has_interacted: false,
        }
    }
}

/// Captured transform without the interaction flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomSnapshot {
    pub scale: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl ZoomState {
    /// Transform that centers `image` in `viewport` and fits it inside the
    /// padded area, never upscaling past 100%.
    #[must_use]
    pub fn fit(image: Size, viewport: Size, limits: &ZoomLimits) -> Self {
        let available_width = viewport.width - limits.fit_padding * 2.0;
        let available_height = viewport.height - limits.fit_padding * 2.0;

        let scale = (available_width / image.width)
            .min(available_height / image.height)
            .min(1.0);
        // A viewport smaller than the padding still gets a visible diagram.
        let scale = if scale.is_finite() && scale > 0.0 {
            scale.max(limits.min_scale.min(1.0))
        } else {
            limits.min_scale.min(1.0)
        };

        Self {
            scale,
            translate_x: (viewport.width - image.width * scale) / 2.0,
            translate_y: (viewport.height - image.height * scale) / 2.0,
            user_has_interacted: false,
        }
    }

    /// Refit to the viewport and clear the interaction flag.
    pub fn reset(&mut self, image: Size, viewport: Size, limits: &ZoomLimits) {
        *self = Self::fit(image, viewport, limits);
    }

    #[must_use]
    pub fn snapshot(&self) -> ZoomSnapshot {
        ZoomSnapshot {
            scale: self.scale,
            translate_x: self.translate_x,
            translate_y: self.translate_y,
        }
    }

    /// Zoom by `delta` keeping the viewport point (`x`, `y`) fixed.
    pub fn zoom_at(&mut self, x: f64, y: f64, delta: f64, limits: &ZoomLimits) {
        let point_x = (x - self.translate_x) / self.scale;
        let point_y = (y - self.translate_y) / self.scale;

        let new_scale = (self.scale + delta).clamp(limits.min_scale, limits.max_scale);
        let scale_delta = new_scale - self.scale;

        self.translate_x -= point_x * scale_delta;
        self.translate_y -= point_y * scale_delta;
        self.scale = new_scale;
        self.user_has_interacted = true;
    }

    /// Zoom in one step around the viewport center.
    pub fn zoom_in(&mut self, viewport: Size, limits: &ZoomLimits) {
        self.zoom_at(
            viewport.width / 2.0,
            viewport.height / 2.0,
            limits.scale_step,
            limits,
        );
    }

    /// Zoom out one step around the viewport center.
    pub fn zoom_out(&mut self, viewport: Size, limits: &ZoomLimits) {
        self.zoom_at(
            viewport.width / 2.0,
            viewport.height / 2.0,
            -limits.scale_step,
            limits,
        );
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.translate_x += dx;
        self.translate_y += dy;
        self.user_has_interacted = true;
    }

    /// Zoom level label, e.g. `150%`.
    #[must_use]
    pub fn percent_label(&self) -> String {
        format!("{:.0}%", self.scale * 100.0)
    }

    /// CSS transform for the diagram canvas.
    #[must_use]
    pub fn css_transform(&self) -> String {
        format!(
            "translate({}px, {}px) scale({})",
            self.translate_x, self.translate_y, self.scale
        )
    }
}
