//! Natural dimensions of rendered images.
//!
//! Supports PNG (IHDR chunk), JPEG (first SOFn marker) and SVG (`width` and
//! `height` attributes of the root element, else its `viewBox`).

use std::sync::LazyLock;

use regex::Regex;

use crate::diagram::OutputFormat;

/// Width and height in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Both dimensions are finite and positive.
    #[must_use]
    pub fn is_usable(self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Probe natural dimensions of an encoded image.
#[must_use]
pub fn natural_size(format: OutputFormat, data: &[u8]) -> Option<Size> {
    let size = match format {
        OutputFormat::Png => png_dimensions(data).map(|(w, h)| Size::new(w.into(), h.into())),
        OutputFormat::Jpeg => jpeg_dimensions(data).map(|(w, h)| Size::new(w.into(), h.into())),
        OutputFormat::Svg => svg_dimensions(data),
        _ => None,
    };
    size.filter(|s| s.is_usable())
}

/// Extract width and height from PNG image data.
///
/// PNG format: 8-byte signature, then IHDR chunk with width/height at bytes 16-24.
fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 24 {
        return None;
    }

    if &data[0..8] != b"\x89PNG\r\n\x1a\n" {
        return None;
    }

    // IHDR chunk: width at bytes 16-20, height at bytes 20-24 (big-endian)
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Some((width, height))
}

/// Extract width and height from the first SOFn segment of a JPEG.
fn jpeg_dimensions(data: &[u8]) -> Option<(u16, u16)> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        // Fill bytes
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let length = usize::from(u16::from_be_bytes([data[pos + 2], data[pos + 3]]));
        // SOF0..SOF15 excluding DHT (C4), JPG (C8) and DAC (CC)
        let is_sof = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            // length(2) precision(1) height(2) width(2)
            let segment = data.get(pos + 4..pos + 9)?;
            let height = u16::from_be_bytes([segment[1], segment[2]]);
            let width = u16::from_be_bytes([segment[3], segment[4]]);
            return Some((width, height));
        }
        pos += 2 + length;
    }
    None
}

static SVG_ROOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<svg\b([^>]*)>").unwrap());
static SVG_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bwidth\s*=\s*["']\s*([0-9]*\.?[0-9]+)\s*(px)?\s*["']"#).unwrap());
static SVG_HEIGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bheight\s*=\s*["']\s*([0-9]*\.?[0-9]+)\s*(px)?\s*["']"#).unwrap()
});
static SVG_VIEWBOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bviewBox\s*=\s*["']\s*([-0-9.eE]+)[\s,]+([-0-9.eE]+)[\s,]+([0-9.eE]+)[\s,]+([0-9.eE]+)\s*["']"#)
        .unwrap()
});

/// Dimensions of an SVG document's root element.
///
/// Percentage or unit-bearing sizes other than `px` fall back to `viewBox`.
fn svg_dimensions(data: &[u8]) -> Option<Size> {
    let text = std::str::from_utf8(data).ok()?;
    let attrs = SVG_ROOT.captures(text)?.get(1)?.as_str();

    let attr = |re: &Regex| -> Option<f64> { re.captures(attrs)?.get(1)?.as_str().parse().ok() };

    if let (Some(width), Some(height)) = (attr(&SVG_WIDTH), attr(&SVG_HEIGHT)) {
        return Some(Size::new(width, height));
    }

    let view_box = SVG_VIEWBOX.captures(attrs)?;
    let width: f64 = view_box.get(3)?.as_str().parse().ok()?;
    let height: f64 = view_box.get(4)?.as_str().parse().ok()?;
    Some(Size::new(width, height))
}
