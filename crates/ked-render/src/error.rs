//! Render pipeline errors.

use std::time::Duration;

use ked_codec::CodecError;

/// Error category, for branching without inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FailureKind {
    /// Source could not be encoded, or a token could not be decoded.
    Codec,
    /// The request exceeded its timeout and was aborted.
    Timeout,
    /// The service answered with a non-2xx status.
    Http,
    /// Connection-level failure (DNS, refused, reset).
    Network,
    /// Response body could not be read or interpreted.
    Io,
    /// A newer render started before this one completed. Never user-visible.
    Superseded,
}

/// Render pipeline error.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Request timed out.
    #[error("Request timeout - no response after {}s", .after.as_secs_f64())]
    Timeout {
        /// Timeout that elapsed.
        after: Duration,
    },

    /// Server returned an error status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, or the status reason when the body is empty.
        message: String,
    },

    /// Connection-level failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Response could not be read.
    #[error("I/O error: {0}")]
    Io(String),

    /// Result belongs to a render that is no longer current.
    #[error("render {generation} was superseded")]
    Superseded {
        /// Generation of the dropped render.
        generation: u64,
    },
}

impl RenderError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Codec(_) => FailureKind::Codec,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Http { .. } => FailureKind::Http,
            Self::Network(_) => FailureKind::Network,
            Self::Io(_) => FailureKind::Io,
            Self::Superseded { .. } => FailureKind::Superseded,
        }
    }

    /// Build an HTTP error from a status and raw response body.
    ///
    /// Blank bodies fall back to the canonical status reason.
    pub(crate) fn http(status: u16, body: &str, reason: Option<&str>) -> Self {
        let message = if body.trim().is_empty() {
            reason.unwrap_or("Unknown error").to_owned()
        } else {
            body.trim_end().to_owned()
        };
        Self::Http { status, message }
    }

    /// Classify a transport error from the HTTP client.
    pub(crate) fn from_transport(err: ureq::Error, timeout: Duration) -> Self {
        match err {
            ureq::Error::Timeout(_) => Self::Timeout { after: timeout },
            ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
                Self::Timeout { after: timeout }
            }
            other => Self::Network(other.to_string()),
        }
    }
}
