//! GET vs POST transport selection.
//!
//! GET embeds the token in the request path and yields a shareable URL:
//!
//! ```text
//! GET  {base}/{type}/{format}/{token}
//! ```
//!
//! Some proxies truncate or reject very long URLs, so past a configured
//! length (or when forced) the source is sent in a POST body instead:
//!
//! ```text
//! POST {base}/{type}/{format}          body: raw source (plain)
//! POST {base}/                         body: {"diagram_source", "diagram_type", "output_format"} (json)
//! ```
//!
//! Selection is a pure function of the GET URL length and the policy. A POST
//! decision implies the caller must not publish a share link for the token.

use std::fmt;

use serde::Serialize;

use crate::diagram::DiagramRequest;

/// Body shape for POST requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostFormat {
    /// Raw source text to `{base}/{type}/{format}`.
    #[default]
    Plain,
    /// JSON document to `{base}/`.
    Json,
}

impl PostFormat {
    /// Parse from its configuration name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plain" => Some(Self::Plain),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Json => "json",
        }
    }
}

/// Transport chosen for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Token embedded in the URL path.
    Get,
    /// Source sent in the request body.
    Post(PostFormat),
}

impl Transport {
    /// Whether the request URL can be published as a share link.
    #[must_use]
    pub fn is_shareable(self) -> bool {
        matches!(self, Self::Get)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post(format) => write!(f, "POST ({})", format.as_str()),
        }
    }
}

/// Inputs to transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportPolicy {
    pub always_use_post: bool,
    /// Maximum GET URL length (inclusive) before switching to POST.
    pub url_length_threshold: usize,
    pub post_format: PostFormat,
}

impl TransportPolicy {
    /// Choose the transport for a GET URL of the given length.
    ///
    /// POST when forced, or when the URL is longer than the threshold.
    /// A URL exactly at the threshold still uses GET.
    #[must_use]
    pub fn select(&self, get_url_len: usize) -> Transport {
        if self.always_use_post || get_url_len > self.url_length_threshold {
            Transport::Post(self.post_format)
        } else {
            Transport::Get
        }
    }
}

/// Build the GET URL for a request and its token.
#[must_use]
pub fn get_url(server_url: &str, request: &DiagramRequest, token: &str) -> String {
    format!(
        "{}/{}/{}/{token}",
        server_url.trim_end_matches('/'),
        request.diagram_type.kroki_endpoint(),
        request.output_format.as_str()
    )
}

/// Build the POST URL for a request.
#[must_use]
pub fn post_url(server_url: &str, request: &DiagramRequest, format: PostFormat) -> String {
    let base = server_url.trim_end_matches('/');
    match format {
        PostFormat::Plain => format!(
            "{base}/{}/{}",
            request.diagram_type.kroki_endpoint(),
            request.output_format.as_str()
        ),
        PostFormat::Json => format!("{base}/"),
    }
}

/// JSON body for [`PostFormat::Json`] requests.
#[derive(Debug, Serialize)]
pub(crate) struct JsonRenderBody<'a> {
    pub diagram_source: &'a str,
    pub diagram_type: &'static str,
    pub output_format: &'static str,
}

impl<'a> JsonRenderBody<'a> {
    pub(crate) fn new(request: &'a DiagramRequest) -> Self {
        Self {
            diagram_source: &request.source,
            diagram_type: request.diagram_type.kroki_endpoint(),
            output_format: request.output_format.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{DiagramType, OutputFormat};

    fn policy(threshold: usize) -> TransportPolicy {
        TransportPolicy {
            always_use_post: false,
            url_length_threshold: threshold,
            post_format: PostFormat::Plain,
        }
    }

    fn request() -> DiagramRequest {
        DiagramRequest::new(
            "@startuml\nA->B\n@enduml",
            DiagramType::PlantUml,
            OutputFormat::Svg,
        )
    }

    #[test]
    fn test_select_at_threshold_uses_get() {
        assert_eq!(policy(100).select(100), Transport::Get);
    }

    #[test]
    fn test_select_over_threshold_uses_post() {
        assert_eq!(policy(100).select(101), Transport::Post(PostFormat::Plain));
    }

    #[test]
    fn test_always_post_ignores_length() {
        let policy = TransportPolicy {
            always_use_post: true,
            post_format: PostFormat::Json,
            ..policy(usize::MAX)
        };
        assert_eq!(policy.select(0), Transport::Post(PostFormat::Json));
        assert_eq!(policy.select(10), Transport::Post(PostFormat::Json));
    }

    #[test]
    fn test_get_url() {
        assert_eq!(
            get_url("https://kroki.io/", &request(), "TOKEN"),
            "https://kroki.io/plantuml/svg/TOKEN"
        );
    }

    #[test]
    fn test_post_urls() {
        assert_eq!(
            post_url("https://kroki.io", &request(), PostFormat::Plain),
            "https://kroki.io/plantuml/svg"
        );
        assert_eq!(
            post_url("https://kroki.io/", &request(), PostFormat::Json),
            "https://kroki.io/"
        );
    }

    #[test]
    fn test_threshold_applies_to_full_url() {
        let token = ked_codec::encode(&request().source).unwrap();
        let url = get_url("https://kroki.io", &request(), &token);

        assert_eq!(policy(url.len()).select(url.len()), Transport::Get);
        assert_eq!(
            policy(url.len() - 1).select(url.len()),
            Transport::Post(PostFormat::Plain)
        );
    }

    #[test]
    fn test_json_body_shape() {
        let request = request();
        let body = serde_json::to_value(JsonRenderBody::new(&request)).unwrap();
        assert_eq!(body["diagram_source"], "@startuml\nA->B\n@enduml");
        assert_eq!(body["diagram_type"], "plantuml");
        assert_eq!(body["output_format"], "svg");
    }

    #[test]
    fn test_shareable() {
        assert!(Transport::Get.is_shareable());
        assert!(!Transport::Post(PostFormat::Plain).is_shareable());
    }

    #[test]
    fn test_post_format_parse() {
        assert_eq!(PostFormat::parse("plain"), Some(PostFormat::Plain));
        assert_eq!(PostFormat::parse("json"), Some(PostFormat::Json));
        assert_eq!(PostFormat::parse("xml"), None);
    }
}
