//! Shareable location sync.
//!
//! The page location carries `diag`, `fmt` and `im` query parameters so a
//! render can be restored from a bookmark. `im` is only published for renders
//! actually sent as GET: a POST render never puts its token in the location.

use ked_codec::CodecError;
use url::Url;

use crate::diagram::{DiagramRequest, DiagramType, OutputFormat};
use crate::transport::Transport;

/// Query parameter holding the diagram type.
pub const PARAM_DIAGRAM: &str = "diag";
/// Query parameter holding the output format.
pub const PARAM_FORMAT: &str = "fmt";
/// Query parameter holding the encoded source.
pub const PARAM_IMAGE: &str = "im";

const OWNED_PARAMS: [&str; 3] = [PARAM_DIAGRAM, PARAM_FORMAT, PARAM_IMAGE];

/// Whether the current location can be shared as a restorable link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareLink {
    Available(Url),
    /// The last render went over POST (or had no source); there is no token
    /// to share.
    Unavailable,
}

impl ShareLink {
    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        match self {
            Self::Available(url) => Some(url),
            Self::Unavailable => None,
        }
    }
}

/// Rewrite `location` for a render of `request` sent over `transport`.
///
/// Always writes `diag` and `fmt`. Writes `im` only for GET renders of a
/// non-blank source; otherwise removes any stale `im`. Unrelated parameters
/// are kept.
#[must_use]
pub fn sync(
    location: &Url,
    request: &DiagramRequest,
    token: &str,
    transport: Transport,
) -> (Url, ShareLink) {
    let retained: Vec<(String, String)> = location
        .query_pairs()
        .filter(|(key, _)| !OWNED_PARAMS.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let publish_token = transport.is_shareable() && !request.source.trim().is_empty();

    let mut url = location.clone();
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in &retained {
            query.append_pair(key, value);
        }
        query.append_pair(PARAM_DIAGRAM, request.diagram_type.kroki_endpoint());
        query.append_pair(PARAM_FORMAT, request.output_format.as_str());
        if publish_token {
            query.append_pair(PARAM_IMAGE, token);
        }
    }

    let link = if publish_token {
        ShareLink::Available(url.clone())
    } else {
        ShareLink::Unavailable
    };
    tracing::debug!(%transport, shareable = publish_token, "Synced location");
    (url, link)
}

/// State recovered from a shared location.
#[derive(Debug)]
pub struct RestoredLink {
    /// Known diagram type from `diag`; unknown values are ignored.
    pub diagram_type: Option<DiagramType>,
    /// Format from `fmt`, resolved against the diagram type.
    pub output_format: Option<OutputFormat>,
    /// Decoded `im`, if present. A corrupt token is reported here while
    /// type and format still apply.
    pub source: Option<Result<String, CodecError>>,
}

/// Read `diag`, `fmt` and `im` from a location.
///
/// A format the type does not support falls back to `svg`, or to the type's
/// first format. `fallback_type` is used for format resolution when `diag` is
/// missing or unknown.
#[must_use]
pub fn restore(location: &Url, fallback_type: DiagramType) -> RestoredLink {
    let param = |name: &str| {
        location
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };

    let diagram_type = param(PARAM_DIAGRAM).and_then(|value| DiagramType::parse(&value));
    let requested_format = param(PARAM_FORMAT);

    let output_format = if diagram_type.is_some() || requested_format.is_some() {
        let requested = requested_format.as_deref().and_then(OutputFormat::parse);
        Some(diagram_type.unwrap_or(fallback_type).resolve_format(requested))
    } else {
        None
    };

    let source = param(PARAM_IMAGE)
        .filter(|token| !token.trim().is_empty())
        .map(|token| ked_codec::decode(ked_codec::extract_token(&token)));

    RestoredLink {
        diagram_type,
        output_format,
        source,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::transport::PostFormat;

    fn location(query: &str) -> Url {
        Url::parse(&format!("https://editor.local/app{query}")).unwrap()
    }

    fn request(source: &str) -> DiagramRequest {
        DiagramRequest::new(source, DiagramType::Mermaid, OutputFormat::Png)
    }

    fn query_of(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_sync_get_writes_all_params() {
        let token = ked_codec::encode("graph TD; A-->B").unwrap();
        let (url, link) = sync(
            &location("?theme=dark&im=stale"),
            &request("graph TD; A-->B"),
            &token,
            Transport::Get,
        );

        assert_eq!(
            query_of(&url),
            vec![
                ("theme".to_owned(), "dark".to_owned()),
                ("diag".to_owned(), "mermaid".to_owned()),
                ("fmt".to_owned(), "png".to_owned()),
                ("im".to_owned(), token),
            ]
        );
        assert_eq!(link, ShareLink::Available(url));
    }

    #[test]
    fn test_sync_post_clears_token() {
        let (url, link) = sync(
            &location("?diag=d2&fmt=svg&im=stale"),
            &request("graph TD; A-->B"),
            "unused",
            Transport::Post(PostFormat::Plain),
        );

        assert_eq!(
            query_of(&url),
            vec![
                ("diag".to_owned(), "mermaid".to_owned()),
                ("fmt".to_owned(), "png".to_owned()),
            ]
        );
        assert_eq!(link, ShareLink::Unavailable);
        assert_eq!(link.url(), None);
    }

    #[test]
    fn test_sync_blank_source_removes_token() {
        let token = ked_codec::encode("  ").unwrap();
        let (url, link) = sync(&location("?im=old"), &request("  "), &token, Transport::Get);

        assert!(url.query_pairs().all(|(k, _)| k != PARAM_IMAGE));
        assert_eq!(link, ShareLink::Unavailable);
    }

    #[test]
    fn test_restore_round_trip() {
        let token = ked_codec::encode("A -> B").unwrap();
        let (url, _) = sync(
            &location(""),
            &DiagramRequest::new("A -> B", DiagramType::GraphViz, OutputFormat::Svg),
            &token,
            Transport::Get,
        );

        let restored = restore(&url, DiagramType::PlantUml);
        assert_eq!(restored.diagram_type, Some(DiagramType::GraphViz));
        assert_eq!(restored.output_format, Some(OutputFormat::Svg));
        assert_eq!(restored.source.unwrap().unwrap(), "A -> B");
    }

    #[test]
    fn test_restore_incompatible_format_falls_back() {
        // excalidraw renders svg only
        let restored = restore(&location("?diag=excalidraw&fmt=png"), DiagramType::PlantUml);
        assert_eq!(restored.output_format, Some(OutputFormat::Svg));
    }

    #[test]
    fn test_restore_unknown_type_is_ignored() {
        let restored = restore(&location("?diag=nonsense&fmt=txt"), DiagramType::PlantUml);
        assert_eq!(restored.diagram_type, None);
        assert_eq!(restored.output_format, Some(OutputFormat::Txt));
        assert!(restored.source.is_none());
    }

    #[test]
    fn test_restore_corrupt_token_keeps_type() {
        let restored = restore(&location("?diag=d2&im=%21%21%21"), DiagramType::PlantUml);
        assert_eq!(restored.diagram_type, Some(DiagramType::D2));
        assert_eq!(restored.output_format, Some(OutputFormat::Svg));
        assert!(matches!(restored.source, Some(Err(_))));
    }

    #[test]
    fn test_restore_empty_location() {
        let restored = restore(&location(""), DiagramType::PlantUml);
        assert_eq!(restored.diagram_type, None);
        assert_eq!(restored.output_format, None);
        assert!(restored.source.is_none());
    }
}
