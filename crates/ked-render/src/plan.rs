//! Encode and route a request before dispatch.

use std::time::Duration;

use ked_codec::CodecError;

use crate::diagram::DiagramRequest;
use crate::settings::RenderSettings;
use crate::transport::{self, Transport};

/// A request with its token and chosen transport, ready to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPlan {
    pub request: DiagramRequest,
    /// Encoded source.
    pub token: String,
    pub transport: Transport,
    /// URL the request is sent to (GET or POST endpoint).
    pub url: String,
    /// GET URL for the token. Sent only when `transport` is GET.
    pub get_url: String,
    pub timeout: Duration,
}

impl RenderPlan {
    /// Encode the source and select the transport.
    ///
    /// Pure: depends only on the request and the settings snapshot.
    pub fn prepare(request: DiagramRequest, settings: &RenderSettings) -> Result<Self, CodecError> {
        let token = ked_codec::encode(&request.source)?;
        let get_url = transport::get_url(&settings.server_url, &request, &token);
        let transport = settings.transport_policy().select(get_url.len());
        let url = match transport {
            Transport::Get => get_url.clone(),
            Transport::Post(format) => transport::post_url(&settings.server_url, &request, format),
        };

        Ok(Self {
            request,
            token,
            transport,
            url,
            get_url,
            timeout: settings.request_timeout,
        })
    }

    /// Shareable URL, only when the request was actually sent as GET.
    #[must_use]
    pub fn share_url(&self) -> Option<&str> {
        self.transport.is_shareable().then_some(self.get_url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{DiagramType, OutputFormat};
    use crate::transport::PostFormat;

    fn request() -> DiagramRequest {
        DiagramRequest::new(
            "@startuml\nA->B\n@enduml",
            DiagramType::PlantUml,
            OutputFormat::Svg,
        )
    }

    #[test]
    fn test_prepare_short_source_uses_get() {
        let settings = RenderSettings::for_server("http://kroki.local");
        let plan = RenderPlan::prepare(request(), &settings).unwrap();

        assert_eq!(plan.transport, Transport::Get);
        assert_eq!(
            plan.url,
            format!("http://kroki.local/plantuml/svg/{}", plan.token)
        );
        assert_eq!(plan.share_url(), Some(plan.url.as_str()));
        assert_eq!(ked_codec::decode(&plan.token).unwrap(), request().source);
    }

    #[test]
    fn test_prepare_small_threshold_uses_post() {
        let settings = RenderSettings {
            url_length_threshold: 10,
            ..RenderSettings::for_server("http://kroki.local")
        };
        let plan = RenderPlan::prepare(request(), &settings).unwrap();

        assert_eq!(plan.transport, Transport::Post(PostFormat::Plain));
        assert_eq!(plan.url, "http://kroki.local/plantuml/svg");
        assert_eq!(plan.share_url(), None);
    }

    #[test]
    fn test_prepare_json_post() {
        let settings = RenderSettings {
            always_use_post: true,
            post_format: PostFormat::Json,
            ..RenderSettings::for_server("http://kroki.local")
        };
        let plan = RenderPlan::prepare(request(), &settings).unwrap();

        assert_eq!(plan.transport, Transport::Post(PostFormat::Json));
        assert_eq!(plan.url, "http://kroki.local/");
    }

    #[test]
    fn test_prepare_is_deterministic() {
        let settings = RenderSettings::default();
        let a = RenderPlan::prepare(request(), &settings).unwrap();
        let b = RenderPlan::prepare(request(), &settings).unwrap();
        assert_eq!(a, b);
    }
}
