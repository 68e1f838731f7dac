//! Kroki HTTP client.
//!
//! Sends a [`RenderPlan`] to the service and normalizes the response:
//! - image formats become a tracked [`BlobHandle`] with probed dimensions
//! - text formats are decoded as UTF-8
//! - download-only formats are not fetched; a [`DeferredDownload`] is returned
//!
//! HTTP error statuses never escape as `Err`: they become
//! [`RenderOutcome::Failure`] carrying the response body (or status reason).
//! Every request carries its plan's timeout; an elapsed timeout aborts the
//! connection and is reported as [`RenderError::Timeout`].

use std::sync::Arc;
use std::time::Duration;

use ureq::Agent;

use crate::blob::{BlobHandle, BlobRegistry};
use crate::consts::DEFAULT_TIMEOUT;
use crate::diagram::DisplayKind;
use crate::error::RenderError;
use crate::image;
use crate::outcome::{DeferredDownload, Fetch, ImagePayload, RenderOutcome};
use crate::plan::RenderPlan;
use crate::transport::{JsonRenderBody, PostFormat, Transport};

/// Maximum accepted response body (50 MB).
const MAX_RESPONSE_SIZE: u64 = 50 * 1024 * 1024;

/// Issues render requests for prepared plans.
///
/// The only suspension point of a render cycle: implementations block the
/// calling thread until the outcome is known.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, plan: &RenderPlan) -> RenderOutcome;
}

/// Create HTTP agent with the specified default timeout.
///
/// Status codes are returned as responses, not errors, so error bodies can be
/// read. Use one agent per client for connection pooling.
pub fn create_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Blocking Kroki client.
///
/// Cheap to clone; clones share the connection pool and blob registry.
#[derive(Debug, Clone)]
pub struct KrokiClient {
    agent: Agent,
    blobs: BlobRegistry,
}

impl KrokiClient {
    /// Create a client registering image payloads in `blobs`.
    #[must_use]
    pub fn new(blobs: BlobRegistry) -> Self {
        Self {
            agent: create_agent(DEFAULT_TIMEOUT),
            blobs,
        }
    }

    /// Registry holding image payloads created by this client.
    #[must_use]
    pub fn blobs(&self) -> &BlobRegistry {
        &self.blobs
    }

    /// Send the plan and return the response body as bytes.
    ///
    /// Handles HTTP errors by reading the response body for error details.
    fn send(&self, plan: &RenderPlan) -> Result<Vec<u8>, RenderError> {
        let timeout = Some(plan.timeout);
        let result = match plan.transport {
            Transport::Get => self
                .agent
                .get(&plan.url)
                .config()
                .timeout_global(timeout)
                .build()
                .call(),
            Transport::Post(PostFormat::Plain) => self
                .agent
                .post(&plan.url)
                .config()
                .timeout_global(timeout)
                .build()
                .header("Content-Type", "text/plain")
                .send(plan.request.source.as_bytes()),
            Transport::Post(PostFormat::Json) => self
                .agent
                .post(&plan.url)
                .config()
                .timeout_global(timeout)
                .build()
                .send_json(JsonRenderBody::new(&plan.request)),
        };
        let response = result.map_err(|e| RenderError::from_transport(e, plan.timeout))?;

        let status = response.status();
        let mut body = response.into_body();

        if !status.is_success() {
            let error_body = body.read_to_string().unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                url = %plan.url,
                "Kroki returned error status"
            );
            return Err(RenderError::http(
                status.as_u16(),
                &error_body,
                status.canonical_reason(),
            ));
        }

        body.with_config()
            .limit(MAX_RESPONSE_SIZE)
            .read_to_vec()
            .map_err(|e| match RenderError::from_transport(e, plan.timeout) {
                RenderError::Network(message) => RenderError::Io(message),
                other => other,
            })
    }

    fn render_image(&self, plan: &RenderPlan) -> Result<ImagePayload, RenderError> {
        let format = plan.request.output_format;
        let data = self.send(plan)?;
        let natural_size = image::natural_size(format, &data);
        Ok(ImagePayload {
            blob: self.blobs.create(data, format.mime_type()),
            format,
            natural_size,
        })
    }

    fn render_text(&self, plan: &RenderPlan) -> Result<String, RenderError> {
        let data = self.send(plan)?;
        String::from_utf8(data).map_err(|e| RenderError::Io(format!("invalid UTF-8 in response: {e}")))
    }
}

impl Dispatch for KrokiClient {
    fn dispatch(&self, plan: &RenderPlan) -> RenderOutcome {
        let kind = plan.request.output_format.display_kind();
        tracing::debug!(
            diagram_type = %plan.request.diagram_type,
            format = %plan.request.output_format,
            transport = %plan.transport,
            "Dispatching render"
        );

        let outcome = match kind {
            DisplayKind::Image => self
                .render_image(plan)
                .map_or_else(RenderOutcome::Failure, RenderOutcome::Image),
            DisplayKind::Text => self
                .render_text(plan)
                .map_or_else(RenderOutcome::Failure, RenderOutcome::Text),
            DisplayKind::Download => RenderOutcome::DownloadOnly(DeferredDownload::new(
                plan.clone(),
                Arc::new(self.clone()),
            )),
        };

        if let RenderOutcome::Failure(err) = &outcome {
            tracing::debug!(kind = ?err.kind(), error = %err, "Render failed");
        }
        outcome
    }
}

impl Fetch for KrokiClient {
    fn fetch(&self, plan: &RenderPlan) -> Result<BlobHandle, RenderError> {
        let data = self.send(plan)?;
        Ok(self
            .blobs
            .create(data, plan.request.output_format.mime_type()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::diagram::{DiagramRequest, DiagramType, OutputFormat};
    use crate::error::FailureKind;
    use crate::image::Size;
    use crate::settings::RenderSettings;

    const SOURCE: &str = "@startuml\nA->B\n@enduml";

    /// Request as seen by the test server.
    #[derive(Debug)]
    struct Captured {
        method: String,
        path: String,
        content_type: Option<String>,
        body: Vec<u8>,
    }

    enum Reply {
        Respond {
            status: u16,
            content_type: &'static str,
            body: Vec<u8>,
        },
        /// Accept the request and never answer within the test's timeout.
        Hang(Duration),
    }

    fn respond(status: u16, content_type: &'static str, body: &[u8]) -> Reply {
        Reply::Respond {
            status,
            content_type,
            body: body.to_vec(),
        }
    }

    /// One-shot HTTP server on 127.0.0.1 answering each connection with the
    /// next reply.
    struct TestServer {
        url: String,
        requests: mpsc::Receiver<Captured>,
    }

    impl TestServer {
        fn start(replies: Vec<Reply>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let (tx, requests) = mpsc::channel();

            thread::spawn(move || {
                for reply in replies {
                    let Ok((stream, _)) = listener.accept() else {
                        return;
                    };
                    let Some(captured) = read_request(&stream) else {
                        continue;
                    };
                    let _ = tx.send(captured);
                    write_reply(stream, reply);
                }
            });

            Self { url, requests }
        }

        fn next_request(&self) -> Captured {
            self.requests.recv_timeout(Duration::from_secs(5)).unwrap()
        }
    }

    fn read_request(stream: &TcpStream) -> Option<Captured> {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let mut parts = line.split_whitespace();
        let method = parts.next()?.to_owned();
        let path = parts.next()?.to_owned();

        let mut content_length = 0;
        let mut content_type = None;
        let mut chunked = false;
        loop {
            line.clear();
            reader.read_line(&mut line).ok()?;
            let header = line.trim_end();
            if header.is_empty() {
                break;
            }
            let (name, value) = header.split_once(':')?;
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.parse().ok()?,
                "content-type" => content_type = Some(value.to_owned()),
                "transfer-encoding" => chunked = value.eq_ignore_ascii_case("chunked"),
                _ => {}
            }
        }

        let mut body = Vec::new();
        if chunked {
            loop {
                line.clear();
                reader.read_line(&mut line).ok()?;
                let size = usize::from_str_radix(line.trim(), 16).ok()?;
                let mut chunk = vec![0; size + 2];
                reader.read_exact(&mut chunk).ok()?;
                if size == 0 {
                    break;
                }
                body.extend_from_slice(&chunk[..size]);
            }
        } else {
            body.resize(content_length, 0);
            reader.read_exact(&mut body).ok()?;
        }

        Some(Captured {
            method,
            path,
            content_type,
            body,
        })
    }

    fn write_reply(mut stream: TcpStream, reply: Reply) {
        match reply {
            Reply::Respond {
                status,
                content_type,
                body,
            } => {
                let head = format!(
                    "HTTP/1.1 {status} Test\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
            }
            Reply::Hang(duration) => thread::sleep(duration),
        }
    }

    fn plan(server: &TestServer, format: OutputFormat, settings: RenderSettings) -> RenderPlan {
        let request = DiagramRequest::new(SOURCE, DiagramType::PlantUml, format);
        RenderPlan::prepare(
            request,
            &RenderSettings {
                server_url: server.url.clone(),
                ..settings
            },
        )
        .unwrap()
    }

    fn failure(outcome: RenderOutcome) -> RenderError {
        match outcome {
            RenderOutcome::Failure(err) => err,
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_get_svg_applies_image() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="120" height="40"></svg>"#;
        let server = TestServer::start(vec![respond(200, "image/svg+xml", svg)]);
        let client = KrokiClient::new(BlobRegistry::new());
        let plan = plan(&server, OutputFormat::Svg, RenderSettings::default());

        let outcome = client.dispatch(&plan);

        let request = server.next_request();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, format!("/plantuml/svg/{}", plan.token));
        let RenderOutcome::Image(payload) = outcome else {
            panic!("expected image");
        };
        assert_eq!(payload.blob.bytes(), svg);
        assert_eq!(payload.blob.mime_type(), "image/svg+xml");
        assert_eq!(payload.natural_size, Some(Size::new(120.0, 40.0)));
        assert_eq!(client.blobs().live_count(), 1);
    }

    #[test]
    fn test_post_plain_sends_raw_source() {
        let server = TestServer::start(vec![respond(200, "image/svg+xml", b"<svg/>")]);
        let client = KrokiClient::new(BlobRegistry::new());
        let plan = plan(
            &server,
            OutputFormat::Svg,
            RenderSettings {
                url_length_threshold: 10,
                ..RenderSettings::default()
            },
        );
        assert_eq!(plan.transport, Transport::Post(PostFormat::Plain));

        let outcome = client.dispatch(&plan);

        let request = server.next_request();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/plantuml/svg");
        assert_eq!(request.content_type.as_deref(), Some("text/plain"));
        assert_eq!(String::from_utf8(request.body).unwrap(), SOURCE);
        assert!(matches!(outcome, RenderOutcome::Image(_)));
    }

    #[test]
    fn test_post_json_body_shape() {
        let server = TestServer::start(vec![respond(200, "image/png", b"not really png")]);
        let client = KrokiClient::new(BlobRegistry::new());
        let plan = plan(
            &server,
            OutputFormat::Png,
            RenderSettings {
                always_use_post: true,
                post_format: PostFormat::Json,
                ..RenderSettings::default()
            },
        );

        let outcome = client.dispatch(&plan);

        let request = server.next_request();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/");
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "diagram_source": SOURCE,
                "diagram_type": "plantuml",
                "output_format": "png",
            })
        );
        let RenderOutcome::Image(payload) = outcome else {
            panic!("expected image");
        };
        assert_eq!(payload.natural_size, None);
    }

    #[test]
    fn test_http_500_carries_body() {
        let server = TestServer::start(vec![respond(
            500,
            "text/plain",
            b"Error 500: Syntax Error? (Assumed diagram type: sequence) line 2",
        )]);
        let client = KrokiClient::new(BlobRegistry::new());
        let plan = plan(&server, OutputFormat::Svg, RenderSettings::default());

        let err = failure(client.dispatch(&plan));

        assert_eq!(err.kind(), FailureKind::Http);
        assert!(err.to_string().starts_with("HTTP 500: Error 500: Syntax Error?"));
        assert_eq!(client.blobs().live_count(), 0);
    }

    #[test]
    fn test_http_503_after_post() {
        let server = TestServer::start(vec![respond(503, "text/plain", b"Kroki is overloaded")]);
        let client = KrokiClient::new(BlobRegistry::new());
        let plan = plan(
            &server,
            OutputFormat::Svg,
            RenderSettings {
                url_length_threshold: 10,
                ..RenderSettings::default()
            },
        );

        let err = failure(client.dispatch(&plan));

        assert_eq!(server.next_request().body, SOURCE.as_bytes());
        assert!(matches!(err, RenderError::Http { status: 503, .. }));
        assert!(err.to_string().contains("Kroki is overloaded"));
    }

    #[test]
    fn test_empty_error_body_uses_status_reason() {
        let server = TestServer::start(vec![respond(503, "text/plain", b"")]);
        let client = KrokiClient::new(BlobRegistry::new());
        let plan = plan(&server, OutputFormat::Svg, RenderSettings::default());

        let err = failure(client.dispatch(&plan));
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
    }

    #[test]
    fn test_timeout_is_reported_as_timeout() {
        let server = TestServer::start(vec![Reply::Hang(Duration::from_secs(2))]);
        let client = KrokiClient::new(BlobRegistry::new());
        let plan = plan(
            &server,
            OutputFormat::Svg,
            RenderSettings {
                request_timeout: Duration::from_millis(200),
                ..RenderSettings::default()
            },
        );

        let err = failure(client.dispatch(&plan));
        assert_eq!(err.kind(), FailureKind::Timeout);
    }

    #[test]
    fn test_connection_refused_is_network_error() {
        let url = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            format!("http://{}", listener.local_addr().unwrap())
        };
        let client = KrokiClient::new(BlobRegistry::new());
        let request = DiagramRequest::new(SOURCE, DiagramType::PlantUml, OutputFormat::Svg);
        let plan = RenderPlan::prepare(request, &RenderSettings::for_server(&url)).unwrap();

        let err = failure(client.dispatch(&plan));
        assert_eq!(err.kind(), FailureKind::Network);
    }

    #[test]
    fn test_text_format_returns_text() {
        let server = TestServer::start(vec![respond(200, "text/plain", b"     ,-.\n     |A|\n")]);
        let client = KrokiClient::new(BlobRegistry::new());
        let plan = plan(&server, OutputFormat::Txt, RenderSettings::default());

        let outcome = client.dispatch(&plan);

        assert!(server.next_request().path.starts_with("/plantuml/txt/"));
        let RenderOutcome::Text(text) = outcome else {
            panic!("expected text");
        };
        assert_eq!(text, "     ,-.\n     |A|\n");
    }

    #[test]
    fn test_pdf_is_fetched_only_on_demand() {
        let server = TestServer::start(vec![respond(200, "application/pdf", b"%PDF-1.4")]);
        let client = KrokiClient::new(BlobRegistry::new());
        let plan = plan(&server, OutputFormat::Pdf, RenderSettings::default());

        let RenderOutcome::DownloadOnly(download) = client.dispatch(&plan) else {
            panic!("expected deferred download");
        };
        assert!(
            server
                .requests
                .recv_timeout(Duration::from_millis(100))
                .is_err()
        );
        assert_eq!(download.filename(), "diagram.pdf");
        assert_eq!(download.href(), Some(plan.url.as_str()));

        let blob = download.fetch().unwrap();
        assert_eq!(server.next_request().method, "GET");
        assert_eq!(blob.bytes(), b"%PDF-1.4");
        assert_eq!(blob.mime_type(), "application/pdf");
    }
}
