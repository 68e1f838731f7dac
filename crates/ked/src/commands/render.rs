//! `ked render` command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use ked_render::{
    BlobRegistry, Completion, ConfigProvider, DiagramRequest, RenderSession, ShareLink, Size,
    SourceProvider,
};
use url::Url;

use crate::error::CliError;
use crate::output::Output;
use crate::target::{EditorBuffer, FileTarget, ReportObserver};

use super::{
    ConfigArgs, DiagramArgs, build_dispatcher, check_output, default_output, parse_viewport,
    read_input,
};

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Diagram source file (default: stdin).
    input: Option<PathBuf>,

    /// Output file (default: input with the format's extension).
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    diagram: DiagramArgs,

    #[command(flatten)]
    config: ConfigArgs,

    /// Viewport used to compute the fit zoom.
    #[arg(long, default_value = "1280x800", value_parser = parse_viewport)]
    viewport: Size,

    /// Editor page to sync; prints the resulting share link.
    #[arg(long)]
    location: Option<Url>,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if the render fails or the result cannot be written.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.config.load(None)?;
        let (diagram_type, output_format) = self.diagram.resolve(&config)?;
        let source = read_input(self.input.as_deref())?;
        let path = self
            .output
            .unwrap_or_else(|| default_output(self.input.as_deref(), output_format));
        check_output(self.input.as_deref(), &path)?;

        let blobs = BlobRegistry::new();
        let dispatcher = build_dispatcher(&config, &blobs);
        let buffer = EditorBuffer::new(DiagramRequest::new(source, diagram_type, output_format));
        let provider: Arc<dyn ConfigProvider> = Arc::new(config);

        let mut session =
            RenderSession::new(FileTarget::new(path.clone(), self.viewport), provider)
                .with_observer(Arc::new(ReportObserver::new(path.clone())))
                .with_settle(Duration::ZERO, 1);
        if let Some(location) = self.location {
            session = session.with_location(location);
        }

        let ticket = session.begin(buffer.snapshot())?;
        tracing::info!(url = %ticket.plan().url, transport = %ticket.plan().transport, "Dispatching");
        let outcome = dispatcher.dispatch(ticket.plan());
        match session.complete(ticket, outcome) {
            Completion::Applied => {}
            Completion::Failed(err) | Completion::Superseded(err) => return Err(err.into()),
        }

        if let Some(download) = session.current_download() {
            let blob = download.fetch()?;
            std::fs::write(&path, blob.bytes())?;
            output.success(&format!("Saved {} -> {}", download.filename(), path.display()));
        }
        if let Some(err) = session.target_mut().take_write_error() {
            return Err(err.into());
        }
        if let Some(zoom) = session.target().zoom() {
            output.info(&format!("Fit zoom: {}", zoom.percent_label()));
        }
        if let Some((_, link)) = session.target().share() {
            match link {
                ShareLink::Available(url) => output.highlight(&format!("Share link: {url}")),
                ShareLink::Unavailable => output.warning("Rendered over POST; no share link"),
            }
        }

        session.teardown();
        Ok(())
    }
}
