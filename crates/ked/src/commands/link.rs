//! `ked link` command implementation.

use std::path::PathBuf;

use clap::Args;
use ked_render::{DiagramRequest, RenderPlan, ShareLink, Transport, share};
use url::Url;

use crate::error::CliError;
use crate::output::Output;

use super::{ConfigArgs, DiagramArgs, read_input};

/// Arguments for the link command.
#[derive(Args)]
pub(crate) struct LinkArgs {
    /// Diagram source file (default: stdin).
    input: Option<PathBuf>,

    #[command(flatten)]
    diagram: DiagramArgs,

    #[command(flatten)]
    config: ConfigArgs,

    /// Editor page to build a share link for; prints the image URL if omitted.
    #[arg(long)]
    location: Option<Url>,
}

impl LinkArgs {
    /// Execute the link command.
    ///
    /// # Errors
    ///
    /// Returns an error if the diagram is too large to be shared as a GET URL.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.config.load(None)?;
        let (diagram_type, output_format) = self.diagram.resolve(&config)?;
        let source = read_input(self.input.as_deref())?;

        let settings = config.to_render_settings();
        let plan = RenderPlan::prepare(
            DiagramRequest::new(source, diagram_type, output_format),
            &settings,
        )?;

        if let Transport::Post(_) = plan.transport {
            return Err(CliError::Validation(format!(
                "Diagram is sent over POST (URL length {} exceeds {} or POST is forced); no shareable link",
                plan.get_url.len(),
                settings.url_length_threshold
            )));
        }

        match &self.location {
            Some(location) => {
                let (_, link) = share::sync(location, &plan.request, &plan.token, plan.transport);
                match link {
                    ShareLink::Available(url) => output.result(url.as_str()),
                    ShareLink::Unavailable => output.warning("Empty diagram; no shareable link"),
                }
            }
            None => output.result(&plan.get_url),
        }
        Ok(())
    }
}
