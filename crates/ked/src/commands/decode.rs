//! `ked decode` command implementation.

use std::path::PathBuf;

use clap::Args;
use ked_config::Config;
use ked_render::{DiagramType, OutputFormat, share};
use url::Url;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the decode command.
#[derive(Args)]
pub(crate) struct DecodeArgs {
    /// Token, Kroki image URL or share link.
    value: String,

    /// Path to configuration file (default: auto-discover ked.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Source recovered from a token or link.
#[derive(Debug, PartialEq)]
struct Decoded {
    source: String,
    diagram_type: Option<DiagramType>,
    output_format: Option<OutputFormat>,
}

impl DecodeArgs {
    /// Execute the decode command.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = Config::load(self.config.as_deref(), None)?;
        let (fallback_type, _) = config.default_request_kind()?;

        let decoded = decode_value(&self.value, fallback_type)?;
        if let Some(diagram_type) = decoded.diagram_type {
            output.info(&format!("Diagram type: {diagram_type}"));
        }
        if let Some(format) = decoded.output_format {
            output.info(&format!("Output format: {format}"));
        }
        output.result(&decoded.source);
        Ok(())
    }
}

/// Decode a share link (`?im=`), a Kroki URL (`/{type}/{format}/{token}`) or a
/// bare token.
fn decode_value(value: &str, fallback_type: DiagramType) -> Result<Decoded, CliError> {
    let Ok(url) = Url::parse(value.trim()) else {
        return Ok(Decoded {
            source: ked_codec::decode(ked_codec::extract_token(value))?,
            diagram_type: None,
            output_format: None,
        });
    };

    let restored = share::restore(&url, fallback_type);
    if let Some(source) = restored.source {
        return Ok(Decoded {
            source: source?,
            diagram_type: restored.diagram_type,
            output_format: restored.output_format,
        });
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let [.., diagram_type, format, token] = segments.as_slice() else {
        return Err(CliError::Validation(format!(
            "No diagram found in URL: {value}"
        )));
    };
    Ok(Decoded {
        source: ked_codec::decode(token)?,
        diagram_type: DiagramType::parse(diagram_type),
        output_format: OutputFormat::parse(format),
    })
}
