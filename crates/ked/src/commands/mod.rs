//! CLI command implementations.

pub(crate) mod decode;
pub(crate) mod encode;
pub(crate) mod link;
pub(crate) mod render;
pub(crate) mod watch;

pub(crate) use decode::DecodeArgs;
pub(crate) use encode::EncodeArgs;
pub(crate) use link::LinkArgs;
pub(crate) use render::RenderArgs;
pub(crate) use watch::WatchArgs;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use ked_config::{CliSettings, Config};
use ked_render::{
    BlobRegistry, CachedDispatch, DiagramType, Dispatch, KrokiClient, MemoryCache, OutputFormat,
    Size,
};

use crate::error::CliError;

/// Configuration arguments shared by all commands.
#[derive(Args)]
pub(crate) struct ConfigArgs {
    /// Path to configuration file (default: auto-discover ked.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Kroki server URL (overrides config).
    #[arg(long, env = "KED_KROKI_URL")]
    kroki_url: Option<String>,

    /// Always send requests as POST.
    #[arg(long)]
    post: bool,

    /// POST body format: plain or json (overrides config).
    #[arg(long)]
    post_format: Option<String>,

    /// Request timeout in milliseconds (overrides config).
    #[arg(long)]
    timeout: Option<u64>,

    /// Disable the render cache.
    #[arg(long)]
    no_cache: bool,
}

impl ConfigArgs {
    /// Load configuration with these overrides applied.
    pub(crate) fn load(&self, debounce_ms: Option<u64>) -> Result<Config, CliError> {
        let cli_settings = CliSettings {
            server_url: self.kroki_url.clone(),
            always_use_post: self.post.then_some(true),
            post_format: self.post_format.clone(),
            timeout_ms: self.timeout,
            debounce_ms,
            cache_enabled: self.no_cache.then_some(false),
        };
        Ok(Config::load(self.config.as_deref(), Some(&cli_settings))?)
    }
}

/// Diagram type and output format selection.
#[derive(Args)]
pub(crate) struct DiagramArgs {
    /// Diagram type, e.g. plantuml, mermaid, graphviz (default from config).
    #[arg(short = 't', long = "type")]
    diagram_type: Option<String>,

    /// Output format, e.g. svg, png, pdf, txt (default from config).
    #[arg(short, long)]
    format: Option<String>,
}

impl DiagramArgs {
    /// Resolve type and format against the configured defaults.
    ///
    /// An explicit format the type cannot produce is an error. A default
    /// format the type cannot produce falls back to the type's own default.
    pub(crate) fn resolve(&self, config: &Config) -> Result<(DiagramType, OutputFormat), CliError> {
        let (default_type, default_format) = config.default_request_kind()?;
        resolve_kind(
            self.diagram_type.as_deref(),
            self.format.as_deref(),
            default_type,
            default_format,
        )
    }
}

fn resolve_kind(
    diagram_type: Option<&str>,
    format: Option<&str>,
    default_type: DiagramType,
    default_format: OutputFormat,
) -> Result<(DiagramType, OutputFormat), CliError> {
    let diagram_type = match diagram_type {
        Some(name) => DiagramType::parse(name)
            .ok_or_else(|| CliError::Validation(format!("Unknown diagram type: {name}")))?,
        None => default_type,
    };

    let Some(name) = format else {
        return Ok((diagram_type, diagram_type.resolve_format(Some(default_format))));
    };
    let format = OutputFormat::parse(name)
        .ok_or_else(|| CliError::Validation(format!("Unknown output format: {name}")))?;
    if !diagram_type.supports(format) {
        let supported: Vec<&str> = diagram_type
            .supported_formats()
            .iter()
            .map(|f| f.as_str())
            .collect();
        return Err(CliError::Validation(format!(
            "{diagram_type} cannot be rendered as {format} (supported: {})",
            supported.join(", ")
        )));
    }
    Ok((diagram_type, format))
}

/// Read diagram source from a file, or stdin for `-` or no path.
pub(crate) fn read_input(path: Option<&Path>) -> Result<String, CliError> {
    match path {
        Some(path) if path != Path::new("-") => Ok(std::fs::read_to_string(path)?),
        _ => Ok(io::read_to_string(io::stdin())?),
    }
}

/// Build the dispatcher, with the render cache in front when enabled.
pub(crate) fn build_dispatcher(config: &Config, blobs: &BlobRegistry) -> Arc<dyn Dispatch> {
    let client: Arc<dyn Dispatch> = Arc::new(KrokiClient::new(blobs.clone()));
    if !config.cache.enabled {
        return client;
    }
    tracing::debug!(max_entries = config.cache.max_entries, "Render cache enabled");
    Arc::new(CachedDispatch::new(
        client,
        Arc::new(MemoryCache::new(config.cache.max_entries)),
        blobs.clone(),
    ))
}

/// Parse a `WIDTHxHEIGHT` viewport size.
pub(crate) fn parse_viewport(value: &str) -> Result<Size, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value}"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite() && *n > 0.0)
            .ok_or_else(|| format!("invalid viewport dimension: {part}"))
    };
    Ok(Size::new(parse(width)?, parse(height)?))
}

/// Default output path: the input with the format's extension, or
/// `diagram.<format>` for stdin.
///
/// An input that already carries the format's extension gets `.out` inserted
/// (`flow.txt` renders to `flow.out.txt`).
pub(crate) fn default_output(input: Option<&Path>, format: OutputFormat) -> PathBuf {
    match input {
        Some(path) if path != Path::new("-") => {
            let output = path.with_extension(format.as_str());
            if output == path {
                path.with_extension(format!("out.{}", format.as_str()))
            } else {
                output
            }
        }
        _ => PathBuf::from(format!("diagram.{}", format.as_str())),
    }
}

/// Refuse to write a render over its own source file.
pub(crate) fn check_output(input: Option<&Path>, output: &Path) -> Result<(), CliError> {
    let Some(input) = input.filter(|path| *path != Path::new("-")) else {
        return Ok(());
    };
    let same = match (input.canonicalize(), output.canonicalize()) {
        (Ok(input), Ok(output)) => input == output,
        _ => input == output,
    };
    if same {
        return Err(CliError::Validation(format!(
            "Output {} would overwrite the diagram source",
            output.display()
        )));
    }
    Ok(())
}
