//! CLI error types.

use ked_codec::CodecError;
use ked_config::ConfigError;
use ked_render::RenderError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Codec(#[from] CodecError),

    #[error("{0}")]
    Render(#[from] RenderError),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("{0}")]
    Validation(String),
}
