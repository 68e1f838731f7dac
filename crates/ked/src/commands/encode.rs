//! `ked encode` command implementation.

use std::path::PathBuf;

use clap::Args;

use crate::error::CliError;
use crate::output::Output;

use super::read_input;

/// Arguments for the encode command.
#[derive(Args)]
pub(crate) struct EncodeArgs {
    /// Diagram source file (default: stdin).
    input: Option<PathBuf>,
}

impl EncodeArgs {
    /// Execute the encode command.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let source = read_input(self.input.as_deref())?;
        let token = ked_codec::encode(&source)?;
        tracing::info!(source_len = source.len(), token_len = token.len(), "Encoded diagram");
        Output::new().result(&token);
        Ok(())
    }
}
