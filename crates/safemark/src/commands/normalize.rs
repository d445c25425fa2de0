//! `safemark normalize` command implementation.

use std::path::PathBuf;

use clap::Args;
use safemark_renderer::normalize_line_breaks;

use super::{read_input, write_stdout};
use crate::error::CliError;

/// Arguments for the normalize command.
#[derive(Args)]
pub(crate) struct NormalizeArgs {
    /// Markdown file to read (default: stdin; `-` also reads stdin).
    input: Option<PathBuf>,
}

impl NormalizeArgs {
    /// Execute the normalize command.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be read or stdout cannot be written.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let (content, _) = read_input(self.input.as_deref())?;
        write_stdout(&normalize_line_breaks(&content))?;
        Ok(())
    }
}
