//! `safemark render` command implementation.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use safemark_config::{CliSettings, Config};
use safemark_renderer::{
    ConvertOptions, HtmlBackend, RenderOptions, RuntimeOptions, Sanitized, render_tree,
    sanitize_async, sanitize_sync,
};

use super::{read_input, write_stdout};
use crate::error::CliError;
use crate::output::Output;

/// Output format for the render command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum Format {
    /// Sanitized HTML.
    #[default]
    Html,
    /// Sanitized document tree as JSON.
    Json,
    /// Text content of the sanitized tree.
    Text,
}

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Markdown file to read (default: stdin; `-` also reads stdin).
    input: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover safemark.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated tags to keep; everything else is removed (overrides config).
    #[arg(long, value_delimiter = ',', conflicts_with = "deny")]
    allow: Option<Vec<String>>,

    /// Comma-separated tags to remove (overrides config).
    #[arg(long, value_delimiter = ',')]
    deny: Option<Vec<String>>,

    /// Drop raw HTML instead of showing it as text.
    #[arg(long)]
    skip_html: bool,

    /// Replace removed elements with their children.
    #[arg(long)]
    unwrap: bool,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Html)]
    format: Format,

    /// Run the pipeline on the async runtime.
    #[arg(long = "async")]
    run_async: bool,

    /// Enable verbose output (debug logs and policy statistics).
    #[arg(short, long)]
    pub verbose: bool,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration, input, rendering, or output fails.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            allowed_elements: self.allow,
            disallowed_elements: self.deny,
            skip_html: self.skip_html.then_some(true),
            unwrap_disallowed: self.unwrap.then_some(true),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let (source, path) = read_input(self.input.as_deref())?;
        let options = render_options(&config, source, path);

        let sanitized = if self.run_async {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(sanitize_async(&options))?
        } else {
            sanitize_sync(&options)?
        };

        let stats = sanitized.stats;
        tracing::info!(
            urls_rewritten = stats.urls_rewritten,
            elements_removed = stats.elements_removed,
            elements_unwrapped = stats.elements_unwrapped,
            raw_converted = stats.raw_converted,
            raw_dropped = stats.raw_dropped,
            line_breaks = stats.line_breaks,
            "Sanitized document"
        );
        for warning in &sanitized.warnings {
            output.warning(&format!("Warning: {warning}"));
        }

        write_stdout(&format_output(&sanitized, &options, self.format)?)?;
        Ok(())
    }
}

/// Build render options from the loaded configuration.
fn render_options(config: &Config, source: String, path: Option<PathBuf>) -> RenderOptions<String> {
    RenderOptions {
        path,
        allowed_elements: config.policy.allowed_elements.clone(),
        disallowed_elements: config.policy.disallowed_elements.clone(),
        skip_html: config.policy.skip_html,
        unwrap_disallowed: config.policy.unwrap_disallowed,
        convert_options: ConvertOptions {
            allow_dangerous_html: config.markdown.allow_dangerous_html,
            gfm: config.markdown.gfm,
        },
        normalize_line_breaks: config.markdown.normalize_line_breaks,
        ..RenderOptions::new(source)
    }
}

/// Serialize a sanitized document in the requested format.
fn format_output(
    sanitized: &Sanitized,
    options: &RenderOptions<String>,
    format: Format,
) -> Result<String, CliError> {
    Ok(match format {
        Format::Html => render_tree(
            &sanitized.tree,
            &options.components,
            &HtmlBackend,
            RuntimeOptions::default(),
        )?,
        Format::Json => serde_json::to_string_pretty(sanitized)?,
        Format::Text => sanitized.tree.text_content(),
    })
}
