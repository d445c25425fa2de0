//! Top-level render error.

use crate::pipeline::PipelineError;
use crate::policy::PolicyError;

/// Error returned by the render entry points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The policy configuration is invalid.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// A pipeline stage failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// A `style` attribute could not be parsed.
    #[error("Invalid style on <{tag}>: {reason} in '{value}'")]
    InvalidStyle {
        /// Element carrying the style.
        tag: String,
        /// The attribute value.
        value: String,
        /// What was wrong with it.
        reason: String,
    },
}
