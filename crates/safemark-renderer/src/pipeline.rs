//! Processing pipeline: parse, caller stages, conversion, caller stages.
//!
//! A [`Pipeline`] runs in this fixed order:
//!
//! 1. parse the source into markdown events (pulldown-cmark)
//! 2. pre-conversion stages, in caller order, over [`MarkdownEvents`]
//! 3. convert events into a document tree
//! 4. post-conversion stages, in caller order, over [`Root`]
//!
//! Stages are either synchronous ([`Transform`]) or asynchronous
//! ([`AsyncTransform`]). [`Pipeline::run_sync`] refuses to run a pipeline
//! containing asynchronous stages; [`Pipeline::run`] awaits every stage in
//! order.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::convert::{ConvertOptions, MarkdownEvents, events_to_tree, parse_markdown};
use crate::tree::Root;

/// Name reported for the built-in parse step.
pub const PARSE_STAGE: &str = "parse";

/// Name reported for the built-in conversion step.
pub const CONVERT_STAGE: &str = "convert";

/// Source document being processed.
#[derive(Clone, Debug, Default)]
pub struct SourceFile {
    /// Markdown text fed to the parser.
    pub value: String,
    /// Where the text came from, if known.
    pub path: Option<PathBuf>,
    /// Messages reported by stages (non-fatal).
    pub messages: Vec<String>,
}

impl SourceFile {
    /// Create a file from markdown text.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Set the source path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Report a non-fatal message.
    pub fn message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }
}

/// Error returned by a caller-supplied stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StageError {
    message: String,
}

impl StageError {
    /// Create a stage error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error returned when a pipeline run fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// A stage returned an error.
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        /// Name of the failing stage.
        stage: String,
        /// Error reported by the stage.
        source: StageError,
    },
    /// A synchronous run met an asynchronous stage.
    #[error("Stage '{stage}' is asynchronous and cannot run synchronously")]
    AsyncStageInSyncRun {
        /// Name of the asynchronous stage.
        stage: String,
    },
}

/// Synchronous transformation over pipeline data `T`.
///
/// Stages mutate the data in place; replacing it wholesale is done with
/// `*input = ...`.
pub trait Transform<T>: Send + Sync {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Apply the transformation.
    fn transform(&self, input: &mut T, file: &mut SourceFile) -> Result<(), StageError>;
}

/// Asynchronous transformation over pipeline data `T`.
#[async_trait]
pub trait AsyncTransform<T>: Send + Sync {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Apply the transformation.
    async fn transform(&self, input: &mut T, file: &mut SourceFile) -> Result<(), StageError>;
}

/// One caller-supplied pipeline stage.
pub enum Stage<T> {
    Sync(Box<dyn Transform<T>>),
    Async(Box<dyn AsyncTransform<T>>),
}

impl<T: Send> Stage<T> {
    /// Wrap a synchronous transform.
    pub fn sync(transform: impl Transform<T> + 'static) -> Self {
        Self::Sync(Box::new(transform))
    }

    /// Wrap an asynchronous transform.
    pub fn asynchronous(transform: impl AsyncTransform<T> + 'static) -> Self {
        Self::Async(Box::new(transform))
    }

    /// Name of the wrapped transform.
    pub fn name(&self) -> &str {
        match self {
            Self::Sync(transform) => transform.name(),
            Self::Async(transform) => transform.name(),
        }
    }

    fn run_sync(&self, input: &mut T, file: &mut SourceFile) -> Result<(), PipelineError> {
        match self {
            Self::Sync(transform) => {
                tracing::debug!(stage = transform.name(), "Running stage");
                transform
                    .transform(input, file)
                    .map_err(|source| PipelineError::Stage {
                        stage: transform.name().to_owned(),
                        source,
                    })
            }
            Self::Async(transform) => Err(PipelineError::AsyncStageInSyncRun {
                stage: transform.name().to_owned(),
            }),
        }
    }

    async fn run(&self, input: &mut T, file: &mut SourceFile) -> Result<(), PipelineError> {
        let result = match self {
            Self::Sync(transform) => {
                tracing::debug!(stage = transform.name(), "Running stage");
                transform.transform(input, file)
            }
            Self::Async(transform) => {
                tracing::debug!(stage = transform.name(), "Running async stage");
                transform.transform(input, file).await
            }
        };
        result.map_err(|source| PipelineError::Stage {
            stage: self.name().to_owned(),
            source,
        })
    }
}

impl<T> fmt::Debug for Stage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, name) = match self {
            Self::Sync(transform) => ("Sync", transform.name()),
            Self::Async(transform) => ("Async", transform.name()),
        };
        f.debug_tuple(kind).field(&name).finish()
    }
}

/// Shared, ordered list of stages.
///
/// Lists are compared by identity when deciding whether a reactive render
/// must run again, so keep the same `Arc` for an unchanged list.
pub type StageList<T> = Arc<Vec<Stage<T>>>;

fn first_async_stage<T>(stages: &[Stage<T>]) -> Option<&str> {
    stages.iter().find_map(|stage| match stage {
        Stage::Async(transform) => Some(transform.name()),
        Stage::Sync(_) => None,
    })
}

/// Ordered processing pipeline around the fixed conversion step.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    pre: StageList<MarkdownEvents>,
    convert: ConvertOptions,
    post: StageList<Root>,
}

impl Pipeline {
    /// Assemble a pipeline from pre-conversion stages, conversion options,
    /// and post-conversion stages.
    #[must_use]
    pub fn new(
        pre: StageList<MarkdownEvents>,
        convert: ConvertOptions,
        post: StageList<Root>,
    ) -> Self {
        Self { pre, convert, post }
    }

    /// Stage names in execution order, including the built-in steps.
    pub fn stage_names(&self) -> Vec<&str> {
        let mut names = Vec::with_capacity(self.pre.len() + self.post.len() + 2);
        names.push(PARSE_STAGE);
        names.extend(self.pre.iter().map(Stage::name));
        names.push(CONVERT_STAGE);
        names.extend(self.post.iter().map(Stage::name));
        names
    }

    /// Whether any stage is asynchronous.
    pub fn has_async_stages(&self) -> bool {
        first_async_stage(&self.pre).is_some() || first_async_stage(&self.post).is_some()
    }

    /// Run every step immediately.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AsyncStageInSyncRun`] if any stage is
    /// asynchronous (checked before parsing), or the first stage failure.
    pub fn run_sync(&self, file: &mut SourceFile) -> Result<Root, PipelineError> {
        if let Some(stage) = first_async_stage(&self.pre).or_else(|| first_async_stage(&self.post))
        {
            return Err(PipelineError::AsyncStageInSyncRun {
                stage: stage.to_owned(),
            });
        }

        let mut events = parse_markdown(&file.value, &self.convert);
        for stage in self.pre.iter() {
            stage.run_sync(&mut events, file)?;
        }

        let mut tree = events_to_tree(events, &self.convert);
        for stage in self.post.iter() {
            stage.run_sync(&mut tree, file)?;
        }

        Ok(tree)
    }

    /// Run every step, awaiting asynchronous stages in order.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure; later stages do not run.
    pub async fn run(&self, file: &mut SourceFile) -> Result<Root, PipelineError> {
        let mut events = parse_markdown(&file.value, &self.convert);
        for stage in self.pre.iter() {
            stage.run(&mut events, file).await?;
        }

        let mut tree = events_to_tree(events, &self.convert);
        for stage in self.post.iter() {
            stage.run(&mut tree, file).await?;
        }

        Ok(tree)
    }
}
