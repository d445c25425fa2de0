//! Reactive rendering.
//!
//! A [`ReactiveRenderer`] owns a set of [`RenderOptions`] and re-runs the
//! processing pipeline on the ambient tokio runtime whenever an input of the
//! pipeline changes: the source text, its path, line-break normalization,
//! conversion options, or the identity of either stage list. Policy and
//! component options are applied in [`view`](ReactiveRenderer::view), so
//! changing them takes effect without a new run.
//!
//! Every run is tagged with a generation number. A finished run only
//! publishes its result if no newer run has started since; superseded runs
//! are discarded. Dropping the renderer bumps the generation so runs still in
//! flight publish nothing. Runs are never preempted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::adapter::{RuntimeOptions, render_tree};
use crate::backend::RenderBackend;
use crate::error::RenderError;
use crate::policy::enforce;
use crate::render::RenderOptions;
use crate::tree::Root;

/// Outcome of the most recently published run.
#[derive(Debug, Default)]
struct RunState {
    /// Pipeline output, before policy enforcement.
    tree: Option<Root>,
    error: Option<RenderError>,
    warnings: Vec<String>,
    /// Generation of the published run.
    published: u64,
}

/// Renderer that keeps its output in step with changing options.
pub struct ReactiveRenderer<B: RenderBackend> {
    handle: Handle,
    backend: B,
    options: RenderOptions<B::Output>,
    fallback: Option<B::Output>,
    generation: Arc<AtomicU64>,
    state: Arc<Mutex<RunState>>,
    in_flight: Vec<JoinHandle<()>>,
}

impl<B: RenderBackend> ReactiveRenderer<B> {
    /// Create a renderer on the current tokio runtime and start the first run.
    ///
    /// `fallback` is shown by [`view`](Self::view) until a run has
    /// published a tree.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(backend: B, options: RenderOptions<B::Output>, fallback: Option<B::Output>) -> Self {
        Self::with_handle(Handle::current(), backend, options, fallback)
    }

    /// Create a renderer that spawns its runs on `handle`.
    pub fn with_handle(
        handle: Handle,
        backend: B,
        options: RenderOptions<B::Output>,
        fallback: Option<B::Output>,
    ) -> Self {
        let mut renderer = Self {
            handle,
            backend,
            options,
            fallback,
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(Mutex::new(RunState::default())),
            in_flight: Vec::new(),
        };
        renderer.start_run();
        renderer
    }

    /// Current options.
    pub fn options(&self) -> &RenderOptions<B::Output> {
        &self.options
    }

    /// Replace the options, starting a new run if a pipeline input changed.
    ///
    /// Returns whether a run was started.
    pub fn update(&mut self, options: RenderOptions<B::Output>) -> bool {
        let rerun = pipeline_inputs_changed(&self.options, &options);
        self.options = options;
        if rerun {
            self.start_run();
        }
        rerun
    }

    /// Whether the latest run has not published yet.
    pub fn is_pending(&self) -> bool {
        self.lock_state().published != self.generation.load(Ordering::SeqCst)
    }

    /// Messages reported by the stages of the published run.
    pub fn warnings(&self) -> Vec<String> {
        self.lock_state().warnings.clone()
    }

    /// Wait for every run started so far to finish.
    pub async fn settle(&mut self) {
        for task in self.in_flight.drain(..) {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "Render task did not complete");
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_run(&mut self) {
        self.in_flight.retain(|task| !task.is_finished());

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.generation);
        let state = Arc::clone(&self.state);
        let pipeline = self.options.pipeline();
        let mut file = self.options.source_file();

        tracing::debug!(generation, "Starting render");
        let task = self.handle.spawn(async move {
            let result = pipeline.run(&mut file).await;

            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            if current.load(Ordering::SeqCst) != generation {
                tracing::debug!(generation, "Discarding superseded render");
                return;
            }
            state.published = generation;
            match result {
                Ok(tree) => {
                    for message in &file.messages {
                        tracing::warn!(path = ?file.path, %message, "Pipeline message");
                    }
                    state.tree = Some(tree);
                    state.error = None;
                    state.warnings = file.messages;
                }
                Err(err) => {
                    tracing::debug!(generation, error = %err, "Render failed");
                    state.tree = None;
                    state.error = Some(err.into());
                    state.warnings = file.messages;
                }
            }
        });
        self.in_flight.push(task);
    }
}

impl<B> ReactiveRenderer<B>
where
    B: RenderBackend,
    B::Output: Clone,
{
    /// Render the published tree with the current policy and components.
    ///
    /// Returns the fallback while no tree has been published.
    ///
    /// # Errors
    ///
    /// Returns the error of the published run, a policy configuration error,
    /// or an adapter error.
    pub fn view(&self) -> Result<Option<B::Output>, RenderError> {
        let policy = self.options.policy()?;
        let mut tree = {
            let state = self.lock_state();
            if let Some(err) = &state.error {
                return Err(err.clone());
            }
            match &state.tree {
                Some(tree) => tree.clone(),
                None => return Ok(self.fallback.clone()),
            }
        };

        enforce(&mut tree, &policy);
        let output = render_tree(
            &tree,
            &self.options.components,
            &self.backend,
            RuntimeOptions::default(),
        )?;
        Ok(Some(output))
    }
}

impl<B: RenderBackend> Drop for ReactiveRenderer<B> {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

fn pipeline_inputs_changed<O>(old: &RenderOptions<O>, new: &RenderOptions<O>) -> bool {
    old.source != new.source
        || old.path != new.path
        || old.normalize_line_breaks != new.normalize_line_breaks
        || old.convert_options != new.convert_options
        || !Arc::ptr_eq(&old.pre_stages, &new.pre_stages)
        || !Arc::ptr_eq(&old.post_stages, &new.post_stages)
}
