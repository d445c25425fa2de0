//! Render entry points.
//!
//! [`render_sync`] and [`render_async`] run the whole chain for one source
//! text: line-break normalization, the processing pipeline, policy
//! enforcement, and the adapter. Policy options are validated before the
//! source is parsed.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapter::{Components, RuntimeOptions, render_tree};
use crate::backend::RenderBackend;
use crate::convert::{ConvertOptions, MarkdownEvents};
use crate::error::RenderError;
use crate::linebreak::normalize_line_breaks;
use crate::pipeline::{Pipeline, SourceFile, StageList};
use crate::policy::{AllowElement, EnforceStats, Policy, PolicyError, enforce};
use crate::tree::Root;
use crate::url::UrlTransform;

/// Options for one render.
///
/// `O` is the backend output type, which component overrides produce.
pub struct RenderOptions<O> {
    /// Markdown source text.
    pub source: String,
    /// Path the source was read from, reported to stages.
    pub path: Option<PathBuf>,
    /// Only these tags are kept. Exclusive with `disallowed_elements`.
    pub allowed_elements: Option<Vec<String>>,
    /// These tags are removed. Exclusive with `allowed_elements`.
    pub disallowed_elements: Option<Vec<String>>,
    /// Per-element admission predicate.
    pub allow_element: Option<AllowElement>,
    /// Tag to component overrides.
    pub components: Components<O>,
    /// Stages run over markdown events before conversion.
    pub pre_stages: StageList<MarkdownEvents>,
    /// Stages run over the tree after conversion.
    pub post_stages: StageList<Root>,
    /// Options for the conversion step.
    pub convert_options: ConvertOptions,
    /// Drop raw HTML instead of showing it as text.
    pub skip_html: bool,
    /// Replace removed elements with their children.
    pub unwrap_disallowed: bool,
    /// URL transform override (default: [`crate::sanitize_url`]).
    pub url_transform: Option<UrlTransform>,
    /// Rewrite single line breaks into paragraph breaks before parsing.
    pub normalize_line_breaks: bool,
}

impl<O> RenderOptions<O> {
    /// Options with defaults for the given source.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Validate the policy options.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ConflictingElementLists`] if both element lists
    /// are set.
    pub fn policy(&self) -> Result<Policy, PolicyError> {
        let mut policy = Policy::new(
            self.allowed_elements.as_deref(),
            self.disallowed_elements.as_deref(),
        )?
        .with_allow_element(self.allow_element.clone())
        .with_skip_html(self.skip_html)
        .with_unwrap_disallowed(self.unwrap_disallowed);
        if let Some(url_transform) = &self.url_transform {
            policy = policy.with_url_transform(Arc::clone(url_transform));
        }
        Ok(policy)
    }

    /// Assemble the processing pipeline.
    #[must_use]
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            Arc::clone(&self.pre_stages),
            self.convert_options.clone(),
            Arc::clone(&self.post_stages),
        )
    }

    /// The source file handed to the pipeline, normalized if enabled.
    #[must_use]
    pub fn source_file(&self) -> SourceFile {
        let value = if self.normalize_line_breaks {
            normalize_line_breaks(&self.source)
        } else {
            self.source.clone()
        };
        SourceFile {
            value,
            path: self.path.clone(),
            messages: Vec::new(),
        }
    }
}

impl<O> Default for RenderOptions<O> {
    fn default() -> Self {
        Self {
            source: String::new(),
            path: None,
            allowed_elements: None,
            disallowed_elements: None,
            allow_element: None,
            components: Components::new(),
            pre_stages: StageList::default(),
            post_stages: StageList::default(),
            convert_options: ConvertOptions::default(),
            skip_html: false,
            unwrap_disallowed: false,
            url_transform: None,
            normalize_line_breaks: true,
        }
    }
}

impl<O> Clone for RenderOptions<O> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            path: self.path.clone(),
            allowed_elements: self.allowed_elements.clone(),
            disallowed_elements: self.disallowed_elements.clone(),
            allow_element: self.allow_element.clone(),
            components: self.components.clone(),
            pre_stages: Arc::clone(&self.pre_stages),
            post_stages: Arc::clone(&self.post_stages),
            convert_options: self.convert_options.clone(),
            skip_html: self.skip_html,
            unwrap_disallowed: self.unwrap_disallowed,
            url_transform: self.url_transform.clone(),
            normalize_line_breaks: self.normalize_line_breaks,
        }
    }
}

impl<O> fmt::Debug for RenderOptions<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut components: Vec<&str> = self.components.keys().map(String::as_str).collect();
        components.sort_unstable();
        f.debug_struct("RenderOptions")
            .field("source_len", &self.source.len())
            .field("path", &self.path)
            .field("allowed_elements", &self.allowed_elements)
            .field("disallowed_elements", &self.disallowed_elements)
            .field("components", &components)
            .field("pre_stages", &self.pre_stages)
            .field("post_stages", &self.post_stages)
            .field("convert_options", &self.convert_options)
            .field("skip_html", &self.skip_html)
            .field("unwrap_disallowed", &self.unwrap_disallowed)
            .field("normalize_line_breaks", &self.normalize_line_breaks)
            .finish_non_exhaustive()
    }
}

/// Sanitized tree, before the adapter runs.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Sanitized {
    /// The tree after policy enforcement.
    pub tree: Root,
    /// Messages reported by pipeline stages.
    pub warnings: Vec<String>,
    /// What the policy pass changed.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub stats: EnforceStats,
}

/// Result of rendering markdown through a backend.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderResult<O> {
    /// Backend output for the whole document.
    pub output: O,
    /// Messages reported by pipeline stages.
    pub warnings: Vec<String>,
}

/// Enforce `policy` on a pipeline result, logging stage messages.
pub(crate) fn sanitize_tree(mut tree: Root, file: SourceFile, policy: &Policy) -> Sanitized {
    let stats = enforce(&mut tree, policy);
    for message in &file.messages {
        tracing::warn!(path = ?file.path, %message, "Pipeline message");
    }
    Sanitized {
        tree,
        warnings: file.messages,
        stats,
    }
}

/// Parse and sanitize without rendering, running every stage immediately.
///
/// # Errors
///
/// Returns [`RenderError::Policy`] for invalid policy options (before
/// parsing) and [`RenderError::Pipeline`] if a stage fails or is
/// asynchronous.
pub fn sanitize_sync<O>(options: &RenderOptions<O>) -> Result<Sanitized, RenderError> {
    let policy = options.policy()?;
    let mut file = options.source_file();
    let tree = options.pipeline().run_sync(&mut file)?;
    Ok(sanitize_tree(tree, file, &policy))
}

/// Parse and sanitize without rendering, awaiting asynchronous stages.
///
/// # Errors
///
/// Returns [`RenderError::Policy`] for invalid policy options (before
/// parsing) and [`RenderError::Pipeline`] if a stage fails.
pub async fn sanitize_async<O>(options: &RenderOptions<O>) -> Result<Sanitized, RenderError> {
    let policy = options.policy()?;
    let mut file = options.source_file();
    let tree = options.pipeline().run(&mut file).await?;
    Ok(sanitize_tree(tree, file, &policy))
}

/// Render markdown synchronously.
///
/// # Errors
///
/// See [`sanitize_sync`]; additionally the adapter may fail on a `style`
/// attribute it cannot parse.
pub fn render_sync<B: RenderBackend>(
    options: &RenderOptions<B::Output>,
    backend: &B,
) -> Result<RenderResult<B::Output>, RenderError> {
    let sanitized = sanitize_sync(options)?;
    let output = render_tree(
        &sanitized.tree,
        &options.components,
        backend,
        RuntimeOptions::default(),
    )?;
    Ok(RenderResult {
        output,
        warnings: sanitized.warnings,
    })
}

/// Render markdown, awaiting asynchronous stages.
///
/// # Errors
///
/// See [`sanitize_async`]; additionally the adapter may fail on a `style`
/// attribute it cannot parse.
pub async fn render_async<B: RenderBackend>(
    options: &RenderOptions<B::Output>,
    backend: &B,
) -> Result<RenderResult<B::Output>, RenderError> {
    let sanitized = sanitize_async(options).await?;
    let output = render_tree(
        &sanitized.tree,
        &options.components,
        backend,
        RuntimeOptions::default(),
    )?;
    Ok(RenderResult {
        output,
        warnings: sanitized.warnings,
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::adapter::ComponentProps;
    use crate::html::HtmlBackend;
    use crate::pipeline::{AsyncTransform, PipelineError, Stage, StageError, Transform};
    use crate::tree::{Element, Node, ParentRef};
    use crate::url::UrlRewrite;

    fn html(options: &RenderOptions<String>) -> String {
        render_sync(options, &HtmlBackend).unwrap().output
    }

    fn tags(list: &[&str]) -> Option<Vec<String>> {
        Some(list.iter().map(|s| (*s).to_owned()).collect())
    }

    struct Warn;

    impl Transform<Root> for Warn {
        fn name(&self) -> &str {
            "warn"
        }

        fn transform(&self, _tree: &mut Root, file: &mut SourceFile) -> Result<(), StageError> {
            file.message("Something to look at");
            Ok(())
        }
    }

    /// Wraps the document in a raw `<script>` fragment.
    struct InjectRaw;

    #[async_trait]
    impl AsyncTransform<Root> for InjectRaw {
        fn name(&self) -> &str {
            "inject-raw"
        }

        async fn transform(
            &self,
            tree: &mut Root,
            _file: &mut SourceFile,
        ) -> Result<(), StageError> {
            tokio::task::yield_now().await;
            tree.children.insert(0, Node::raw("<script>"));
            Ok(())
        }
    }

    #[test]
    fn test_single_breaks_become_paragraphs() {
        assert_eq!(
            html(&RenderOptions::new("Hello\nWorld")),
            "<p>Hello</p><p>World</p>"
        );
    }

    #[test]
    fn test_normalization_can_be_disabled() {
        let options = RenderOptions {
            normalize_line_breaks: false,
            ..RenderOptions::new("Hello\nWorld")
        };
        assert_eq!(html(&options), "<p>Hello\nWorld</p>");
    }

    #[test]
    fn test_list_stays_one_list() {
        assert_eq!(
            html(&RenderOptions::new("- x\n- y")),
            "<ul><li>x</li><li>y</li></ul>"
        );
    }

    #[test]
    fn test_unsafe_link_cleared() {
        assert_eq!(
            html(&RenderOptions::new("[x](javascript:alert(1))")),
            r#"<p><a href="">x</a></p>"#
        );
        assert_eq!(
            html(&RenderOptions::new("[x](https://example.com)")),
            r#"<p><a href="https://example.com">x</a></p>"#
        );
    }

    #[test]
    fn test_custom_url_transform() {
        let options = RenderOptions {
            url_transform: Some(Arc::new(|url: &str, _key: &str, _element: &Element| {
                UrlRewrite::Set(format!("/proxy?u={url}"))
            })),
            ..RenderOptions::new("![i](a.png)")
        };
        assert_eq!(html(&options), r#"<p><img alt="i" src="/proxy?u=a.png"></p>"#);
    }

    #[test]
    fn test_inline_br_becomes_line_break() {
        assert_eq!(html(&RenderOptions::new("a<br/>b")), "<p>a<br>b</p>");
        let options = RenderOptions {
            skip_html: true,
            ..RenderOptions::new("a<br>b")
        };
        assert_eq!(html(&options), "<p>a<br>b</p>");
    }

    #[test]
    fn test_raw_html_shown_as_text() {
        assert_eq!(
            html(&RenderOptions::new("a <b>bold</b>")),
            "<p>a &lt;b&gt;bold&lt;/b&gt;</p>"
        );
    }

    #[test]
    fn test_skip_html_drops_raw() {
        let options = RenderOptions {
            skip_html: true,
            ..RenderOptions::new("a <b>bold</b>")
        };
        assert_eq!(html(&options), "<p>a bold</p>");
    }

    #[test]
    fn test_dangerous_html_disabled_at_conversion() {
        let options = RenderOptions {
            convert_options: ConvertOptions {
                allow_dangerous_html: false,
                ..ConvertOptions::default()
            },
            ..RenderOptions::new("a <b>bold</b>")
        };
        let sanitized = sanitize_sync(&options).unwrap();
        assert_eq!(sanitized.stats.raw_converted, 0);
        assert_eq!(html(&options), "<p>a bold</p>");
    }

    #[test]
    fn test_allow_list_with_unwrap() {
        let options = RenderOptions {
            allowed_elements: tags(&["p"]),
            unwrap_disallowed: true,
            ..RenderOptions::new("**bold** text")
        };
        assert_eq!(html(&options), "<p>bold text</p>");
    }

    #[test]
    fn test_deny_list_removes_subtree() {
        let options = RenderOptions {
            disallowed_elements: tags(&["strong"]),
            ..RenderOptions::new("**bold** text")
        };
        assert_eq!(html(&options), "<p> text</p>");
    }

    #[test]
    fn test_allow_element_predicate() {
        let options = RenderOptions {
            allow_element: Some(Arc::new(
                |element: &Element, _index: usize, _parent: ParentRef<'_>| element.tag != "em",
            )),
            ..RenderOptions::new("*gone* kept")
        };
        assert_eq!(html(&options), "<p> kept</p>");
    }

    #[test]
    fn test_conflicting_lists_fail_before_parsing() {
        let options: RenderOptions<String> = RenderOptions {
            allowed_elements: tags(&["p"]),
            disallowed_elements: tags(&[]),
            ..RenderOptions::new("text")
        };
        assert_eq!(
            render_sync(&options, &HtmlBackend).unwrap_err(),
            RenderError::Policy(PolicyError::ConflictingElementLists)
        );
    }

    #[test]
    fn test_components_override_backend() {
        let mut options = RenderOptions::new("# Title");
        options.components.insert(
            "h1".to_owned(),
            Arc::new(|props: ComponentProps<'_, String>| {
                format!("<Heading>{}</Heading>", props.children.concat())
            }),
        );
        assert_eq!(html(&options), "<Heading>Title</Heading>");
    }

    #[test]
    fn test_stage_messages_become_warnings() {
        let options = RenderOptions {
            post_stages: Arc::new(vec![Stage::sync(Warn)]),
            ..RenderOptions::new("x")
        };
        let result = render_sync(&options, &HtmlBackend).unwrap();
        assert_eq!(result.warnings, vec!["Something to look at"]);
    }

    #[test]
    fn test_sync_render_rejects_async_stage() {
        let options = RenderOptions {
            post_stages: Arc::new(vec![Stage::asynchronous(InjectRaw)]),
            ..RenderOptions::new("x")
        };
        assert_eq!(
            render_sync(&options, &HtmlBackend).unwrap_err(),
            RenderError::Pipeline(PipelineError::AsyncStageInSyncRun {
                stage: "inject-raw".to_owned()
            })
        );
    }

    #[tokio::test]
    async fn test_async_render_sanitizes_stage_output() {
        let options = RenderOptions {
            post_stages: Arc::new(vec![Stage::asynchronous(InjectRaw)]),
            skip_html: true,
            ..RenderOptions::new("x")
        };
        let result = render_async(&options, &HtmlBackend).await.unwrap();
        assert_eq!(result.output, "<p>x</p>");
    }

    #[test]
    fn test_deeply_nested_source_is_sanitized() {
        let depth = 30_000;
        let source = format!("{} [x](javascript:y)", ">".repeat(depth));
        let sanitized = sanitize_sync(&RenderOptions::<String>::new(source)).unwrap();
        assert_eq!(sanitized.stats.urls_rewritten, 1);

        let mut levels = 0;
        let mut current = &sanitized.tree.children;
        while let [Node::Element(element)] = current.as_slice() {
            if element.tag == "blockquote" {
                levels += 1;
            }
            current = &element.children;
        }
        assert_eq!(levels, depth);
    }
}
