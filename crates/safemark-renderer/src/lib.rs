//! Markdown to sanitized document tree renderer with pluggable backends.
//!
//! Untrusted markdown goes through a fixed chain:
//!
//! 1. [`normalize_line_breaks`] turns single line breaks between ordinary
//!    lines into paragraph breaks, leaving tables and lists intact.
//! 2. A [`Pipeline`] parses the text with pulldown-cmark, runs caller stages
//!    over the markdown events, converts them into a document tree, and runs
//!    caller stages over the tree.
//! 3. [`enforce`] applies a [`Policy`]: URL-bearing attributes go through
//!    [`sanitize_url`] (or a caller transform), elements are filtered by
//!    allow/deny lists and an optional predicate, and raw HTML becomes `br`
//!    elements, text, or nothing.
//! 4. [`render_tree`] hands the tree to a [`RenderBackend`], with caller
//!    components overriding individual tags.
//!
//! [`render_sync`] and [`render_async`] run the whole chain once;
//! [`ReactiveRenderer`] re-runs it as options change.
//!
//! # Example
//!
//! ```
//! use safemark_renderer::{HtmlBackend, RenderOptions, render_sync};
//!
//! let options = RenderOptions::new("Hello\n[click](javascript:alert(1))");
//! let result = render_sync(&options, &HtmlBackend).unwrap();
//! assert_eq!(result.output, r#"<p>Hello</p><p><a href="">click</a></p>"#);
//! ```

mod adapter;
mod backend;
mod convert;
mod error;
mod html;
mod linebreak;
mod pipeline;
mod policy;
mod reactive;
mod render;
mod tree;
mod url;

pub use adapter::{
    Component, ComponentProps, Components, RuntimeOptions, parse_style, render_tree,
};
pub use backend::{ElementProps, RenderBackend, StyleDeclaration};
pub use convert::{ConvertOptions, MarkdownEvents, events_to_tree, parse_markdown};
pub use error::RenderError;
pub use html::{HtmlBackend, escape_html};
pub use linebreak::{LineContext, normalize_line_breaks};
pub use pipeline::{
    AsyncTransform, CONVERT_STAGE, PARSE_STAGE, Pipeline, PipelineError, SourceFile, Stage,
    StageError, StageList, Transform,
};
pub use policy::{AllowElement, ElementFilter, EnforceStats, Policy, PolicyError, enforce};
pub use reactive::ReactiveRenderer;
pub use render::{
    RenderOptions, RenderResult, Sanitized, render_async, render_sync, sanitize_async,
    sanitize_sync,
};
pub use tree::{Element, Node, ParentRef, Properties, PropertyValue, Root};
pub use url::{
    URL_ATTRIBUTES, UrlRewrite, UrlTransform, default_url_transform, is_url_attribute,
    sanitize_url,
};
