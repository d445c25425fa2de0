//! Sanitized tree to backend output.
//!
//! [`render_tree`] walks the tree bottom-up with an explicit stack. Each
//! element is built either by a caller-supplied component registered for its
//! tag, or by the backend. `br` without an override goes through
//! [`RenderBackend::line_break`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{ElementProps, RenderBackend, StyleDeclaration};
use crate::error::RenderError;
use crate::tree::{Element, Node, PropertyValue, Root};

/// Elements whose whitespace-only text children are not rendered.
const TABLE_ELEMENTS: &[&str] = &["table", "tbody", "tfoot", "thead", "tr"];

/// Options controlling how elements are handed to the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Drop malformed `style` attributes instead of failing.
    pub ignore_invalid_style: bool,
    /// Attach `"{tag}-{index}"` keys to elements.
    pub pass_keys: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            ignore_invalid_style: true,
            pass_keys: true,
        }
    }
}

/// Everything a component receives for one element.
pub struct ComponentProps<'a, O> {
    /// The element being rendered.
    pub element: &'a Element,
    /// Attributes as they would be passed to the backend.
    pub props: ElementProps,
    /// Already rendered children.
    pub children: Vec<O>,
}

/// Caller-supplied renderer for one tag.
pub type Component<O> = Arc<dyn Fn(ComponentProps<'_, O>) -> O + Send + Sync>;

/// Component overrides keyed by tag name.
pub type Components<O> = HashMap<String, Component<O>>;

struct Frame<'t, O> {
    /// Element owning `nodes` and its sibling index; `None` for the root.
    element: Option<(&'t Element, usize)>,
    nodes: &'t [Node],
    next: usize,
    rendered: Vec<O>,
}

impl<'t, O> Frame<'t, O> {
    fn new(element: Option<(&'t Element, usize)>, nodes: &'t [Node]) -> Self {
        Self {
            element,
            nodes,
            next: 0,
            rendered: Vec::with_capacity(nodes.len()),
        }
    }

    fn skips_whitespace(&self) -> bool {
        self.element
            .is_some_and(|(element, _)| TABLE_ELEMENTS.contains(&element.tag.as_str()))
    }
}

/// Render a sanitized tree through `backend`.
///
/// Raw nodes are skipped. The top-level outputs are combined with
/// [`RenderBackend::fragment`].
///
/// # Errors
///
/// Returns [`RenderError::InvalidStyle`] for a malformed `style` attribute
/// when `options.ignore_invalid_style` is off.
pub fn render_tree<B: RenderBackend>(
    root: &Root,
    components: &Components<B::Output>,
    backend: &B,
    options: RuntimeOptions,
) -> Result<B::Output, RenderError> {
    let mut stack = vec![Frame::new(None, &root.children)];

    while let Some(frame) = stack.last_mut() {
        let nodes = frame.nodes;
        if let Some(node) = nodes.get(frame.next) {
            let index = frame.next;
            frame.next += 1;
            match node {
                Node::Element(element) => {
                    stack.push(Frame::new(Some((element, index)), &element.children));
                }
                Node::Text { value } => {
                    if !(frame.skips_whitespace() && value.trim().is_empty()) {
                        frame.rendered.push(backend.text(value));
                    }
                }
                Node::Raw { .. } => {}
            }
            continue;
        }

        let Some(Frame {
            element, rendered, ..
        }) = stack.pop()
        else {
            break;
        };
        let Some((element, index)) = element else {
            return Ok(backend.fragment(rendered));
        };
        let output = render_element(element, index, rendered, components, backend, options)?;
        if let Some(parent) = stack.last_mut() {
            parent.rendered.push(output);
        }
    }

    Ok(backend.fragment(Vec::new()))
}

fn render_element<B: RenderBackend>(
    element: &Element,
    index: usize,
    children: Vec<B::Output>,
    components: &Components<B::Output>,
    backend: &B,
    options: RuntimeOptions,
) -> Result<B::Output, RenderError> {
    let props = element_props(element, index, options)?;

    if let Some(component) = components.get(element.tag.as_str()) {
        return Ok(component(ComponentProps {
            element,
            props,
            children,
        }));
    }
    if element.tag == "br" {
        return Ok(backend.line_break(props));
    }
    Ok(backend.element(&element.tag, props, children))
}

fn element_props(
    element: &Element,
    index: usize,
    options: RuntimeOptions,
) -> Result<ElementProps, RenderError> {
    let mut properties = element.properties.clone();
    let style = match properties.remove("style") {
        None | Some(PropertyValue::Null) => None,
        Some(value) => {
            let value = value.to_attribute_string();
            match parse_style(&value) {
                Ok(declarations) => Some(declarations),
                Err(reason) if options.ignore_invalid_style => {
                    tracing::debug!(tag = %element.tag, %reason, "Dropping invalid style");
                    None
                }
                Err(reason) => {
                    return Err(RenderError::InvalidStyle {
                        tag: element.tag.clone(),
                        value,
                        reason,
                    });
                }
            }
        }
    };

    Ok(ElementProps {
        properties,
        style,
        key: options
            .pass_keys
            .then(|| format!("{}-{index}", element.tag)),
    })
}

/// Parse an inline `style` attribute into declarations.
///
/// Declarations are separated by `;`. Empty declarations are skipped; a
/// non-empty declaration without `:` or with an empty property name is an
/// error. Property names are lowercased.
///
/// # Errors
///
/// Returns a description of the first malformed declaration.
pub fn parse_style(style: &str) -> Result<Vec<StyleDeclaration>, String> {
    let mut declarations = Vec::new();
    for declaration in style.split(';') {
        let declaration = declaration.trim();
        if declaration.is_empty() {
            continue;
        }
        let Some((property, value)) = declaration.split_once(':') else {
            return Err(format!("missing ':' in declaration '{declaration}'"));
        };
        let property = property.trim();
        if property.is_empty() {
            return Err(format!("missing property in declaration '{declaration}'"));
        }
        declarations.push(StyleDeclaration {
            property: property.to_ascii_lowercase(),
            value: value.trim().to_owned(),
        });
    }
    Ok(declarations)
}
