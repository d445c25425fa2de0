//! Render backend trait for UI runtimes.
//!
//! The [`RenderBackend`] trait is the seam between the sanitized document
//! tree and whatever builds the final output: an HTML string, a widget tree,
//! a virtual DOM. The adapter walks the tree and calls into the backend
//! bottom-up, so every element receives its already-built children.

use crate::tree::Properties;

/// One parsed declaration of a `style` attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StyleDeclaration {
    /// CSS property name as written (lowercase, e.g. `background-color`).
    pub property: String,
    /// Declaration value, trimmed.
    pub value: String,
}

/// Attributes handed to a backend for one element.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementProps {
    /// Element attributes, without `style`.
    pub properties: Properties,
    /// Parsed `style` attribute, if the element had a valid one.
    pub style: Option<Vec<StyleDeclaration>>,
    /// Stable key `"{tag}-{index}"`, when keys are requested.
    pub key: Option<String>,
}

/// UI runtime that turns elements and text into output values.
pub trait RenderBackend {
    /// Value produced for each node.
    type Output;

    /// Build an element from its tag, attributes, and rendered children.
    fn element(&self, tag: &str, props: ElementProps, children: Vec<Self::Output>) -> Self::Output;

    /// Build a text node.
    fn text(&self, value: &str) -> Self::Output;

    /// Combine top-level outputs into one value.
    fn fragment(&self, children: Vec<Self::Output>) -> Self::Output;

    /// Native line break, used for `br` when no component overrides it.
    fn line_break(&self, props: ElementProps) -> Self::Output {
        self.element("br", props, Vec::new())
    }
}
