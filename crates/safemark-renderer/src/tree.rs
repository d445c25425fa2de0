//! Document tree produced from markdown and consumed by render backends.

use std::collections::BTreeMap;
use std::fmt;

/// Attribute map of an element, ordered by attribute name.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Value of an element attribute.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum PropertyValue {
    String(String),
    Bool(bool),
    Number(f64),
    /// Attribute present in the map but without a value.
    Null,
}

impl PropertyValue {
    /// Value as a string, as it would be read by a URL transform.
    ///
    /// `Null` reads as the empty string.
    #[must_use]
    pub fn to_attribute_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Null => Ok(()),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Node in the document tree.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "type", rename_all = "lowercase")
)]
pub enum Node {
    Element(Element),
    Text {
        value: String,
    },
    /// Unparsed markup. Resolved by the policy pass; never reaches a backend.
    Raw {
        value: String,
    },
}

impl Node {
    /// Create a text node.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    /// Create a raw markup node.
    #[must_use]
    pub fn raw(value: impl Into<String>) -> Self {
        Self::Raw {
            value: value.into(),
        }
    }

    /// The element, if this node is one.
    #[must_use]
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(element) => Some(element),
            Self::Text { .. } | Self::Raw { .. } => None,
        }
    }

}

/// Append the text of `nodes` and their descendants to `out`.
fn push_text_content(nodes: &[Node], out: &mut String) {
    let mut pending: Vec<&Node> = nodes.iter().rev().collect();
    while let Some(node) = pending.pop() {
        match node {
            Node::Element(element) => pending.extend(element.children.iter().rev()),
            Node::Text { value } => out.push_str(value),
            Node::Raw { .. } => {}
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

/// Element node: tag name, attributes, and ordered children.
///
/// `Clone` and `Drop` walk the subtree with an explicit stack, so arbitrarily
/// deep trees can be copied and freed.
#[derive(Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Element {
    /// Tag name (e.g. `p`, `a`, `br`).
    #[cfg_attr(feature = "serde", serde(rename = "tagName"))]
    pub tag: String,
    /// Element attributes.
    pub properties: Properties,
    /// Child nodes.
    pub children: Vec<Node>,
}

impl Element {
    /// Create an empty element with the given tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            properties: Properties::new(),
            children: Vec::new(),
        }
    }

    /// Set an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Append a child node.
    #[must_use]
    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Set children.
    #[must_use]
    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    /// Look up an attribute.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        push_text_content(&self.children, &mut out);
        out
    }

    /// Copy of the tag and attributes, without children.
    fn clone_shallow(&self) -> Self {
        Self {
            tag: self.tag.clone(),
            properties: self.properties.clone(),
            children: Vec::with_capacity(self.children.len()),
        }
    }
}

impl Clone for Element {
    fn clone(&self) -> Self {
        // The copy's child count doubles as the cursor into the source's children
        let mut ancestors: Vec<(&Element, Element)> = Vec::new();
        let mut source = self;
        let mut copy = self.clone_shallow();
        loop {
            match source.children.get(copy.children.len()) {
                Some(Node::Element(child)) => {
                    ancestors.push((source, std::mem::replace(&mut copy, child.clone_shallow())));
                    source = child;
                }
                Some(leaf) => copy.children.push(leaf.clone()),
                None => {
                    let Some((parent_source, mut parent_copy)) = ancestors.pop() else {
                        return copy;
                    };
                    parent_copy.children.push(Node::Element(copy));
                    source = parent_source;
                    copy = parent_copy;
                }
            }
        }
    }
}

impl Drop for Element {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(node) = pending.pop() {
            if let Node::Element(mut element) = node {
                pending.append(&mut element.children);
            }
        }
    }
}

/// Root of a document tree.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Root {
    /// Top-level nodes.
    pub children: Vec<Node>,
}

impl Root {
    /// Create a root with the given children.
    #[must_use]
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    /// Concatenated text of all text nodes in document order.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        push_text_content(&self.children, &mut out);
        out
    }

    /// Whether any `Raw` node remains anywhere in the tree.
    #[must_use]
    pub fn contains_raw(&self) -> bool {
        let mut pending: Vec<&Node> = self.children.iter().collect();
        while let Some(node) = pending.pop() {
            match node {
                Node::Raw { .. } => return true,
                Node::Element(element) => pending.extend(&element.children),
                Node::Text { .. } => {}
            }
        }
        false
    }
}

/// Parent of a node being visited: the root or an element.
///
/// Carries the parent's tag and attributes separately from its children, so
/// a walk can lend out a child list it has detached from the tree.
#[derive(Clone, Copy, Debug)]
pub struct ParentRef<'a> {
    tag: Option<&'a str>,
    properties: Option<&'a Properties>,
    children: &'a [Node],
}

impl<'a> ParentRef<'a> {
    /// The document root with the given top-level nodes.
    #[must_use]
    pub fn root(children: &'a [Node]) -> Self {
        Self {
            tag: None,
            properties: None,
            children,
        }
    }

    /// An element with the given children.
    #[must_use]
    pub fn element(tag: &'a str, properties: &'a Properties, children: &'a [Node]) -> Self {
        Self {
            tag: Some(tag),
            properties: Some(properties),
            children,
        }
    }

    /// Children of the parent.
    #[must_use]
    pub fn children(self) -> &'a [Node] {
        self.children
    }

    /// Tag name of the parent, or `None` for the root.
    #[must_use]
    pub fn tag(self) -> Option<&'a str> {
        self.tag
    }

    /// Attributes of the parent, or `None` for the root.
    #[must_use]
    pub fn properties(self) -> Option<&'a Properties> {
        self.properties
    }

    /// Whether the parent is the document root.
    #[must_use]
    pub fn is_root(self) -> bool {
        self.tag.is_none()
    }
}
