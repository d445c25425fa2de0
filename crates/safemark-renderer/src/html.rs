//! HTML backend.
//!
//! Serializes the sanitized tree to an HTML5 string. Used by the CLI and as
//! the reference backend in tests.

use crate::backend::{ElementProps, RenderBackend, StyleDeclaration};
use crate::tree::PropertyValue;

/// Elements that never have content or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// HTML render backend.
///
/// - text and attribute values are escaped
/// - void elements are written without a closing tag
/// - `true` attributes are written as bare names; `false` and absent ones are omitted
/// - keys are not written
#[derive(Clone, Copy, Debug, Default)]
pub struct HtmlBackend;

impl RenderBackend for HtmlBackend {
    type Output = String;

    fn element(&self, tag: &str, props: ElementProps, children: Vec<String>) -> String {
        let mut out = String::with_capacity(tag.len() * 2 + 5);
        out.push('<');
        out.push_str(tag);

        for (name, value) in &props.properties {
            match value {
                PropertyValue::Null | PropertyValue::Bool(false) => {}
                PropertyValue::Bool(true) => {
                    out.push(' ');
                    out.push_str(name);
                }
                PropertyValue::String(_) | PropertyValue::Number(_) => {
                    push_attribute(&mut out, name, &value.to_attribute_string());
                }
            }
        }
        if let Some(style) = props.style.as_deref().filter(|style| !style.is_empty()) {
            push_attribute(&mut out, "style", &serialize_style(style));
        }
        out.push('>');

        if VOID_ELEMENTS.contains(&tag) {
            return out;
        }
        for child in children {
            out.push_str(&child);
        }
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
        out
    }

    fn text(&self, value: &str) -> String {
        escape_html(value)
    }

    fn fragment(&self, children: Vec<String>) -> String {
        children.concat()
    }
}

fn push_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape_html(value));
    out.push('"');
}

fn serialize_style(style: &[StyleDeclaration]) -> String {
    style
        .iter()
        .map(|declaration| format!("{}: {}", declaration.property, declaration.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Escape `&`, `<`, `>` and `"` for use in HTML text and attribute values.
#[must_use]
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
