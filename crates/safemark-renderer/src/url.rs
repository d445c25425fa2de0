//! URL sanitization for URL-bearing attributes.

use std::sync::Arc;

use crate::tree::Element;

/// Schemes that are kept as-is. Everything else is erased.
const SAFE_PROTOCOLS: &[&str] = &["http", "https", "irc", "ircs", "mailto", "xmpp"];

/// Attributes that may carry a URL, with the tags they apply to.
///
/// `None` means the attribute is URL-bearing on every element.
pub const URL_ATTRIBUTES: &[(&str, Option<&[&str]>)] = &[
    ("action", Some(&["form"])),
    ("cite", Some(&["blockquote", "del", "ins", "q"])),
    ("data", Some(&["object"])),
    ("formaction", Some(&["button", "input"])),
    ("href", Some(&["a", "area", "base", "link"])),
    ("icon", Some(&["menuitem"])),
    ("itemid", None),
    ("manifest", Some(&["html"])),
    ("ping", Some(&["a", "area"])),
    ("poster", Some(&["video"])),
    (
        "src",
        Some(&[
            "audio", "embed", "iframe", "img", "input", "script", "source", "track", "video",
        ]),
    ),
];

/// Outcome of a URL transform for one attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UrlRewrite {
    /// Leave the attribute untouched.
    Unchanged,
    /// Replace the attribute value (an empty string is a valid replacement).
    Set(String),
    /// Replace the attribute value with an absent value.
    Clear,
}

/// Caller-supplied URL transform.
///
/// Receives the current attribute value, the attribute name, and the element
/// that carries it.
pub type UrlTransform = Arc<dyn Fn(&str, &str, &Element) -> UrlRewrite + Send + Sync>;

/// Default [`UrlTransform`]: runs every URL through [`sanitize_url`].
#[must_use]
pub fn default_url_transform() -> UrlTransform {
    Arc::new(|url, _key, _element| UrlRewrite::Set(sanitize_url(url)))
}

/// Whether `attribute` is URL-bearing on an element named `tag`.
#[must_use]
pub fn is_url_attribute(attribute: &str, tag: &str) -> bool {
    URL_ATTRIBUTES
        .iter()
        .any(|(name, tags)| *name == attribute && tags.is_none_or(|tags| tags.contains(&tag)))
}

/// Sanitize a URL, keeping only relative URLs and safe protocols.
///
/// A URL has no protocol when it contains no `:` or when a `/`, `?` or `#`
/// appears before the first `:`. Such URLs are returned unchanged, as are
/// URLs whose protocol (compared case-insensitively) is one of `http`,
/// `https`, `irc`, `ircs`, `mailto` or `xmpp`. Anything else becomes an
/// empty string.
///
/// # Examples
///
/// ```
/// use safemark_renderer::sanitize_url;
///
/// assert_eq!(sanitize_url("https://example.com"), "https://example.com");
/// assert_eq!(sanitize_url("../page#a:b"), "../page#a:b");
/// assert_eq!(sanitize_url("javascript:alert(1)"), "");
/// ```
#[must_use]
pub fn sanitize_url(url: &str) -> String {
    let Some(colon) = url.find(':') else {
        return url.to_owned();
    };

    let delimiter_first = ['/', '?', '#']
        .into_iter()
        .filter_map(|delimiter| url.find(delimiter))
        .any(|index| index < colon);
    if delimiter_first {
        return url.to_owned();
    }

    let protocol = &url[..colon];
    if SAFE_PROTOCOLS
        .iter()
        .any(|safe| safe.eq_ignore_ascii_case(protocol))
    {
        url.to_owned()
    } else {
        String::new()
    }
}
