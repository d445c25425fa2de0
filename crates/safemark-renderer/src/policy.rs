//! Tree policy enforcement.
//!
//! [`enforce`] walks a document tree once and applies a [`Policy`]:
//!
//! 1. Raw markup fragments become `br` elements (for `<br>` spellings),
//!    plain text, or nothing (when `skip_html` is set).
//! 2. URL-bearing attributes are passed through the URL transform.
//! 3. Elements failing the allow/deny lists or the admission predicate are
//!    removed, or unwrapped so their children take their place.
//!
//! The walk keeps an explicit stack of frames rather than recursing, so
//! deeply nested input cannot exhaust the call stack. Whenever the node at
//! an index is replaced or removed, the same index is examined again: nodes
//! spliced into the tree are visited in the same pass.

use std::collections::HashSet;
use std::sync::Arc;

use crate::tree::{Element, Node, ParentRef, PropertyValue, Root};
use crate::url::{
    URL_ATTRIBUTES, UrlRewrite, UrlTransform, default_url_transform, is_url_attribute,
};

/// Raw fragments recognized as line breaks (exact, case-sensitive match).
const LINE_BREAK_SPELLINGS: &[&str] = &["<br>", "<br/>", "<br />", "</br>"];

/// Per-element admission predicate.
///
/// Called with the element, its index among its siblings, and its parent.
/// Returning `false` removes the element.
pub type AllowElement = Arc<dyn Fn(&Element, usize, ParentRef<'_>) -> bool + Send + Sync>;

/// Policy configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// Both an allow-list and a deny-list were supplied.
    #[error("Cannot use both allowed_elements and disallowed_elements")]
    ConflictingElementLists,
}

/// Which tag names pass the list-based admission check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ElementFilter {
    /// Every tag passes.
    #[default]
    Any,
    /// Only listed tags pass.
    Allow(HashSet<String>),
    /// Listed tags are rejected.
    Deny(HashSet<String>),
}

impl ElementFilter {
    /// Build a filter from optional allow and deny lists.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ConflictingElementLists`] if both lists are
    /// given, regardless of their content.
    pub fn from_lists(
        allowed: Option<&[String]>,
        disallowed: Option<&[String]>,
    ) -> Result<Self, PolicyError> {
        match (allowed, disallowed) {
            (Some(_), Some(_)) => Err(PolicyError::ConflictingElementLists),
            (Some(allowed), None) => Ok(Self::Allow(allowed.iter().cloned().collect())),
            (None, Some(disallowed)) => Ok(Self::Deny(disallowed.iter().cloned().collect())),
            (None, None) => Ok(Self::Any),
        }
    }

    /// Whether `tag` passes the filter.
    #[must_use]
    pub fn admits(&self, tag: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Allow(allowed) => allowed.contains(tag),
            Self::Deny(disallowed) => !disallowed.contains(tag),
        }
    }
}

/// Validated, immutable policy for one render.
#[derive(Clone)]
pub struct Policy {
    filter: ElementFilter,
    allow_element: Option<AllowElement>,
    skip_html: bool,
    unwrap_disallowed: bool,
    url_transform: UrlTransform,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            filter: ElementFilter::Any,
            allow_element: None,
            skip_html: false,
            unwrap_disallowed: false,
            url_transform: default_url_transform(),
        }
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("filter", &self.filter)
            .field("allow_element", &self.allow_element.is_some())
            .field("skip_html", &self.skip_html)
            .field("unwrap_disallowed", &self.unwrap_disallowed)
            .finish_non_exhaustive()
    }
}

impl Policy {
    /// Create a policy from optional allow and deny lists.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ConflictingElementLists`] if both lists are given.
    pub fn new(
        allowed: Option<&[String]>,
        disallowed: Option<&[String]>,
    ) -> Result<Self, PolicyError> {
        Ok(Self::with_filter(ElementFilter::from_lists(allowed, disallowed)?))
    }

    /// Create a policy from an already validated filter.
    #[must_use]
    pub fn with_filter(filter: ElementFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Set the per-element admission predicate.
    #[must_use]
    pub fn with_allow_element(mut self, allow_element: Option<AllowElement>) -> Self {
        self.allow_element = allow_element;
        self
    }

    /// Drop raw HTML instead of demoting it to text.
    #[must_use]
    pub fn with_skip_html(mut self, skip_html: bool) -> Self {
        self.skip_html = skip_html;
        self
    }

    /// Replace removed elements with their children.
    #[must_use]
    pub fn with_unwrap_disallowed(mut self, unwrap_disallowed: bool) -> Self {
        self.unwrap_disallowed = unwrap_disallowed;
        self
    }

    /// Override the URL transform (default: [`crate::sanitize_url`]).
    #[must_use]
    pub fn with_url_transform(mut self, url_transform: UrlTransform) -> Self {
        self.url_transform = url_transform;
        self
    }

    fn should_remove(&self, element: &Element, index: usize, parent: ParentRef<'_>) -> bool {
        let mut remove = !self.filter.admits(&element.tag);
        if !remove && let Some(allow_element) = &self.allow_element {
            remove = !allow_element(element, index, parent);
        }
        remove
    }
}

/// Counters describing what a policy pass changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnforceStats {
    /// URL attributes whose value was replaced or cleared.
    pub urls_rewritten: usize,
    /// Elements excised together with their subtree.
    pub elements_removed: usize,
    /// Elements replaced by their children.
    pub elements_unwrapped: usize,
    /// Raw fragments demoted to text.
    pub raw_converted: usize,
    /// Raw fragments dropped.
    pub raw_dropped: usize,
    /// Raw fragments turned into `br` elements.
    pub line_breaks: usize,
}

/// What to do with the node at the current index.
enum Action {
    /// Keep the node and move on (descending into element children).
    Keep,
    /// Put `Node` in place of the current node and visit the same index again.
    Replace(Node),
    /// Remove the node and visit the same index again.
    Remove,
    /// Splice the element's children in its place and visit the same index again.
    Unwrap,
}

/// A child list detached from the tree while the walk is inside it.
///
/// The owning element stays in the enclosing frame's list at `index - 1`,
/// with empty children until this frame is popped.
struct Frame {
    children: Vec<Node>,
    index: usize,
}

impl Frame {
    fn new(children: Vec<Node>) -> Self {
        Self { children, index: 0 }
    }

    /// The element whose children the frame above this one holds.
    fn open_element(&self) -> Option<&Element> {
        let index = self.index.checked_sub(1)?;
        self.children.get(index)?.as_element()
    }
}

/// Apply `policy` to `root` in a single pre-order pass.
///
/// See the module docs for the order of operations. Each step does a
/// constant amount of work besides the policy callbacks and splicing, however
/// deep the tree is.
pub fn enforce(root: &mut Root, policy: &Policy) -> EnforceStats {
    let mut stats = EnforceStats::default();
    let mut stack = vec![Frame::new(std::mem::take(&mut root.children))];

    while let Some((frame, ancestors)) = stack.split_last_mut() {
        let index = frame.index;
        let Some(node) = frame.children.get_mut(index) else {
            let Some(done) = stack.pop() else {
                break;
            };
            match stack.last_mut() {
                Some(outer) => {
                    if let Some(Node::Element(element)) = outer
                        .index
                        .checked_sub(1)
                        .and_then(|open| outer.children.get_mut(open))
                    {
                        element.children = done.children;
                    }
                }
                None => root.children = done.children,
            }
            continue;
        };

        // URL rewriting needs only the element itself
        if let Node::Element(element) = node {
            stats.urls_rewritten += rewrite_urls(element, &policy.url_transform);
        }

        let parent = match ancestors.last().and_then(Frame::open_element) {
            Some(element) => ParentRef::element(&element.tag, &element.properties, &frame.children),
            None => ParentRef::root(&frame.children),
        };
        let action = decide(&frame.children[index], index, parent, policy, &mut stats);

        match action {
            Action::Keep => {
                frame.index += 1;
                if let Node::Element(element) = &mut frame.children[index]
                    && !element.children.is_empty()
                {
                    let children = std::mem::take(&mut element.children);
                    stack.push(Frame::new(children));
                }
            }
            Action::Replace(node) => frame.children[index] = node,
            Action::Remove => {
                frame.children.remove(index);
            }
            Action::Unwrap => {
                if let Node::Element(mut element) = frame.children.remove(index) {
                    let children = std::mem::take(&mut element.children);
                    frame.children.splice(index..index, children);
                }
            }
        }
    }

    tracing::debug!(
        urls_rewritten = stats.urls_rewritten,
        elements_removed = stats.elements_removed,
        elements_unwrapped = stats.elements_unwrapped,
        raw_converted = stats.raw_converted,
        raw_dropped = stats.raw_dropped,
        line_breaks = stats.line_breaks,
        "Policy enforced"
    );

    stats
}

/// Decide the fate of `node`, found at `index` among the children of `parent`.
fn decide(
    node: &Node,
    index: usize,
    parent: ParentRef<'_>,
    policy: &Policy,
    stats: &mut EnforceStats,
) -> Action {
    match node {
        Node::Raw { value } => {
            if LINE_BREAK_SPELLINGS.contains(&value.as_str()) {
                stats.line_breaks += 1;
                Action::Replace(Element::new("br").into())
            } else if policy.skip_html {
                stats.raw_dropped += 1;
                Action::Remove
            } else {
                stats.raw_converted += 1;
                Action::Replace(Node::text(value.clone()))
            }
        }
        Node::Element(element) => {
            if !policy.should_remove(element, index, parent) {
                Action::Keep
            } else if policy.unwrap_disallowed && !element.children.is_empty() {
                stats.elements_unwrapped += 1;
                Action::Unwrap
            } else {
                stats.elements_removed += 1;
                Action::Remove
            }
        }
        Node::Text { .. } => Action::Keep,
    }
}

/// Run every applicable URL attribute through `transform`.
///
/// Returns the number of attributes replaced.
fn rewrite_urls(element: &mut Element, transform: &UrlTransform) -> usize {
    let mut rewritten = 0;
    for (name, _) in URL_ATTRIBUTES {
        if !is_url_attribute(name, &element.tag) {
            continue;
        }
        let Some(value) = element.properties.get(*name) else {
            continue;
        };
        let value = value.to_attribute_string();

        let replacement = match transform(&value, name, &*element) {
            UrlRewrite::Unchanged => continue,
            UrlRewrite::Set(url) => url.into(),
            UrlRewrite::Clear => PropertyValue::Null,
        };
        element.properties.insert((*name).to_owned(), replacement);
        rewritten += 1;
    }
    rewritten
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;

    fn strings(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| (*t).to_owned()).collect()
    }

    fn p(text: &str) -> Node {
        Element::new("p").with_child(Node::text(text)).into()
    }

    #[test]
    fn test_conflicting_lists_rejected() {
        let allowed = strings(&["p"]);
        let disallowed = strings(&["div"]);
        assert_eq!(
            Policy::new(Some(allowed.as_slice()), Some(disallowed.as_slice())).unwrap_err(),
            PolicyError::ConflictingElementLists
        );
        // Empty lists conflict too
        let empty: Vec<String> = Vec::new();
        assert_eq!(
            ElementFilter::from_lists(Some(empty.as_slice()), Some(empty.as_slice())).unwrap_err(),
            PolicyError::ConflictingElementLists
        );
    }

    #[test]
    fn test_line_break_raw_becomes_element() {
        for spelling in ["<br>", "<br/>", "<br />", "</br>"] {
            for skip_html in [false, true] {
                let mut root = Root::new(vec![Node::raw(spelling)]);
                enforce(&mut root, &Policy::default().with_skip_html(skip_html));
                assert_eq!(root, Root::new(vec![Element::new("br").into()]));
            }
        }
    }

    #[test]
    fn test_line_break_match_is_exact() {
        let mut root = Root::new(vec![Node::raw("<BR>"), Node::raw("<br >")]);
        enforce(&mut root, &Policy::default());
        assert_eq!(root, Root::new(vec![Node::text("<BR>"), Node::text("<br >")]));
    }

    #[test]
    fn test_raw_demoted_to_text() {
        let mut root = Root::new(vec![
            Element::new("p")
                .with_child(Node::raw("<script>alert(1)</script>"))
                .into(),
        ]);
        let stats = enforce(&mut root, &Policy::default());
        assert_eq!(root, Root::new(vec![p("<script>alert(1)</script>")]));
        assert_eq!(stats.raw_converted, 1);
        assert!(!root.contains_raw());
    }

    #[test]
    fn test_raw_dropped_with_skip_html() {
        let mut root = Root::new(vec![
            Element::new("p")
                .with_child(Node::text("a"))
                .with_child(Node::raw("<b>"))
                .with_child(Node::raw("<i>"))
                .with_child(Node::text("c"))
                .into(),
        ]);
        let stats = enforce(&mut root, &Policy::default().with_skip_html(true));
        let expected = Element::new("p")
            .with_child(Node::text("a"))
            .with_child(Node::text("c"));
        assert_eq!(root, Root::new(vec![expected.into()]));
        assert_eq!(stats.raw_dropped, 2);
    }

    #[test]
    fn test_line_break_subject_to_allow_list() {
        let allowed = strings(&["p"]);
        let mut root = Root::new(vec![
            Element::new("p")
                .with_child(Node::text("a"))
                .with_child(Node::raw("<br>"))
                .into(),
        ]);
        enforce(&mut root, &Policy::new(Some(allowed.as_slice()), None).unwrap());
        assert_eq!(root, Root::new(vec![p("a")]));
    }

    #[test]
    fn test_unwrap_promotes_children() {
        let allowed = strings(&["p"]);
        let mut root = Root::new(vec![
            p("before"),
            Element::new("div").with_child(p("t")).into(),
            p("after"),
        ]);
        let policy = Policy::new(Some(allowed.as_slice()), None)
            .unwrap()
            .with_unwrap_disallowed(true);
        let stats = enforce(&mut root, &policy);
        assert_eq!(root, Root::new(vec![p("before"), p("t"), p("after")]));
        assert_eq!(stats.elements_unwrapped, 1);
    }

    #[test]
    fn test_unwrapped_children_are_visited() {
        let allowed = strings(&["p"]);
        let mut root = Root::new(vec![
            Element::new("div")
                .with_child(Element::new("section").with_child(p("deep")))
                .with_child(Element::new("a").with_attr("href", "javascript:x"))
                .into(),
        ]);
        let policy = Policy::new(Some(allowed.as_slice()), None)
            .unwrap()
            .with_unwrap_disallowed(true);
        let stats = enforce(&mut root, &policy);
        assert_eq!(root, Root::new(vec![p("deep")]));
        assert_eq!(stats.elements_unwrapped, 2);
        // Empty <a> cannot be unwrapped and is removed
        assert_eq!(stats.elements_removed, 1);
    }

    #[test]
    fn test_remove_without_unwrap_drops_subtree() {
        let disallowed = strings(&["div"]);
        let mut root = Root::new(vec![Element::new("div").with_child(p("t")).into(), p("x")]);
        let stats = enforce(&mut root, &Policy::new(None, Some(disallowed.as_slice())).unwrap());
        assert_eq!(root, Root::new(vec![p("x")]));
        assert_eq!(stats.elements_removed, 1);
    }

    #[test]
    fn test_consecutive_removals() {
        let disallowed = strings(&["img"]);
        let mut root = Root::new(vec![
            Element::new("img").into(),
            Element::new("img").into(),
            Element::new("img").into(),
            p("kept"),
        ]);
        enforce(&mut root, &Policy::new(None, Some(disallowed.as_slice())).unwrap());
        assert_eq!(root, Root::new(vec![p("kept")]));
    }

    #[test]
    fn test_predicate_can_reject() {
        let mut root = Root::new(vec![p("a"), p("b"), p("c")]);
        let policy = Policy::default().with_allow_element(Some(Arc::new(
            |_element: &Element, index: usize, _parent: ParentRef<'_>| index != 1,
        )));
        enforce(&mut root, &policy);
        // After "b" is removed, "c" moves to index 1 and is rejected as well
        assert_eq!(root, Root::new(vec![p("a")]));
    }

    #[test]
    fn test_predicate_receives_parent() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let policy = Policy::default().with_allow_element(Some(Arc::new(
            move |element: &Element, index: usize, parent: ParentRef<'_>| {
                recorder.lock().unwrap().push((
                    element.tag.clone(),
                    index,
                    parent.tag().map(str::to_owned),
                    parent.children().len(),
                ));
                true
            },
        )));
        let mut root = Root::new(vec![
            Element::new("ul")
                .with_child(Element::new("li"))
                .with_child(Element::new("li"))
                .into(),
        ]);
        enforce(&mut root, &policy);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("ul".to_owned(), 0, None, 1),
                ("li".to_owned(), 0, Some("ul".to_owned()), 2),
                ("li".to_owned(), 1, Some("ul".to_owned()), 2),
            ]
        );
    }

    #[test]
    fn test_predicate_not_consulted_for_list_rejections() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let disallowed = strings(&["div"]);
        let policy = Policy::new(None, Some(disallowed.as_slice()))
            .unwrap()
            .with_allow_element(Some(Arc::new(
                move |_: &Element, _: usize, _: ParentRef<'_>| {
                    *counter.lock().unwrap() += 1;
                    true
                },
            )));
        let mut root = Root::new(vec![Element::new("div").into(), Element::new("span").into()]);
        enforce(&mut root, &policy);
        assert_eq!(root, Root::new(vec![Element::new("span").into()]));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_unsafe_urls_erased() {
        let mut root = Root::new(vec![
            Element::new("a")
                .with_attr("href", "javascript:alert(1)")
                .with_attr("title", "javascript:alert(1)")
                .into(),
            Element::new("img").with_attr("src", "https://example.com/a.png").into(),
        ]);
        let stats = enforce(&mut root, &Policy::default());
        let link = root.children[0].as_element().unwrap();
        assert_eq!(link.attr("href"), Some(&PropertyValue::from("")));
        // title is not URL-bearing
        assert_eq!(link.attr("title"), Some(&PropertyValue::from("javascript:alert(1)")));
        let image = root.children[1].as_element().unwrap();
        assert_eq!(image.attr("src"), Some(&PropertyValue::from("https://example.com/a.png")));
        // Safe URLs are still rewritten (to themselves)
        assert_eq!(stats.urls_rewritten, 2);
    }

    #[test]
    fn test_url_attribute_tag_restriction() {
        let mut root = Root::new(vec![
            Element::new("div").with_attr("href", "javascript:x").into(),
            Element::new("span").with_attr("itemid", "javascript:x").into(),
        ]);
        enforce(&mut root, &Policy::default());
        assert_eq!(
            root.children[0].as_element().unwrap().attr("href"),
            Some(&PropertyValue::from("javascript:x"))
        );
        assert_eq!(
            root.children[1].as_element().unwrap().attr("itemid"),
            Some(&PropertyValue::from(""))
        );
    }

    #[test]
    fn test_custom_url_transform() {
        let transform: UrlTransform = Arc::new(|url: &str, key: &str, element: &Element| {
            assert_eq!(key, "href");
            assert_eq!(element.tag, "a");
            match url {
                "keep" => UrlRewrite::Unchanged,
                "clear" => UrlRewrite::Clear,
                other => UrlRewrite::Set(format!("/proxy?u={other}")),
            }
        });
        let mut root = Root::new(vec![
            Element::new("a").with_attr("href", "keep").into(),
            Element::new("a").with_attr("href", "clear").into(),
            Element::new("a").with_attr("href", "x").into(),
        ]);
        let stats = enforce(&mut root, &Policy::default().with_url_transform(transform));
        let hrefs: Vec<Option<&PropertyValue>> = root
            .children
            .iter()
            .map(|n| n.as_element().unwrap().attr("href"))
            .collect();
        assert_eq!(
            hrefs,
            vec![
                Some(&PropertyValue::from("keep")),
                Some(&PropertyValue::Null),
                Some(&PropertyValue::from("/proxy?u=x")),
            ]
        );
        assert_eq!(stats.urls_rewritten, 2);
    }

    #[test]
    fn test_enforce_is_idempotent() {
        let allowed = strings(&["p", "a", "br", "em"]);
        let build = || {
            Root::new(vec![
                Element::new("div")
                    .with_child(
                        Element::new("p")
                            .with_child(Node::raw("<br/>"))
                            .with_child(Node::raw("<span>"))
                            .with_child(
                                Element::new("a")
                                    .with_attr("href", "data:x")
                                    .with_child(Node::text("l")),
                            ),
                    )
                    .with_child(
                        Element::new("section")
                            .with_child(Element::new("em").with_child(Node::text("e"))),
                    )
                    .into(),
            ])
        };
        let policy = Policy::new(Some(allowed.as_slice()), None)
            .unwrap()
            .with_unwrap_disallowed(true);

        let mut once = build();
        enforce(&mut once, &policy);
        let mut twice = once.clone();
        let stats = enforce(&mut twice, &policy);

        assert_eq!(once, twice);
        assert_eq!(stats.elements_removed + stats.elements_unwrapped, 0);
        assert!(!once.contains_raw());
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let mut node: Node = Node::text("leaf");
        for _ in 0..50_000 {
            node = Element::new("div").with_child(node).into();
        }
        let mut root = Root::new(vec![node]);
        let disallowed = strings(&["div"]);
        let policy = Policy::new(None, Some(disallowed.as_slice()))
            .unwrap()
            .with_unwrap_disallowed(true);
        enforce(&mut root, &policy);
        assert_eq!(root, Root::new(vec![Node::text("leaf")]));
    }

    #[test]
    fn test_parent_attributes_visible_to_predicate() {
        let policy = Policy::default().with_allow_element(Some(Arc::new(
            |element: &Element, _index: usize, parent: ParentRef<'_>| {
                element.tag != "span"
                    || parent
                        .properties()
                        .and_then(|props| props.get("class"))
                        .is_none_or(|class| class.to_attribute_string() != "ad")
            },
        )));
        let mut root = Root::new(vec![
            Element::new("div")
                .with_attr("class", "ad")
                .with_child(Element::new("span"))
                .into(),
            Element::new("div").with_child(Element::new("span")).into(),
        ]);
        enforce(&mut root, &policy);
        assert_eq!(
            root,
            Root::new(vec![
                Element::new("div").with_attr("class", "ad").into(),
                Element::new("div").with_child(Element::new("span")).into(),
            ])
        );
    }

    #[test]
    fn test_deep_kept_tree() {
        let depth = 50_000;
        let mut node: Node = Element::new("a")
            .with_attr("href", "javascript:x")
            .with_child(Node::raw("<br>"))
            .into();
        for _ in 0..depth {
            node = Element::new("blockquote").with_child(node).into();
        }
        let mut root = Root::new(vec![node]);

        let stats = enforce(&mut root, &Policy::default());
        assert_eq!(stats.urls_rewritten, 1);
        assert_eq!(stats.line_breaks, 1);
        assert_eq!(stats.elements_removed + stats.elements_unwrapped, 0);

        let mut levels = 0;
        let mut current = &root.children;
        while let [Node::Element(element)] = current.as_slice() {
            if element.tag == "a" {
                assert_eq!(element.attr("href"), Some(&PropertyValue::from("")));
                assert_eq!(element.children, vec![Node::from(Element::new("br"))]);
                break;
            }
            levels += 1;
            current = &element.children;
        }
        assert_eq!(levels, depth);
    }
}
