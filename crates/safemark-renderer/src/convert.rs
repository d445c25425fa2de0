//! Markdown event stream to document tree conversion.
//!
//! [`TreeBuilder`] consumes pulldown-cmark events and produces a [`Root`]
//! using HTML tag names (`p`, `h2`, `pre > code`, `table > thead/tbody`, ...).
//! Embedded HTML is either kept as [`Node::Raw`] fragments for the policy
//! pass to resolve, or dropped when [`ConvertOptions::allow_dangerous_html`]
//! is off.

use pulldown_cmark::{
    Alignment, CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd,
};

use crate::tree::{Element, Node, Root};

/// Parsed markdown, as consumed by pre-conversion stages.
pub type MarkdownEvents = Vec<Event<'static>>;

/// Options for markdown parsing and tree conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Keep embedded HTML as raw fragments instead of dropping it.
    pub allow_dangerous_html: bool,
    /// Enable GitHub Flavored Markdown (tables, strikethrough, task lists).
    pub gfm: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            allow_dangerous_html: true,
            gfm: true,
        }
    }
}

impl ConvertOptions {
    /// Parser options for the configured dialect.
    #[must_use]
    pub fn parser_options(&self) -> Options {
        if self.gfm {
            Options::ENABLE_TABLES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS
                | Options::ENABLE_GFM
        } else {
            Options::empty()
        }
    }
}

/// Parse markdown into an owned event stream.
#[must_use]
pub fn parse_markdown(source: &str, options: &ConvertOptions) -> MarkdownEvents {
    Parser::new_ext(source, options.parser_options())
        .map(Event::into_static)
        .collect()
}

/// Convert an event stream into a document tree.
pub fn events_to_tree<'a, I>(events: I, options: &ConvertOptions) -> Root
where
    I: IntoIterator<Item = Event<'a>>,
{
    let mut builder = TreeBuilder::new(options.allow_dangerous_html);
    for event in events {
        builder.process_event(event);
    }
    builder.finish()
}

#[derive(Default)]
struct TableState {
    alignments: Vec<Alignment>,
    in_head: bool,
    cell_index: usize,
}

/// Incremental builder that turns markdown events into elements.
///
/// Open elements live on a stack; closing an element appends it to the
/// element below it, or to the root when the stack is empty.
struct TreeBuilder {
    root: Vec<Node>,
    stack: Vec<Element>,
    table: TableState,
    html_block: Option<String>,
    allow_dangerous_html: bool,
}

impl TreeBuilder {
    fn new(allow_dangerous_html: bool) -> Self {
        Self {
            root: Vec::new(),
            stack: Vec::new(),
            table: TableState::default(),
            html_block: None,
            allow_dangerous_html,
        }
    }

    fn finish(mut self) -> Root {
        while !self.stack.is_empty() {
            self.close();
        }
        Root::new(self.root)
    }

    fn current_children(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(element) => &mut element.children,
            None => &mut self.root,
        }
    }

    fn append(&mut self, node: Node) {
        self.current_children().push(node);
    }

    /// Append text, merging with a directly preceding text node.
    fn append_text(&mut self, text: &str) {
        let children = self.current_children();
        if let Some(Node::Text { value }) = children.last_mut() {
            value.push_str(text);
        } else {
            children.push(Node::text(text));
        }
    }

    fn open(&mut self, element: Element) {
        self.stack.push(element);
    }

    fn close(&mut self) {
        if let Some(element) = self.stack.pop() {
            self.append(element.into());
        }
    }

    fn process_event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.append_text(&text),
            Event::Code(code) => {
                self.append(Element::new("code").with_child(Node::text(&*code)).into());
            }
            Event::Html(html) => self.block_html(&html),
            Event::InlineHtml(html) => self.inline_html(&html),
            Event::SoftBreak => self.append_text("\n"),
            Event::HardBreak => self.append(Element::new("br").into()),
            Event::Rule => self.append(Element::new("hr").into()),
            Event::TaskListMarker(checked) => self.append(
                Element::new("input")
                    .with_attr("type", "checkbox")
                    .with_attr("checked", checked)
                    .with_attr("disabled", true)
                    .into(),
            ),
            Event::FootnoteReference(_) | Event::InlineMath(_) | Event::DisplayMath(_) => {
                // Not supported
            }
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.open(Element::new("p")),
            Tag::Heading {
                level, id, classes, ..
            } => {
                let mut element = Element::new(heading_tag(level));
                if let Some(id) = id {
                    element = element.with_attr("id", &*id);
                }
                if !classes.is_empty() {
                    let classes: Vec<&str> = classes.iter().map(|c| &**c).collect();
                    element = element.with_attr("class", classes.join(" "));
                }
                self.open(element);
            }
            Tag::BlockQuote(_) => self.open(Element::new("blockquote")),
            Tag::CodeBlock(kind) => {
                self.open(Element::new("pre"));
                let mut code = Element::new("code");
                if let CodeBlockKind::Fenced(info) = kind {
                    if let Some(lang) = info.split_whitespace().next() {
                        code = code.with_attr("class", format!("language-{lang}"));
                    }
                }
                self.open(code);
            }
            Tag::HtmlBlock => self.html_block = Some(String::new()),
            Tag::List(start) => match start {
                Some(1) => self.open(Element::new("ol")),
                #[allow(clippy::cast_precision_loss)]
                Some(n) => self.open(Element::new("ol").with_attr("start", n as f64)),
                None => self.open(Element::new("ul")),
            },
            Tag::Item => self.open(Element::new("li")),
            Tag::FootnoteDefinition(_) | Tag::MetadataBlock(_) => {}
            Tag::DefinitionList => self.open(Element::new("dl")),
            Tag::DefinitionListTitle => self.open(Element::new("dt")),
            Tag::DefinitionListDefinition => self.open(Element::new("dd")),
            Tag::Table(alignments) => {
                self.table = TableState {
                    alignments,
                    in_head: false,
                    cell_index: 0,
                };
                self.open(Element::new("table"));
            }
            Tag::TableHead => {
                self.table.in_head = true;
                self.table.cell_index = 0;
                self.open(Element::new("thead"));
                self.open(Element::new("tr"));
            }
            Tag::TableRow => {
                self.table.cell_index = 0;
                self.open(Element::new("tr"));
            }
            Tag::TableCell => {
                let name = if self.table.in_head { "th" } else { "td" };
                let mut cell = Element::new(name);
                if let Some(align) = self
                    .table
                    .alignments
                    .get(self.table.cell_index)
                    .and_then(|a| alignment_value(*a))
                {
                    cell = cell.with_attr("align", align);
                }
                self.open(cell);
            }
            Tag::Emphasis => self.open(Element::new("em")),
            Tag::Strong => self.open(Element::new("strong")),
            Tag::Strikethrough => self.open(Element::new("del")),
            Tag::Superscript => self.open(Element::new("sup")),
            Tag::Subscript => self.open(Element::new("sub")),
            Tag::Link {
                dest_url, title, ..
            } => {
                let mut link = Element::new("a").with_attr("href", &*dest_url);
                if !title.is_empty() {
                    link = link.with_attr("title", &*title);
                }
                self.open(link);
            }
            Tag::Image {
                dest_url, title, ..
            } => {
                // Alt text arrives as child events and is folded in at the end tag
                let mut image = Element::new("img").with_attr("src", &*dest_url);
                if !title.is_empty() {
                    image = image.with_attr("title", &*title);
                }
                self.open(image);
            }
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::CodeBlock => {
                self.close();
                self.close();
            }
            TagEnd::HtmlBlock => {
                if let Some(html) = self.html_block.take() {
                    let html = html.trim_end_matches('\n');
                    if self.allow_dangerous_html && !html.is_empty() {
                        self.append(Node::raw(html));
                    }
                }
            }
            TagEnd::FootnoteDefinition | TagEnd::MetadataBlock(_) => {}
            TagEnd::TableHead => {
                self.close();
                self.close();
                self.table.in_head = false;
                self.open(Element::new("tbody"));
            }
            TagEnd::TableCell => {
                self.close();
                self.table.cell_index += 1;
            }
            TagEnd::Table => {
                if self
                    .stack
                    .last()
                    .is_some_and(|e| e.tag == "tbody" && e.children.is_empty())
                {
                    self.stack.pop();
                }
                self.close();
            }
            TagEnd::Image => {
                if let Some(mut image) = self.stack.pop() {
                    let alt = image.text_content();
                    image.children.clear();
                    image = image.with_attr("alt", alt);
                    self.append(image.into());
                }
            }
            TagEnd::Paragraph
            | TagEnd::Heading(_)
            | TagEnd::BlockQuote(_)
            | TagEnd::List(_)
            | TagEnd::Item
            | TagEnd::DefinitionList
            | TagEnd::DefinitionListTitle
            | TagEnd::DefinitionListDefinition
            | TagEnd::TableRow
            | TagEnd::Emphasis
            | TagEnd::Strong
            | TagEnd::Strikethrough
            | TagEnd::Superscript
            | TagEnd::Subscript
            | TagEnd::Link => self.close(),
        }
    }

    fn block_html(&mut self, html: &str) {
        if let Some(block) = self.html_block.as_mut() {
            block.push_str(html);
        } else {
            self.inline_html(html);
        }
    }

    fn inline_html(&mut self, html: &str) {
        if self.allow_dangerous_html {
            self.append(Node::raw(html));
        }
    }
}

fn heading_tag(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "h1",
        HeadingLevel::H2 => "h2",
        HeadingLevel::H3 => "h3",
        HeadingLevel::H4 => "h4",
        HeadingLevel::H5 => "h5",
        HeadingLevel::H6 => "h6",
    }
}

fn alignment_value(alignment: Alignment) -> Option<&'static str> {
    match alignment {
        Alignment::None => None,
        Alignment::Left => Some("left"),
        Alignment::Center => Some("center"),
        Alignment::Right => Some("right"),
    }
}
