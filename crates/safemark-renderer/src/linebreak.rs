//! Line-break normalization for markdown source.
//!
//! Markdown treats a single newline between two lines of prose as a soft
//! break inside one paragraph. [`normalize_line_breaks`] doubles the break
//! between adjacent non-empty lines so each line becomes a paragraph, except
//! between consecutive table lines or consecutive list lines.

use std::sync::LazyLock;

use regex::Regex;

static UNORDERED_LIST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-*+]\s").unwrap());

static ORDERED_LIST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+[.)]\s").unwrap());

static TABLE_SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\|?[\s:]*-+[\s:]*(\|[\s:]*-+[\s:]*)+\|?$").unwrap()
});

static TABLE_ROW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\|(.+\|)+\s*$").unwrap());

/// Block classification of a single source line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LineContext {
    /// Line is a table row or a table separator row.
    pub is_table: bool,
    /// Line starts an ordered or unordered list item.
    pub is_list: bool,
    /// Line is empty or whitespace-only.
    pub is_empty: bool,
}

impl LineContext {
    /// Classify a line. Leading and trailing whitespace is ignored.
    #[must_use]
    pub fn analyze(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self {
                is_empty: true,
                ..Self::default()
            };
        }

        Self {
            is_table: TABLE_ROW_RE.is_match(trimmed) || TABLE_SEPARATOR_RE.is_match(trimmed),
            is_list: UNORDERED_LIST_RE.is_match(trimmed) || ORDERED_LIST_RE.is_match(trimmed),
            is_empty: false,
        }
    }

    /// Whether `self` followed by `next` belongs to the same table or list.
    #[must_use]
    pub fn continues_block(self, next: Self) -> bool {
        (self.is_table && next.is_table) || (self.is_list && next.is_list)
    }
}

/// Rewrite line breaks so that every line of prose becomes its own paragraph.
///
/// - Lines next to an empty line keep a single `\n`
/// - Consecutive table lines and consecutive list lines keep a single `\n`
/// - Any other pair of adjacent lines is joined with `\n\n`
///
/// No break is added after the last line.
///
/// # Examples
///
/// ```
/// use safemark_renderer::normalize_line_breaks;
///
/// assert_eq!(normalize_line_breaks("p1\np2"), "p1\n\np2");
/// assert_eq!(normalize_line_breaks("- x\n- y"), "- x\n- y");
/// ```
#[must_use]
pub fn normalize_line_breaks(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }

    let lines: Vec<&str> = content.split('\n').collect();
    let mut output = String::with_capacity(content.len() + lines.len());

    for (idx, line) in lines.iter().enumerate() {
        output.push_str(line);

        let Some(next) = lines.get(idx + 1) else {
            break;
        };

        let current = LineContext::analyze(line);
        let next = LineContext::analyze(next);

        if current.is_empty || next.is_empty || current.continues_block(next) {
            output.push('\n');
        } else {
            output.push_str("\n\n");
        }
    }

    output
}
