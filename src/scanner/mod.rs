//! Single-line formula detection.
//!
//! The scanner is a pure function over one line of text. Alternatives are
//! tried in a fixed priority order at each position and matches never
//! overlap, so `$$a$$` is one display span rather than two inline ones.
//! Delimiter matching is best-effort: a closing delimiter may not follow a
//! backslash or a second delimiter character, but escapes are otherwise
//! ignored. Spans never cross lines.

use std::sync::LazyLock;

use fancy_regex::Regex;

/// Ordered alternation of every recognised formula form.
///
/// Group 1 captures the environment name so `\end{...}` can refer back to it.
static FORMULA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\$\$.*?[^$\\]\$\$",
        r"|\$.*?[^$\\]\$",
        r"|\\\(.*?[^$\\]\\\)",
        r"|\\\[.*?[^$\\]\\\]",
        r"|\\begin\{([\w*]+)\}.*?\\end\{\1\}",
        r"|\\(?:re)?newcommand\{.*?\}",
    ))
    .unwrap_or_else(|err| unreachable!("formula pattern is valid: {err}"))
});

/// Which delimiter form produced a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormulaKind {
    /// `$$…$$`
    DisplayDollars,
    /// `$…$`
    InlineDollars,
    /// `\(…\)`
    InlineParen,
    /// `\[…\]`
    DisplayBracket,
    /// `\begin{name}…\end{name}`
    Environment(String),
    /// `\newcommand{…}` or `\renewcommand{…}`, up to the first closing brace.
    CommandDefinition,
}

impl FormulaKind {
    fn classify(matched: &str) -> Self {
        if matched.starts_with("$$") {
            Self::DisplayDollars
        } else if matched.starts_with('$') {
            Self::InlineDollars
        } else if matched.starts_with(r"\(") {
            Self::InlineParen
        } else if matched.starts_with(r"\[") {
            Self::DisplayBracket
        } else if let Some(rest) = matched.strip_prefix(r"\begin{") {
            let name = rest.split('}').next().unwrap_or_default();
            Self::Environment(name.to_string())
        } else {
            Self::CommandDefinition
        }
    }

    /// Character lengths of the opening and closing delimiters.
    fn delimiter_lengths(&self, matched: &str) -> (usize, usize) {
        match self {
            Self::DisplayDollars | Self::InlineParen | Self::DisplayBracket => (2, 2),
            Self::InlineDollars => (1, 1),
            Self::Environment(name) => {
                let name_len = name.chars().count();
                (r"\begin{}".len() + name_len, r"\end{}".len() + name_len)
            }
            Self::CommandDefinition => {
                let open = matched.find('{').map_or(0, |i| matched[..=i].chars().count());
                (open, 1)
            }
        }
    }

    /// Whether the form is typeset as a display block.
    pub const fn is_display(&self) -> bool {
        matches!(
            self,
            Self::DisplayDollars | Self::DisplayBracket | Self::Environment(_)
        )
    }
}

/// A candidate formula on a line, in character columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// First column of the opening delimiter.
    pub start: usize,
    /// Column just past the closing delimiter.
    pub end: usize,
    /// First column after the opening delimiter.
    pub body_start: usize,
    /// First column of the closing delimiter.
    pub body_end: usize,
    pub kind: FormulaKind,
}

impl Span {
    /// The delimited substring of `line` covered by this span.
    pub fn text<'a>(&self, line: &'a str) -> &'a str {
        slice_chars(line, self.start, self.end)
    }

    /// True if `col` falls on the opening or closing delimiter.
    pub const fn is_delimiter_col(&self, col: usize) -> bool {
        (col >= self.start && col < self.body_start) || (col >= self.body_end && col < self.end)
    }

    pub const fn contains_col(&self, col: usize) -> bool {
        col >= self.start && col < self.end
    }
}

/// Find every formula span on a single line, left to right.
pub fn scan_line(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    // Byte offsets from the regex are converted to character columns
    // incrementally so long lines stay linear.
    let mut last_byte = 0;
    let mut last_col = 0;
    for found in FORMULA.find_iter(text) {
        let Ok(found) = found else {
            // Backtrack limit exceeded; whatever was found so far stands.
            tracing::debug!(line = text, "formula scan aborted");
            break;
        };
        let start = last_col + text[last_byte..found.start()].chars().count();
        let matched = found.as_str();
        let end = start + matched.chars().count();
        last_byte = found.end();
        last_col = end;

        let kind = FormulaKind::classify(matched);
        let (open, close) = kind.delimiter_lengths(matched);
        spans.push(Span {
            start,
            end,
            body_start: start + open,
            body_end: end.saturating_sub(close).max(start + open),
            kind,
        });
    }
    spans
}

fn slice_chars(text: &str, start: usize, end: usize) -> &str {
    let byte_at = |col: usize| {
        text.char_indices()
            .nth(col)
            .map_or(text.len(), |(byte, _)| byte)
    };
    let (from, to) = (byte_at(start), byte_at(end));
    &text[from..to.max(from)]
}
