//! Typesetting back ends.
//!
//! A [`Typesetter`] turns a [`RenderElement`] into display text. The
//! renderers wrap a typesetter in the FIFO queue contract of
//! [`crate::host::Renderer`]:
//! - [`FifoRenderer`]: resolves only when asked, for deterministic hosts and tests
//! - [`ThreadedRenderer`]: resolves on a worker thread

mod fifo;
mod threaded;

pub use fifo::FifoRenderer;
pub use threaded::ThreadedRenderer;

use crate::overlay::{DisplayMode, RenderElement};
use crate::scanner::scan_line;

/// Output of a finished render job, installed as a mark replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFormula {
    /// The element that was typeset.
    pub element: RenderElement,
    /// What the host should draw in place of the source text.
    pub text: String,
}

impl RenderedFormula {
    pub const fn mode(&self) -> DisplayMode {
        self.element.mode
    }
}

/// Produces display text for an element.
pub trait Typesetter {
    fn typeset(&self, element: &RenderElement) -> String;

    fn render(&self, element: RenderElement) -> RenderedFormula {
        let text = self.typeset(&element);
        RenderedFormula { element, text }
    }
}

/// Commands replaced by a Unicode symbol. Longer names come first so
/// `\infty` is not read as `\in`.
const SYMBOLS: &[(&str, &str)] = &[
    (r"\mathbb{R}", "ℝ"),
    (r"\mathbb{N}", "ℕ"),
    (r"\mathbb{Z}", "ℤ"),
    (r"\rightarrow", "→"),
    (r"\epsilon", "ε"),
    (r"\lambda", "λ"),
    (r"\forall", "∀"),
    (r"\exists", "∃"),
    (r"\infty", "∞"),
    (r"\alpha", "α"),
    (r"\gamma", "γ"),
    (r"\delta", "δ"),
    (r"\theta", "θ"),
    (r"\sigma", "σ"),
    (r"\times", "×"),
    (r"\beta", "β"),
    (r"\cdot", "·"),
    (r"\sqrt", "√"),
    (r"\leq", "≤"),
    (r"\geq", "≥"),
    (r"\neq", "≠"),
    (r"\sum", "∑"),
    (r"\int", "∫"),
    (r"\mu", "μ"),
    (r"\pi", "π"),
    (r"\to", "→"),
    (r"\in", "∈"),
];

const SUPERSCRIPTS: &[(char, char)] = &[
    ('0', '⁰'),
    ('1', '¹'),
    ('2', '²'),
    ('3', '³'),
    ('4', '⁴'),
    ('5', '⁵'),
    ('6', '⁶'),
    ('7', '⁷'),
    ('8', '⁸'),
    ('9', '⁹'),
    ('n', 'ⁿ'),
    ('i', 'ⁱ'),
    ('+', '⁺'),
    ('-', '⁻'),
];

const SUBSCRIPTS: &[(char, char)] = &[
    ('0', '₀'),
    ('1', '₁'),
    ('2', '₂'),
    ('3', '₃'),
    ('4', '₄'),
    ('5', '₅'),
    ('6', '₆'),
    ('7', '₇'),
    ('8', '₈'),
    ('9', '₉'),
    ('i', 'ᵢ'),
    ('n', 'ₙ'),
];

/// Text-only typesetter: strips delimiters, maps a handful of commands to
/// Unicode and folds single-character scripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTypesetter;

impl Typesetter for PlainTypesetter {
    fn typeset(&self, element: &RenderElement) -> String {
        let source = element.content();
        let body = strip_delimiters(&source);
        let mut text = body.to_string();
        for (command, symbol) in SYMBOLS {
            text = text.replace(command, symbol);
        }
        let text = fold_scripts(&text);
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        match element.mode {
            DisplayMode::Inline => text,
            DisplayMode::Display => format!("  {text}  "),
        }
    }
}

/// The body of a delimited formula, or the whole text if it is not one.
fn strip_delimiters(source: &str) -> String {
    let spans = scan_line(source);
    let Some(span) = spans.first().filter(|span| span.start == 0) else {
        return source.to_string();
    };
    let body: String = source
        .chars()
        .skip(span.body_start)
        .take(span.body_end - span.body_start)
        .collect();
    let rest: String = source.chars().skip(span.end).collect();
    format!("{body}{rest}")
}

fn fold_scripts(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        let table = match ch {
            '^' => SUPERSCRIPTS,
            '_' => SUBSCRIPTS,
            _ => {
                out.push(ch);
                continue;
            }
        };
        let mapped = chars
            .peek()
            .and_then(|next| table.iter().find(|(from, _)| from == next))
            .map(|(_, to)| *to);
        if let Some(mapped) = mapped {
            chars.next();
            out.push(mapped);
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(source: &str, mode: DisplayMode) -> RenderElement {
        RenderElement {
            source: source.to_string(),
            invocation: None,
            mode,
            style_class: None,
        }
    }

    #[test]
    fn test_plain_typesetter_strips_inline_delimiters() {
        let out = PlainTypesetter.typeset(&element("$x^2$", DisplayMode::Inline));
        assert_eq!(out, "x²");
    }

    #[test]
    fn test_plain_typesetter_maps_symbols() {
        let out = PlainTypesetter.typeset(&element(r"\(\alpha \leq \infty\)", DisplayMode::Inline));
        assert_eq!(out, "α ≤ ∞");
    }

    #[test]
    fn test_plain_typesetter_pads_display_mode() {
        let out = PlainTypesetter.typeset(&element("$$a_1$$", DisplayMode::Display));
        assert_eq!(out, "  a₁  ");
    }

    #[test]
    fn test_plain_typesetter_renders_command_invocation() {
        let mut el = element(r"\newcommand{\R}", DisplayMode::Inline);
        el.invocation = Some(r"\R".to_string());
        let out = PlainTypesetter.typeset(&el);
        assert!(!out.trim().is_empty(), "definition should never render empty");
    }

    #[test]
    fn test_unknown_script_is_left_alone() {
        assert_eq!(fold_scripts("x^{ab}"), "x^{ab}");
        assert_eq!(fold_scripts("trailing^"), "trailing^");
    }

    #[test]
    fn test_render_keeps_element() {
        let el = element("$y$", DisplayMode::Inline);
        let rendered = PlainTypesetter.render(el.clone());
        assert_eq!(rendered.element, el);
        assert_eq!(rendered.text, "y");
        assert_eq!(rendered.mode(), DisplayMode::Inline);
    }
}
