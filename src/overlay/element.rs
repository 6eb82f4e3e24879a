//! Render-surrogate construction.

use std::sync::LazyLock;

use regex::Regex;

/// Captures the command name of a `\newcommand{\name}` style definition.
static DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\\(?:re)?newcommand\{(\\[^}]+)\}")
        .unwrap_or_else(|err| unreachable!("definition pattern is valid: {err}"))
});

/// Opening delimiters that make a formula a display block.
const DISPLAY_PREFIXES: &[&str] = &["$$", r"\[", r"\begin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Inline,
    Display,
}

/// The element handed to the renderer for one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderElement {
    /// Literal source text of the formula, delimiters included.
    pub source: String,
    /// Invocation appended after a command definition so the output is
    /// never empty.
    pub invocation: Option<String>,
    pub mode: DisplayMode,
    /// Style inherited from the surrounding tokens, delimiter classes removed.
    pub style_class: Option<String>,
}

impl RenderElement {
    /// Build the element for `source`, given the token classes sampled one
    /// character into the span.
    pub fn build(source: &str, token_class: Option<&str>) -> Self {
        let invocation = DEFINITION
            .captures(source)
            .and_then(|caps| caps.get(1))
            .map(|name| name.as_str().to_string());
        let mode = if DISPLAY_PREFIXES
            .iter()
            .any(|prefix| source.starts_with(prefix))
        {
            DisplayMode::Display
        } else {
            DisplayMode::Inline
        };
        Self {
            source: source.to_string(),
            invocation,
            mode,
            style_class: token_class.and_then(inherited_class),
        }
    }

    /// Everything the typesetter should see.
    pub fn content(&self) -> String {
        match &self.invocation {
            Some(invocation) => format!("{}{invocation}", self.source),
            None => self.source.clone(),
        }
    }

    pub fn is_display(&self) -> bool {
        self.mode == DisplayMode::Display
    }
}

fn inherited_class(tokens: &str) -> Option<String> {
    let kept: Vec<&str> = tokens
        .split_whitespace()
        .filter(|token| *token != "delimiter")
        .collect();
    (!kept.is_empty()).then(|| kept.join(" "))
}
