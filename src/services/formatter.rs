use crate::types::FormatStyle;
use regex::Regex;

/// Turns a page's resolved text into its presentational form.
pub trait ContentFormatter: Send + Sync {
    fn format(&self, text: &str) -> String;
}

/// Paragraph markup: blank-line runs become paragraph boundaries, single
/// line breaks become `<br>`, and each paragraph is wrapped in `<p>`.
pub struct HtmlFormatter {
    paragraph_break: Regex,
    block_markup: Regex,
}

impl HtmlFormatter {
    pub fn new() -> Self {
        Self {
            paragraph_break: Regex::new(r"\n[ \t]*\n\s*").unwrap(),
            block_markup: Regex::new(r"(?i)<(p|h[1-6]|div|ul|ol|table|blockquote)[\s>]").unwrap(),
        }
    }
}

impl Default for HtmlFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentFormatter for HtmlFormatter {
    fn format(&self, text: &str) -> String {
        let text = normalize_line_endings(text);
        let text = text.trim();

        if text.is_empty() {
            return String::new();
        }

        // Already structured by the author
        if self.block_markup.is_match(text) {
            return text.to_string();
        }

        self.paragraph_break
            .split(text)
            .map(|paragraph| format!("<p>{}</p>", paragraph.trim().replace('\n', "<br>")))
            .collect()
    }
}

/// Normalized plain text with at most one blank line between paragraphs.
pub struct PlainFormatter {
    blank_lines: Regex,
}

impl PlainFormatter {
    pub fn new() -> Self {
        Self {
            blank_lines: Regex::new(r"\n[ \t]*\n\s*").unwrap(),
        }
    }
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentFormatter for PlainFormatter {
    fn format(&self, text: &str) -> String {
        let text = normalize_line_endings(text);
        self.blank_lines
            .replace_all(text.trim(), "\n\n")
            .into_owned()
    }
}

pub fn formatter_for(style: FormatStyle) -> Box<dyn ContentFormatter> {
    match style {
        FormatStyle::Html => Box::new(HtmlFormatter::new()),
        FormatStyle::Plain => Box::new(PlainFormatter::new()),
    }
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
