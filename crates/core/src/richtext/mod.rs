//! Plain text to rich-text HTML for note and activity bodies.
//!
//! Text is read into a small block model first (paragraphs and bullet
//! lists made of styled spans) and rendered from there, so the HTML is
//! always escaped and well-formed regardless of what the author typed.

mod inline;

use serde::Serialize;

pub use inline::{parse_spans, Mark, Span};

const CONTAINER_OPEN: &str = "<body>";
const CONTAINER_CLOSE: &str = "</body>";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Line {
    pub spans: Vec<Span>,
}

impl Line {
    fn parse(text: &str) -> Self {
        Self { spans: parse_spans(text) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "lines", rename_all = "snake_case")]
pub enum Block {
    Paragraph(Vec<Line>),
    List(Vec<Line>),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn parse(text: &str) -> Self {
        let mut blocks = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for raw_line in text.split('\n') {
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            if line.trim().is_empty() {
                if !current.is_empty() {
                    blocks.push(build_block(&current));
                    current.clear();
                }
                continue;
            }
            current.push(line);
        }
        if !current.is_empty() {
            blocks.push(build_block(&current));
        }

        Self { blocks }
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from(CONTAINER_OPEN);
        for block in &self.blocks {
            match block {
                Block::Paragraph(lines) => {
                    html.push_str("<p>");
                    for (index, line) in lines.iter().enumerate() {
                        if index > 0 {
                            html.push_str("<br>");
                        }
                        render_line(&mut html, line);
                    }
                    html.push_str("</p>");
                }
                Block::List(items) => {
                    html.push_str("<ul>");
                    for item in items {
                        html.push_str("<li>");
                        render_line(&mut html, item);
                        html.push_str("</li>");
                    }
                    html.push_str("</ul>");
                }
            }
        }
        html.push_str(CONTAINER_CLOSE);
        html
    }
}

/// Converts free-form text into the CRM's rich-text HTML. Input that is
/// already wrapped in a `<body>` element is returned untouched.
pub fn plain_text_to_html(text: &str) -> String {
    if has_body_tag(text) {
        return text.to_string();
    }
    Document::parse(text).to_html()
}

fn has_body_tag(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    lowered.match_indices("<body").any(|(index, tag)| {
        matches!(
            lowered[index + tag.len()..].chars().next(),
            Some('>') | Some('/') | Some(' ') | Some('\t') | Some('\n') | Some('\r')
        )
    })
}

fn build_block(lines: &[&str]) -> Block {
    let items: Option<Vec<&str>> = lines.iter().map(|line| list_item(line)).collect();
    match items {
        Some(items) => Block::List(items.into_iter().map(Line::parse).collect()),
        None => Block::Paragraph(lines.iter().map(|line| Line::parse(line.trim())).collect()),
    }
}

fn list_item(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    trimmed.strip_prefix('-').or_else(|| trimmed.strip_prefix('*')).map(str::trim)
}

fn render_line(html: &mut String, line: &Line) {
    for span in &line.spans {
        for mark in &span.marks {
            html.push('<');
            html.push_str(mark.html_tag());
            html.push('>');
        }
        push_escaped(html, &span.text);
        for mark in span.marks.iter().rev() {
            html.push_str("</");
            html.push_str(mark.html_tag());
            html.push('>');
        }
    }
}

fn push_escaped(html: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => html.push_str("&amp;"),
            '<' => html.push_str("&lt;"),
            '>' => html.push_str("&gt;"),
            '"' => html.push_str("&quot;"),
            other => html.push(other),
        }
    }
}
