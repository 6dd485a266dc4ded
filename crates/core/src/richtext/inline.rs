use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Strike,
    Code,
}

impl Mark {
    fn from_tag(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "b" | "strong" => Some(Self::Bold),
            "i" | "em" => Some(Self::Italic),
            "u" => Some(Self::Underline),
            "s" | "strike" => Some(Self::Strike),
            "code" => Some(Self::Code),
            _ => None,
        }
    }

    pub fn html_tag(&self) -> &'static str {
        match self {
            Self::Bold => "strong",
            Self::Italic => "em",
            Self::Underline => "u",
            Self::Strike => "s",
            Self::Code => "code",
        }
    }
}

/// A run of text sharing one mark set. Marks are kept sorted and unique.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Span {
    pub text: String,
    pub marks: Vec<Mark>,
}

#[derive(Debug)]
enum Token {
    Text(String),
    Open { mark: Mark, raw: String },
    Close { mark: Mark, raw: String },
}

impl Token {
    fn raw(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Open { raw, .. } | Self::Close { raw, .. } => raw,
        }
    }
}

/// Splits a line into styled spans. Tags without a partner, and tags that
/// are not emphasis tags, stay in the text verbatim.
pub fn parse_spans(line: &str) -> Vec<Span> {
    let tokens = tokenize(line);
    let matched = match_pairs(&tokens);

    let mut spans: Vec<Span> = Vec::new();
    let mut active: Vec<Mark> = Vec::new();

    for (index, token) in tokens.iter().enumerate() {
        match token {
            Token::Open { mark, .. } if matched[index] => active.push(*mark),
            Token::Close { mark, .. } if matched[index] => {
                if let Some(position) = active.iter().rposition(|open| open == mark) {
                    active.remove(position);
                }
            }
            other => push_text(&mut spans, other.raw(), &active),
        }
    }

    spans
}

fn push_text(spans: &mut Vec<Span>, text: &str, active: &[Mark]) {
    if text.is_empty() {
        return;
    }
    let mut marks = active.to_vec();
    marks.sort();
    marks.dedup();

    match spans.last_mut() {
        Some(last) if last.marks == marks => last.text.push_str(text),
        _ => spans.push(Span { text: text.to_string(), marks }),
    }
}

fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut rest = line;

    while let Some(start) = rest.find('<') {
        text.push_str(&rest[..start]);
        let candidate = &rest[start..];

        match parse_tag(candidate) {
            Some((token, consumed)) => {
                if !text.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut text)));
                }
                tokens.push(token);
                rest = &candidate[consumed..];
            }
            None => {
                text.push('<');
                rest = &candidate[1..];
            }
        }
    }

    text.push_str(rest);
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
    tokens
}

fn parse_tag(candidate: &str) -> Option<(Token, usize)> {
    let end = candidate.find('>')?;
    let inner = &candidate[1..end];
    let (closing, name) = match inner.strip_prefix('/') {
        Some(name) => (true, name),
        None => (false, inner),
    };
    if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return None;
    }

    let mark = Mark::from_tag(name)?;
    let raw = candidate[..=end].to_string();
    let token = if closing { Token::Close { mark, raw } } else { Token::Open { mark, raw } };
    Some((token, end + 1))
}

fn match_pairs(tokens: &[Token]) -> Vec<bool> {
    let mut matched = vec![false; tokens.len()];
    let mut open: Vec<(usize, Mark)> = Vec::new();

    for (index, token) in tokens.iter().enumerate() {
        match token {
            Token::Open { mark, .. } => open.push((index, *mark)),
            Token::Close { mark, .. } => {
                if let Some(position) = open.iter().rposition(|(_, candidate)| candidate == mark) {
                    let (open_index, _) = open.remove(position);
                    matched[open_index] = true;
                    matched[index] = true;
                }
            }
            Token::Text(_) => {}
        }
    }

    matched
}

#[cfg(test)]
mod tests {
    use super::{parse_spans, Mark, Span};

    fn span(text: &str, marks: &[Mark]) -> Span {
        Span { text: text.to_string(), marks: marks.to_vec() }
    }

    #[test]
    fn plain_text_is_one_unmarked_span() {
        assert_eq!(parse_spans("hello world"), vec![span("hello world", &[])]);
    }

    #[test]
    fn nested_tags_accumulate_marks() {
        assert_eq!(
            parse_spans("a <b>bold <i>both</i></b> z"),
            vec![
                span("a ", &[]),
                span("bold ", &[Mark::Bold]),
                span("both", &[Mark::Bold, Mark::Italic]),
                span(" z", &[]),
            ]
        );
    }

    #[test]
    fn tag_aliases_share_a_mark() {
        assert_eq!(
            parse_spans("<strong>x</strong><B>y</B><strike>z</strike>"),
            vec![span("xy", &[Mark::Bold]), span("z", &[Mark::Strike])]
        );
    }

    #[test]
    fn unmatched_and_unknown_tags_stay_literal() {
        assert_eq!(parse_spans("<b>open only"), vec![span("<b>open only", &[])]);
        assert_eq!(parse_spans("close only</i>"), vec![span("close only</i>", &[])]);
        assert_eq!(
            parse_spans("<span>x</span> 1 < 2"),
            vec![span("<span>x</span> 1 < 2", &[])]
        );
    }

    #[test]
    fn interleaved_tags_do_not_panic() {
        let spans = parse_spans("<b>1<i>2</b>3</i>");
        assert_eq!(
            spans,
            vec![span("1", &[Mark::Bold]), span("2", &[Mark::Bold, Mark::Italic]), span("3", &[Mark::Italic])]
        );
    }
}
