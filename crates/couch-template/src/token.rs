//! Template tokenizer.
//!
//! Splits template text into literal spans and placeholder tokens. Tokenizing
//! happens once per template; the resulting segments are resolved for every
//! document.

use crate::context::PrefixKind;
use crate::error::TemplateError;

/// A resolvable placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderToken {
    /// `#{doc_id_counter}`
    IdCounterRef,
    /// `#{db_prefix}` or `#{user_prefix}`
    PrefixRef(PrefixKind),
    /// `#{random_int(min, max)}`
    RandomInt { min: i64, max: i64 },
    /// `#{random_string}` (no length) or `#{random_string(k)}`
    RandomString { len: Option<usize> },
    /// `#{pick(a, b, c)}`
    Pick(Vec<String>),
    /// `#{file(path)}`, kept for the attachment resolver
    FileRef(String),
    /// `#{if(expr)}`; the guarded field name follows as literal text
    Conditional { expr: Vec<Segment> },
    /// A call whose arguments contain placeholders. The arguments are
    /// resolved first and parsed for every document.
    Call { kind: CallKind, args: Vec<Segment> },
}

/// Placeholders that take an argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    RandomInt,
    RandomString,
    Pick,
    File,
}

impl CallKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "random_int" => Some(CallKind::RandomInt),
            "random_string" => Some(CallKind::RandomString),
            "pick" => Some(CallKind::Pick),
            "file" => Some(CallKind::File),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CallKind::RandomInt => "random_int",
            CallKind::RandomString => "random_string",
            CallKind::Pick => "pick",
            CallKind::File => "file",
        }
    }
}

/// One span of a tokenized template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// `\#`, rendered as a bare `#`
    EscapedHash,
    Placeholder(PlaceholderToken),
}

/// Tokenize template text into segments.
pub fn tokenize(text: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut tokenizer = Tokenizer { src: text, pos: 0 };
    tokenizer.segments()
}

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
}

/// Pushes pending literal text before a non-literal segment.
fn flush_literal(out: &mut Vec<Segment>, literal: &mut String) {
    if !literal.is_empty() {
        out.push(Segment::Literal(std::mem::take(literal)));
    }
}

impl<'a> Tokenizer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Consume one character and append it to `literal`.
    fn take_char(&mut self, literal: &mut String) {
        if let Some(c) = self.rest().chars().next() {
            literal.push(c);
            self.pos += c.len_utf8();
        }
    }

    fn segments(&mut self) -> Result<Vec<Segment>, TemplateError> {
        let mut out = Vec::new();
        let mut literal = String::new();

        while !self.rest().is_empty() {
            if self.rest().starts_with("\\#") {
                flush_literal(&mut out, &mut literal);
                out.push(Segment::EscapedHash);
                self.pos += 2;
            } else if self.rest().starts_with("#{") {
                match self.placeholder()? {
                    Some(token) => {
                        flush_literal(&mut out, &mut literal);
                        out.push(Segment::Placeholder(token));
                    }
                    None => {
                        // Unknown placeholders stay verbatim.
                        literal.push_str("#{");
                        self.pos += 2;
                    }
                }
            } else {
                self.take_char(&mut literal);
            }
        }

        flush_literal(&mut out, &mut literal);
        Ok(out)
    }

    /// Parse a placeholder at `#{`.
    ///
    /// Returns `None` without consuming anything when the name is not a known
    /// placeholder.
    fn placeholder(&mut self) -> Result<Option<PlaceholderToken>, TemplateError> {
        let start = self.pos;
        let after_open = &self.src[start + 2..];
        let name_len = after_open
            .bytes()
            .take_while(|b| b.is_ascii_lowercase() || *b == b'_')
            .count();
        let name = &after_open[..name_len];
        let after_name = &after_open[name_len..];

        if after_name.starts_with('}') {
            let token = match name {
                "doc_id_counter" => PlaceholderToken::IdCounterRef,
                "db_prefix" => PlaceholderToken::PrefixRef(PrefixKind::Db),
                "user_prefix" => PlaceholderToken::PrefixRef(PrefixKind::User),
                "random_string" => PlaceholderToken::RandomString { len: None },
                _ => return Ok(None),
            };
            self.pos = start + 2 + name_len + 1;
            return Ok(Some(token));
        }

        if !after_name.starts_with('(') {
            return Ok(None);
        }

        let args_start = start + 2 + name_len + 1;
        if name == "if" {
            self.pos = args_start;
            let expr = self.expression(start)?;
            return Ok(Some(PlaceholderToken::Conditional { expr }));
        }
        let Some(kind) = CallKind::from_name(name) else {
            return Ok(None);
        };

        self.pos = args_start;
        let args = self.arguments(start)?;
        // Plain arguments are checked now so a malformed call fails at load.
        match literal_text(&args) {
            Some(text) => parse_call(kind, &text, &self.src[start..self.pos]).map(Some),
            None => Ok(Some(PlaceholderToken::Call { kind, args })),
        }
    }

    /// Parse call arguments up to the closing `)}`, tokenizing nested
    /// placeholders.
    fn arguments(&mut self, start: usize) -> Result<Vec<Segment>, TemplateError> {
        let mut out = Vec::new();
        let mut literal = String::new();

        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(TemplateError::UnterminatedPlaceholder(start));
            }
            if rest.starts_with(")}") {
                self.pos += 2;
                flush_literal(&mut out, &mut literal);
                return Ok(out);
            }
            if rest.starts_with("\\#") {
                flush_literal(&mut out, &mut literal);
                out.push(Segment::EscapedHash);
                self.pos += 2;
            } else if rest.starts_with("#{") {
                match self.placeholder()? {
                    Some(token) => {
                        flush_literal(&mut out, &mut literal);
                        out.push(Segment::Placeholder(token));
                    }
                    None => {
                        literal.push_str("#{");
                        self.pos += 2;
                    }
                }
            } else {
                self.take_char(&mut literal);
            }
        }
    }

    /// Parse the body of `#{if(...)}` up to the parenthesis that balances the
    /// opening one, resolving nested placeholders.
    fn expression(&mut self, start: usize) -> Result<Vec<Segment>, TemplateError> {
        let mut out = Vec::new();
        let mut literal = String::new();
        let mut depth = 0usize;

        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(TemplateError::UnterminatedPlaceholder(start));
            }
            if rest.starts_with("\\#") {
                flush_literal(&mut out, &mut literal);
                out.push(Segment::EscapedHash);
                self.pos += 2;
            } else if rest.starts_with("#{") {
                match self.placeholder()? {
                    Some(token) => {
                        flush_literal(&mut out, &mut literal);
                        out.push(Segment::Placeholder(token));
                    }
                    None => {
                        literal.push_str("#{");
                        self.pos += 2;
                    }
                }
            } else if rest.starts_with('(') {
                depth += 1;
                self.take_char(&mut literal);
            } else if rest.starts_with(')') {
                if depth == 0 {
                    if !rest.starts_with(")}") {
                        return Err(TemplateError::InvalidPlaceholder {
                            placeholder: self.src[start..self.pos + 1].to_string(),
                            reason: "unbalanced parenthesis in conditional".to_string(),
                        });
                    }
                    self.pos += 2;
                    flush_literal(&mut out, &mut literal);
                    return Ok(out);
                }
                depth -= 1;
                self.take_char(&mut literal);
            } else {
                self.take_char(&mut literal);
            }
        }
    }
}

fn invalid(raw: &str, reason: impl Into<String>) -> TemplateError {
    TemplateError::InvalidPlaceholder {
        placeholder: raw.to_string(),
        reason: reason.into(),
    }
}

/// The text of `segments` when none of them is a placeholder.
fn literal_text(segments: &[Segment]) -> Option<String> {
    let mut text = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(s) => text.push_str(s),
            Segment::EscapedHash => text.push('#'),
            Segment::Placeholder(_) => return None,
        }
    }
    Some(text)
}

/// Turn resolved call arguments into a concrete token.
pub(crate) fn parse_call(
    kind: CallKind,
    args: &str,
    raw: &str,
) -> Result<PlaceholderToken, TemplateError> {
    match kind {
        CallKind::RandomInt => {
            let bounds: Vec<&str> = args.split(',').map(str::trim).collect();
            if bounds.len() != 2 {
                return Err(invalid(raw, "expected two integer bounds"));
            }
            let min: i64 = bounds[0]
                .parse()
                .map_err(|_| invalid(raw, format!("'{}' is not an integer", bounds[0])))?;
            let max: i64 = bounds[1]
                .parse()
                .map_err(|_| invalid(raw, format!("'{}' is not an integer", bounds[1])))?;
            if min > max {
                return Err(invalid(raw, "lower bound exceeds upper bound"));
            }
            Ok(PlaceholderToken::RandomInt { min, max })
        }
        CallKind::RandomString => {
            let len: usize = args
                .trim()
                .parse()
                .map_err(|_| invalid(raw, "expected a non-negative length"))?;
            Ok(PlaceholderToken::RandomString { len: Some(len) })
        }
        CallKind::Pick => Ok(PlaceholderToken::Pick(
            args.split(',').map(|s| s.trim().to_string()).collect(),
        )),
        CallKind::File => {
            let path = args.trim();
            if path.is_empty() {
                return Err(invalid(raw, "missing file path"));
            }
            Ok(PlaceholderToken::FileRef(path.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Segment {
        Segment::Literal(s.to_string())
    }

    fn ph(token: PlaceholderToken) -> Segment {
        Segment::Placeholder(token)
    }

    #[test]
    fn test_tokenize_plain_literal() {
        assert_eq!(tokenize(r#"{"a": 1}"#).unwrap(), vec![lit(r#"{"a": 1}"#)]);
    }

    #[test]
    fn test_tokenize_simple_references() {
        let segments = tokenize(r##"{"_id": "#{db_prefix}-#{doc_id_counter}"}"##).unwrap();
        assert_eq!(
            segments,
            vec![
                lit(r#"{"_id": ""#),
                ph(PlaceholderToken::PrefixRef(PrefixKind::Db)),
                lit("-"),
                ph(PlaceholderToken::IdCounterRef),
                lit(r#""}"#),
            ]
        );
    }

    #[test]
    fn test_tokenize_calls() {
        let segments =
            tokenize("#{random_int( 3 , 9 )}#{random_string}#{random_string(12)}#{pick(a, b ,c)}")
                .unwrap();
        assert_eq!(
            segments,
            vec![
                ph(PlaceholderToken::RandomInt { min: 3, max: 9 }),
                ph(PlaceholderToken::RandomString { len: None }),
                ph(PlaceholderToken::RandomString { len: Some(12) }),
                ph(PlaceholderToken::Pick(vec![
                    "a".to_string(),
                    "b".to_string(),
                    "c".to_string()
                ])),
            ]
        );
    }

    #[test]
    fn test_tokenize_negative_random_int() {
        let segments = tokenize("#{random_int(-5,5)}").unwrap();
        assert_eq!(
            segments,
            vec![ph(PlaceholderToken::RandomInt { min: -5, max: 5 })]
        );
    }

    #[test]
    fn test_tokenize_escaped_hash_is_never_a_placeholder() {
        let segments = tokenize(r"\#{doc_id_counter}").unwrap();
        assert_eq!(
            segments,
            vec![Segment::EscapedHash, lit("{doc_id_counter}")]
        );
    }

    #[test]
    fn test_tokenize_unknown_placeholder_kept_verbatim() {
        assert_eq!(
            tokenize("#{nope} #{other(1)}").unwrap(),
            vec![lit("#{nope} #{other(1)}")]
        );
    }

    #[test]
    fn test_tokenize_conditional_with_nested_placeholder() {
        let segments = tokenize(r##""#{if((#{doc_id_counter} % 2) == 0)}even": 1"##).unwrap();
        assert_eq!(
            segments,
            vec![
                lit("\""),
                ph(PlaceholderToken::Conditional {
                    expr: vec![
                        lit("("),
                        ph(PlaceholderToken::IdCounterRef),
                        lit(" % 2) == 0"),
                    ]
                }),
                lit("even\": 1"),
            ]
        );
    }

    #[test]
    fn test_tokenize_call_with_nested_placeholders() {
        let segments = tokenize("#{pick(#{db_prefix}, x)}#{random_int(1,#{doc_id_counter})}").unwrap();
        assert_eq!(
            segments,
            vec![
                ph(PlaceholderToken::Call {
                    kind: CallKind::Pick,
                    args: vec![ph(PlaceholderToken::PrefixRef(PrefixKind::Db)), lit(", x")],
                }),
                ph(PlaceholderToken::Call {
                    kind: CallKind::RandomInt,
                    args: vec![lit("1,"), ph(PlaceholderToken::IdCounterRef)],
                }),
            ]
        );
    }

    #[test]
    fn test_tokenize_nested_call_inside_call() {
        let segments = tokenize("#{pick(a,#{random_int(1,2)})} tail").unwrap();
        assert_eq!(
            segments,
            vec![
                ph(PlaceholderToken::Call {
                    kind: CallKind::Pick,
                    args: vec![lit("a,"), ph(PlaceholderToken::RandomInt { min: 1, max: 2 })],
                }),
                lit(" tail"),
            ]
        );
    }

    #[test]
    fn test_tokenize_file_reference() {
        assert_eq!(
            tokenize("#{file(/tmp/a.txt)}").unwrap(),
            vec![ph(PlaceholderToken::FileRef("/tmp/a.txt".to_string()))]
        );
    }

    #[test]
    fn test_tokenize_rejects_malformed_arguments() {
        assert!(matches!(
            tokenize("#{random_int(1)}"),
            Err(TemplateError::InvalidPlaceholder { .. })
        ));
        assert!(matches!(
            tokenize("#{random_int(9,1)}"),
            Err(TemplateError::InvalidPlaceholder { .. })
        ));
        assert!(matches!(
            tokenize("#{random_string(x)}"),
            Err(TemplateError::InvalidPlaceholder { .. })
        ));
    }

    #[test]
    fn test_tokenize_unterminated() {
        assert!(matches!(
            tokenize("#{random_int(1,2"),
            Err(TemplateError::UnterminatedPlaceholder(0))
        ));
        assert!(matches!(
            tokenize("#{pick(a,#{doc_id_counter}"),
            Err(TemplateError::UnterminatedPlaceholder(0))
        ));
        assert!(matches!(
            tokenize("x #{if(true"),
            Err(TemplateError::UnterminatedPlaceholder(2))
        ));
    }

    #[test]
    fn test_tokenize_keeps_multibyte_text() {
        assert_eq!(tokenize("héllo ✓").unwrap(), vec![lit("héllo ✓")]);
    }
}
