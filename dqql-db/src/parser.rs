//! Recursive descent parser producing a [`Filter`] tree.
//!
//! ```text
//! filter := or EOF
//! or     := and ("or" and)*
//! and    := term ("and" term)*
//! term   := "(" or ")" | "not" path | path [op value | "in" list]
//! path   := NAME ("->" NAME)*
//! list   := "(" elems? ")" | elems
//! elems  := value ("," value)*
//! ```

use std::ops::Range;

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::ast::{CmpOp, Comparison, Filter, Literal, Name, Path};
use crate::lexer::{lex, Token, TokenKind};

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("syntax error: {message}")]
    #[diagnostic(code(dqql::syntax))]
    Syntax {
        message: String,
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
    },
    #[error("unknown operator `{operator}`")]
    #[diagnostic(
        code(dqql::unknown_operator),
        help("supported operators are =, ==, !=, <, <=, >, >= and in")
    )]
    UnknownOperator {
        operator: String,
        #[source_code]
        src: String,
        #[label("not an operator")]
        span: SourceSpan,
    },
    #[error("comparisons are only supported on the last segment of a path")]
    #[diagnostic(code(dqql::unsupported_path))]
    UnsupportedPath {
        #[source_code]
        src: String,
        #[label("path continues after a comparison")]
        span: SourceSpan,
    },
}

type Result<T> = std::result::Result<T, ParseError>;

/// Deepest parenthesized group accepted, deeper input is a syntax error
pub const MAX_NESTING: usize = 256;

fn to_span(range: Range<usize>) -> SourceSpan {
    (range.start, range.len()).into()
}

/// Parse a filter expression
pub fn parse(source: &str) -> Result<Filter> {
    let mut parser = Parser { source, tokens: lex(source), pos: 0, depth: 0 };
    let filter = parser.parse_or()?;
    match parser.peek() {
        None => Ok(filter),
        Some(tok) => Err(parser.syntax(format!("unexpected {}", tok.kind.describe()), tok.span.clone())),
    }
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    /// Open parentheses enclosing the current term
    depth: usize,
}

impl<'s> Parser<'s> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.peek_kind() == Some(kind) {
            self.bump()
        } else {
            None
        }
    }

    fn eof_span(&self) -> Range<usize> {
        self.source.len()..self.source.len()
    }

    fn syntax(&self, message: impl Into<String>, span: Range<usize>) -> ParseError {
        ParseError::Syntax {
            message: message.into(),
            src: self.source.to_string(),
            span: to_span(span),
        }
    }

    /// Error for the current token (or end of input) not being what was expected
    fn expected(&self, what: &str) -> ParseError {
        match self.peek() {
            Some(tok) => self.syntax(
                format!("expected {what}, found {}", tok.kind.describe()),
                tok.span.clone(),
            ),
            None => self.syntax(format!("expected {what}, found end of input"), self.eof_span()),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        match self.eat(kind) {
            Some(tok) => Ok(tok),
            None => Err(self.expected(kind.describe())),
        }
    }

    fn parse_or(&mut self) -> Result<Filter> {
        let mut terms = vec![self.parse_and()?];
        while self.eat(TokenKind::Or).is_some() {
            terms.push(self.parse_and()?);
        }
        Ok(flatten(terms, Filter::Or))
    }

    fn parse_and(&mut self) -> Result<Filter> {
        let mut terms = vec![self.parse_term()?];
        while self.eat(TokenKind::And).is_some() {
            terms.push(self.parse_term()?);
        }
        Ok(flatten(terms, Filter::And))
    }

    fn parse_term(&mut self) -> Result<Filter> {
        match self.peek_kind() {
            Some(TokenKind::ParenOpen) => {
                let open = self.expect(TokenKind::ParenOpen)?;
                if self.depth >= MAX_NESTING {
                    return Err(self.syntax(
                        format!("parentheses nest deeper than {MAX_NESTING} levels"),
                        open.span,
                    ));
                }
                self.depth += 1;
                let inner = self.parse_or()?;
                self.depth -= 1;
                self.expect(TokenKind::ParenClose)?;
                Ok(inner)
            }
            Some(TokenKind::Not) => {
                self.bump();
                let path = self.parse_path()?;
                match self.peek() {
                    Some(tok) if matches!(tok.kind, TokenKind::Operator | TokenKind::In) => Err(self.syntax(
                        "`not` applies to a tag or path, not to a comparison",
                        tok.span.clone(),
                    )),
                    _ => Ok(Filter::Missing(path)),
                }
            }
            Some(TokenKind::Name) => {
                let path = self.parse_path()?;
                match self.peek_kind() {
                    Some(TokenKind::Operator) => {
                        let op = self.parse_operator()?;
                        let value = self.parse_value()?;
                        self.reject_continuation()?;
                        Ok(Filter::Cmp { path, cmp: Comparison::Binary { op, value } })
                    }
                    Some(TokenKind::In) => {
                        self.bump();
                        let values = self.parse_list()?;
                        self.reject_continuation()?;
                        Ok(Filter::Cmp { path, cmp: Comparison::In(values) })
                    }
                    _ => Ok(Filter::Has(path)),
                }
            }
            _ => Err(self.expected("a tag name, `not` or `(`")),
        }
    }

    /// A comparison ends its path, `->` after the compared value is unsupported
    fn reject_continuation(&mut self) -> Result<()> {
        match self.eat(TokenKind::Arrow) {
            Some(arrow) => Err(ParseError::UnsupportedPath {
                src: self.source.to_string(),
                span: to_span(arrow.span),
            }),
            None => Ok(()),
        }
    }

    fn parse_path(&mut self) -> Result<Path> {
        let mut segments = vec![self.parse_name()?];
        while self.eat(TokenKind::Arrow).is_some() {
            segments.push(self.parse_name()?);
        }
        Ok(Path::new(segments))
    }

    fn parse_name(&mut self) -> Result<Name> {
        let tok = self.expect(TokenKind::Name)?;
        Ok(Name::new(tok.text(self.source), tok.span))
    }

    fn parse_operator(&mut self) -> Result<CmpOp> {
        let tok = self.expect(TokenKind::Operator)?;
        let text = tok.text(self.source);
        CmpOp::from_text(text).ok_or_else(|| ParseError::UnknownOperator {
            operator: text.to_string(),
            src: self.source.to_string(),
            span: to_span(tok.span.clone()),
        })
    }

    /// Any single operand token. Tokens that are not literals are kept so that
    /// typing can reject them with a precise error.
    fn parse_value(&mut self) -> Result<Literal> {
        match self.peek() {
            Some(tok) if tok.kind.is_literal() || tok.kind == TokenKind::Name => {
                let tok = tok.clone();
                self.bump();
                Ok(Literal::new(tok.kind, tok.text(self.source), tok.span))
            }
            _ => Err(self.expected("a value")),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Literal>> {
        let open = self.eat(TokenKind::ParenOpen);
        let mut values = vec![];
        if let Some(open) = &open {
            if let Some(close) = self.eat(TokenKind::ParenClose) {
                return Err(self.syntax("empty `in` list", open.span.start..close.span.end));
            }
        }
        values.push(self.parse_value()?);
        while self.eat(TokenKind::Comma).is_some() {
            values.push(self.parse_value()?);
        }
        if open.is_some() {
            self.expect(TokenKind::ParenClose)?;
        }
        Ok(values)
    }
}

fn flatten(mut terms: Vec<Filter>, combine: fn(Vec<Filter>) -> Filter) -> Filter {
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        combine(terms)
    }
}

#[cfg(test)]
mod test {
    use test_case::test_case;

    use super::*;

    fn name(text: &str, span: Range<usize>) -> Name {
        Name::new(text, span)
    }

    #[test]
    fn test_has() {
        assert_eq!(
            parse("site").unwrap(),
            Filter::Has(Path::new(vec![name("site", 0..4)]))
        );
    }

    #[test]
    fn test_comparison() {
        let filter = parse("temp > 72.5").unwrap();
        assert_eq!(
            filter,
            Filter::Cmp {
                path: Path::new(vec![name("temp", 0..4)]),
                cmp: Comparison::Binary {
                    op: CmpOp::Gt,
                    value: Literal::new(TokenKind::Number, "72.5", 7..11),
                },
            }
        );
    }

    #[test]
    fn test_double_and_single_equals_agree() {
        let double = parse("temp == 5").unwrap();
        let single = parse("temp = 5").unwrap();
        assert_eq!(double.to_string(), single.to_string());
        assert_eq!(single.to_string(), "temp = 5");
    }

    #[test]
    fn test_precedence() {
        let filter = parse("a or b and not c").unwrap();
        match filter {
            Filter::Or(terms) => {
                assert_eq!(terms.len(), 2);
                assert!(matches!(&terms[1], Filter::And(inner) if inner.len() == 2));
            }
            other => panic!("expected or, got {other:?}"),
        }
        assert_eq!(parse("(a or b) and c").unwrap().to_string(), "(a or b) and c");
    }

    #[test]
    fn test_path() {
        let filter = parse("equip->ahu and temp > 72.5").unwrap();
        assert_eq!(filter.to_string(), "equip->ahu and temp > 72.5");
        match filter {
            Filter::And(terms) => match &terms[0] {
                Filter::Has(path) => {
                    assert!(path.is_chain());
                    assert_eq!(path.span(), 0..10);
                }
                other => panic!("expected path, got {other:?}"),
            },
            other => panic!("expected and, got {other:?}"),
        }
    }

    #[test]
    fn test_in_forms() {
        let bare = parse("status in 'ok','degraded'").unwrap();
        let parens = parse("status in ('ok', 'degraded')").unwrap();
        assert_eq!(bare.to_string(), "status in ('ok', 'degraded')");
        assert_eq!(bare.to_string(), parens.to_string());
    }

    #[test]
    fn test_missing() {
        assert_eq!(parse("NOT equip->ahu").unwrap().to_string(), "not equip->ahu");
    }

    #[test]
    fn test_name_in_value_position_is_kept() {
        match parse("temp > other").unwrap() {
            Filter::Cmp { cmp: Comparison::Binary { value, .. }, .. } => {
                assert_eq!(value.kind, TokenKind::Name)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test_case("temp =~ 5"; "regex match")]
    #[test_case("temp <> 5"; "sql inequality")]
    #[test_case("temp => 5"; "arrow")]
    fn test_unknown_operator(source: &str) {
        assert!(matches!(parse(source), Err(ParseError::UnknownOperator { .. })));
    }

    #[test]
    fn test_comparison_on_intermediate_segment() {
        assert!(matches!(
            parse("equip == true->ahu"),
            Err(ParseError::UnsupportedPath { .. })
        ));
    }

    #[test_case("status in 'ok' -> x"; "bare list")]
    #[test_case("status in ('ok', 'degraded')->x"; "parenthesized list")]
    fn test_path_after_in_list(source: &str) {
        match parse(source) {
            Err(ParseError::UnsupportedPath { span, .. }) => {
                assert_eq!(&source[span.offset()..span.offset() + span.len()], "->")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| format!("{}site{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(parse(&nested(MAX_NESTING)).unwrap().to_string(), "site");
        match parse(&nested(20_000)) {
            Err(ParseError::Syntax { span, .. }) => {
                assert_eq!(span.offset(), MAX_NESTING);
                assert_eq!(span.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test_case(""; "empty")]
    #[test_case("temp >"; "missing value")]
    #[test_case("(temp"; "unclosed paren")]
    #[test_case("temp and"; "dangling and")]
    #[test_case("a->"; "dangling arrow")]
    #[test_case("temp $ 5"; "garbage")]
    #[test_case("not temp > 5"; "negated comparison")]
    #[test_case("status in ()"; "empty list")]
    #[test_case("a b"; "trailing name")]
    fn test_syntax_error(source: &str) {
        assert!(matches!(parse(source), Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn test_syntax_error_span() {
        match parse("temp > ") {
            Err(ParseError::Syntax { span, message, .. }) => {
                assert_eq!(span.offset(), 7);
                assert_eq!(message, "expected a value, found end of input");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
