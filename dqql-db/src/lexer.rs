//! Lexer for filter expressions.
//!
//! Produces span-based tokens; text is sliced from the source only when needed.
//! Consecutive unrecognized characters are coalesced into one `Garbage` token.

use std::ops::Range;

use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n]+")]
pub enum TokenKind {
    #[token("(")]
    ParenOpen,

    #[token(")")]
    ParenClose,

    #[token(",")]
    Comma,

    /// Path separator
    #[token("->")]
    Arrow,

    #[token("and", priority = 10, ignore(case))]
    And,

    #[token("or", priority = 10, ignore(case))]
    Or,

    #[token("not", priority = 10, ignore(case))]
    Not,

    #[token("in", priority = 10, ignore(case))]
    In,

    #[token("true")]
    #[token("false")]
    Bool,

    /// Entity reference, e.g. `@42`
    #[regex(r"@[A-Za-z0-9_:.~\-]+")]
    Ref,

    #[regex(r#""(?:[^"\\]|\\.)*""#)]
    Str,

    /// Single-quoted string, the element form of `in` lists
    #[regex(r"'(?:[^'\\]|\\.)*'")]
    ListStr,

    #[regex(r"`(?:[^`\\]|\\.)*`")]
    Uri,

    #[regex(r"-?[0-9]+(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?")]
    Number,

    /// Date, optionally followed by a time of day and offset
    #[regex(r"[0-9]{4}-[0-9]{2}-[0-9]{2}(?:T[0-9]{2}:[0-9]{2}(?::[0-9]{2}(?:\.[0-9]+)?)?(?:Z|[+-][0-9]{2}:[0-9]{2})?)?")]
    Date,

    #[regex(r"[0-9]{2}:[0-9]{2}(?::[0-9]{2}(?:\.[0-9]+)?)?")]
    Time,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Name,

    /// Any run of comparison characters; the parser decides whether it is a known operator
    #[regex(r"[=!<>~]+")]
    Operator,

    /// Coalesced unrecognized characters
    Garbage,
}

impl TokenKind {
    /// True for the token kinds that denote a literal value
    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::Bool
                | TokenKind::Ref
                | TokenKind::Str
                | TokenKind::ListStr
                | TokenKind::Uri
                | TokenKind::Number
                | TokenKind::Date
                | TokenKind::Time
        )
    }

    /// Human readable name used in diagnostics
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::ParenOpen => "`(`",
            TokenKind::ParenClose => "`)`",
            TokenKind::Comma => "`,`",
            TokenKind::Arrow => "`->`",
            TokenKind::And => "`and`",
            TokenKind::Or => "`or`",
            TokenKind::Not => "`not`",
            TokenKind::In => "`in`",
            TokenKind::Bool => "boolean",
            TokenKind::Ref => "reference",
            TokenKind::Str => "string",
            TokenKind::ListStr => "quoted list element",
            TokenKind::Uri => "uri",
            TokenKind::Number => "number",
            TokenKind::Date => "date",
            TokenKind::Time => "time",
            TokenKind::Name => "tag name",
            TokenKind::Operator => "operator",
            TokenKind::Garbage => "unrecognized input",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl Token {
    pub fn new(kind: TokenKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }

    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.span.clone()]
    }
}

/// Tokenizes source into a vector of span-based tokens.
pub fn lex(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);
    let mut error_start: Option<usize> = None;

    loop {
        match lexer.next() {
            Some(Ok(kind)) => {
                if let Some(start) = error_start.take() {
                    tokens.push(Token::new(TokenKind::Garbage, start..lexer.span().start));
                }
                tokens.push(Token::new(kind, lexer.span()));
            }
            Some(Err(())) => {
                if error_start.is_none() {
                    error_start = Some(lexer.span().start);
                }
            }
            None => {
                if let Some(start) = error_start.take() {
                    tokens.push(Token::new(TokenKind::Garbage, start..source.len()));
                }
                break;
            }
        }
    }

    tokens
}

#[cfg(test)]
mod test {
    use test_case::test_case;

    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).into_iter().map(|t| t.kind).collect()
    }

    #[test_case("72.5", TokenKind::Number; "decimal")]
    #[test_case("-3", TokenKind::Number; "negative")]
    #[test_case("1e3", TokenKind::Number; "exponent")]
    #[test_case("@42", TokenKind::Ref; "reference")]
    #[test_case(r#""hello \"there\"""#, TokenKind::Str; "escaped string")]
    #[test_case("'ok'", TokenKind::ListStr; "list string")]
    #[test_case("`http://example.com/a`", TokenKind::Uri; "uri")]
    #[test_case("true", TokenKind::Bool; "true")]
    #[test_case("false", TokenKind::Bool; "false")]
    #[test_case("2023-04-01", TokenKind::Date; "date")]
    #[test_case("2023-04-01T10:15:00Z", TokenKind::Date; "date time")]
    #[test_case("10:15", TokenKind::Time; "time")]
    #[test_case("10:15:30", TokenKind::Time; "time with seconds")]
    #[test_case("siteRef", TokenKind::Name; "name")]
    #[test_case("android", TokenKind::Name; "keyword prefix")]
    fn test_single_token(source: &str, kind: TokenKind) {
        let tokens = lex(source);
        assert_eq!(tokens, vec![Token::new(kind, 0..source.len())]);
    }

    #[test]
    fn test_keywords_ignore_case() {
        assert_eq!(
            kinds("a AND b Or NOT c in"),
            vec![
                TokenKind::Name,
                TokenKind::And,
                TokenKind::Name,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Name,
                TokenKind::In,
            ]
        );
    }

    #[test]
    fn test_path_and_comparison() {
        assert_eq!(
            kinds("equip->ahu and temp >= 72.5"),
            vec![
                TokenKind::Name,
                TokenKind::Arrow,
                TokenKind::Name,
                TokenKind::And,
                TokenKind::Name,
                TokenKind::Operator,
                TokenKind::Number,
            ]
        );
    }

    #[test]
    fn test_operator_runs() {
        let source = "a =~ 1";
        let tokens = lex(source);
        assert_eq!(tokens[1].kind, TokenKind::Operator);
        assert_eq!(tokens[1].text(source), "=~");
        assert_eq!(tokens[2].kind, TokenKind::Number);

        let source = "a <> 1";
        let tokens = lex(source);
        assert_eq!(tokens[1].text(source), "<>");
    }

    #[test]
    fn test_garbage_is_coalesced() {
        let source = "a == $$$ b";
        let tokens = lex(source);
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::Name, TokenKind::Operator, TokenKind::Garbage, TokenKind::Name]
        );
        assert_eq!(tokens[2].text(source), "$$$");
    }
}
