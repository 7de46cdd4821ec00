//! Parse tree of a filter expression.

use std::{fmt, ops::Range};

use smol_str::SmolStr;

use crate::lexer::TokenKind;

/// A tag name as written in the filter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    pub text: SmolStr,
    pub span: Range<usize>,
}

impl Name {
    pub fn new(text: impl Into<SmolStr>, span: Range<usize>) -> Self {
        Name { text: text.into(), span }
    }

    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }
}

/// One or more tag names joined by `->`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    pub segments: Vec<Name>,
}

impl Path {
    pub fn new(segments: Vec<Name>) -> Self {
        Path { segments }
    }

    /// A chain traverses at least one reference, i.e. it has two or more segments
    pub fn is_chain(&self) -> bool {
        self.segments.len() > 1
    }

    pub fn span(&self) -> Range<usize> {
        match (self.segments.first(), self.segments.last()) {
            (Some(first), Some(last)) => first.span.start..last.span.end,
            _ => 0..0,
        }
    }
}

/// Relational operators. `==` and `=` both parse to `Eq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// Recognizes operator text, or `None` when it is not a supported operator
    pub fn from_text(text: &str) -> Option<Self> {
        match text {
            "=" | "==" => Some(CmpOp::Eq),
            "!=" => Some(CmpOp::Ne),
            "<" => Some(CmpOp::Lt),
            "<=" => Some(CmpOp::Le),
            ">" => Some(CmpOp::Gt),
            ">=" => Some(CmpOp::Ge),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// A literal operand, kept as lexed. Typing happens during compilation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    pub kind: TokenKind,
    pub text: SmolStr,
    pub span: Range<usize>,
}

impl Literal {
    pub fn new(kind: TokenKind, text: impl Into<SmolStr>, span: Range<usize>) -> Self {
        Literal { kind, text: text.into(), span }
    }
}

/// What a path is compared against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Comparison {
    Binary { op: CmpOp, value: Literal },
    /// Set membership, `status in 'ok','degraded'`
    In(Vec<Literal>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    Or(Vec<Filter>),
    And(Vec<Filter>),
    /// Entities carrying the tag (or the chain of tags)
    Has(Path),
    /// `not path`
    Missing(Path),
    Cmp { path: Path, cmp: Comparison },
}

impl Filter {
    /// Number of tag hierarchy uses, which is an upper bound on the aliases a compilation allocates
    pub fn tag_uses(&self) -> usize {
        match self {
            Filter::Or(fs) | Filter::And(fs) => fs.iter().map(Filter::tag_uses).sum(),
            Filter::Has(p) | Filter::Missing(p) | Filter::Cmp { path: p, .. } => p.segments.len(),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("->")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Binary { op, value } => write!(f, "{op} {value}"),
            Comparison::In(values) => {
                f.write_str("in (")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Or(fs) => write_joined(f, fs, " or ", false),
            Filter::And(fs) => write_joined(f, fs, " and ", true),
            Filter::Has(p) => write!(f, "{p}"),
            Filter::Missing(p) => write!(f, "not {p}"),
            Filter::Cmp { path, cmp } => write!(f, "{path} {cmp}"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, fs: &[Filter], sep: &str, parens_or: bool) -> fmt::Result {
    for (i, child) in fs.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        match child {
            Filter::Or(_) if parens_or => write!(f, "({child})")?,
            _ => write!(f, "{child}")?,
        }
    }
    Ok(())
}
