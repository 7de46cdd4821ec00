//! Classifies literal operands by their lexical kind and turns them into bound query values.

use std::fmt;

use miette::Diagnostic;
use sea_query::{Alias, Expr, SimpleExpr};
use smol_str::SmolStr;
use thiserror::Error;

use crate::ast::Literal;
use crate::lexer::TokenKind;

/// The lexical type of a literal. This is what the filter author wrote,
/// independent of the storage type the compared tag declares through its ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Number,
    Ref,
    Str,
    Bool,
    Uri,
    Date,
    Time,
}

impl ValueType {
    /// Classify a literal by its token kind
    pub fn of(lit: &Literal) -> Result<Self, TypeError> {
        match lit.kind {
            TokenKind::Number => Ok(ValueType::Number),
            TokenKind::Ref => Ok(ValueType::Ref),
            TokenKind::Str | TokenKind::ListStr => Ok(ValueType::Str),
            TokenKind::Bool => Ok(ValueType::Bool),
            TokenKind::Uri => Ok(ValueType::Uri),
            TokenKind::Date => Ok(ValueType::Date),
            TokenKind::Time => Ok(ValueType::Time),
            kind => Err(TypeError::NotALiteral {
                text: lit.text.clone(),
                found: kind.describe(),
            }),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Number => "number",
            ValueType::Ref => "ref",
            ValueType::Str => "string",
            ValueType::Bool => "bool",
            ValueType::Uri => "uri",
            ValueType::Date => "date",
            ValueType::Time => "time",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum TypeError {
    #[error("`{text}` is a {found}, not a value")]
    #[diagnostic(code(dqql::type_error))]
    NotALiteral { text: SmolStr, found: &'static str },
    #[error("reference `{text}` is not an entity id")]
    #[diagnostic(code(dqql::type_error), help("entity references are written as `@<integer id>`"))]
    InvalidRef { text: SmolStr },
    #[error("`in` lists only hold strings, found {ty} `{text}`")]
    #[diagnostic(code(dqql::type_error))]
    NonStringElement { text: SmolStr, ty: ValueType },
}

/// A literal with its quoting removed, ready to be bound
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// Kept as written, the database parses it as `numeric`
    Number(String),
    /// Entity id
    Ref(i64),
    Str(String),
    Bool(bool),
    Uri(String),
    Date(String),
    Time(String),
}

impl TypedValue {
    pub fn from_literal(lit: &Literal) -> Result<Self, TypeError> {
        let raw = lit.text.as_str();
        let value = match ValueType::of(lit)? {
            ValueType::Number => TypedValue::Number(raw.to_string()),
            ValueType::Ref => raw
                .trim_start_matches('@')
                .parse::<i64>()
                .map(TypedValue::Ref)
                .map_err(|_| TypeError::InvalidRef { text: lit.text.clone() })?,
            ValueType::Str => TypedValue::Str(unquote(raw)),
            ValueType::Bool => TypedValue::Bool(raw == "true"),
            ValueType::Uri => TypedValue::Uri(unquote(raw)),
            ValueType::Date => TypedValue::Date(raw.to_string()),
            ValueType::Time => TypedValue::Time(raw.to_string()),
        };
        Ok(value)
    }

    /// An element of an `in` list, which must be a string
    pub fn list_element(lit: &Literal) -> Result<Self, TypeError> {
        let value = TypedValue::from_literal(lit)?;
        match value.ty() {
            ValueType::Str => Ok(value),
            ty => Err(TypeError::NonStringElement { text: lit.text.clone(), ty }),
        }
    }

    pub fn ty(&self) -> ValueType {
        match self {
            TypedValue::Number(_) => ValueType::Number,
            TypedValue::Ref(_) => ValueType::Ref,
            TypedValue::Str(_) => ValueType::Str,
            TypedValue::Bool(_) => ValueType::Bool,
            TypedValue::Uri(_) => ValueType::Uri,
            TypedValue::Date(_) => ValueType::Date,
            TypedValue::Time(_) => ValueType::Time,
        }
    }

    /// The value as a bound parameter, cast to the type of the column it is compared with
    pub fn to_sql(&self) -> SimpleExpr {
        match self {
            TypedValue::Number(n) => Expr::val(n.as_str()).cast_as(Alias::new("numeric")),
            TypedValue::Ref(id) => Expr::val(*id).into(),
            TypedValue::Bool(b) => Expr::val(*b).into(),
            TypedValue::Str(s) | TypedValue::Uri(s) => Expr::val(s.as_str()).into(),
            TypedValue::Date(d) => Expr::val(d.as_str()).cast_as(Alias::new("timestamp")),
            TypedValue::Time(t) => Expr::val(t.as_str()).cast_as(Alias::new("time")),
        }
    }
}

/// Strip the surrounding quote characters and resolve backslash escapes
fn unquote(raw: &str) -> String {
    let inner = if raw.len() >= 2 { &raw[1..raw.len() - 1] } else { raw };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
