//! Translates a parsed [`Filter`] into a boolean SQL predicate over entities aliased `e`.

use miette::Diagnostic;
use sea_query::{CommonTableExpression, Expr, SimpleExpr};
use thiserror::Error;

use crate::ast::{Comparison, Filter, Path};
use crate::hierarchy::{AliasGen, AncestorSource};
use crate::name_query::compile_name;
use crate::path_query::compile_path;
use crate::sql_common::DbSchema;
use crate::value_type::TypeError;

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum CompileError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Type(#[from] TypeError),
    #[error("`{path}` is not a path: a path needs at least two segments")]
    #[diagnostic(code(dqql::unsupported_path))]
    UnsupportedPath { path: String },
}

type Result<T> = std::result::Result<T, CompileError>;

/// Everything compilation needs besides the filter itself
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub schema: &'a DbSchema,
    pub ancestors: AncestorSource,
}

impl<'a> CompileContext<'a> {
    pub fn new(schema: &'a DbSchema, ancestors: AncestorSource) -> Self {
        CompileContext { schema, ancestors }
    }
}

/// A compiled filter: the hierarchy CTEs it relies on, in alias order, and the predicate.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pub headers: Vec<CommonTableExpression>,
    pub predicate: SimpleExpr,
    pub aliases: AliasGen,
}

/// Compile a whole filter tree with a fresh alias generator
pub fn compile_filter(filter: &Filter, ctx: &CompileContext) -> Result<CompiledFilter> {
    let mut headers = Vec::new();
    let (predicate, aliases) = compile_node(filter, AliasGen::new(), ctx, &mut headers)?;
    Ok(CompiledFilter { headers, predicate, aliases })
}

fn compile_node(
    filter: &Filter,
    gen: AliasGen,
    ctx: &CompileContext,
    headers: &mut Vec<CommonTableExpression>,
) -> Result<(SimpleExpr, AliasGen)> {
    match filter {
        Filter::Or(children) => compile_all(children, gen, ctx, headers, SimpleExpr::or),
        Filter::And(children) => compile_all(children, gen, ctx, headers, SimpleExpr::and),
        Filter::Has(path) => compile_term(path, None, false, gen, ctx, headers),
        Filter::Missing(path) => compile_term(path, None, true, gen, ctx, headers),
        Filter::Cmp { path, cmp } => compile_term(path, Some(cmp), false, gen, ctx, headers),
    }
}

fn compile_all(
    children: &[Filter],
    mut gen: AliasGen,
    ctx: &CompileContext,
    headers: &mut Vec<CommonTableExpression>,
    combine: fn(SimpleExpr, SimpleExpr) -> SimpleExpr,
) -> Result<(SimpleExpr, AliasGen)> {
    let mut acc: Option<SimpleExpr> = None;
    for child in children {
        let (expr, next) = compile_node(child, gen, ctx, headers)?;
        gen = next;
        acc = Some(match acc {
            Some(left) => combine(left, expr),
            None => expr,
        });
    }
    match acc {
        Some(expr) => Ok((expr, gen)),
        // the parser never produces empty connectives
        None => Ok((Expr::val(true).into(), gen)),
    }
}

/// Dispatch a single path to the name or path compiler
fn compile_term(
    path: &Path,
    cmp: Option<&Comparison>,
    negated: bool,
    gen: AliasGen,
    ctx: &CompileContext,
    headers: &mut Vec<CommonTableExpression>,
) -> Result<(SimpleExpr, AliasGen)> {
    match path.segments.as_slice() {
        [name] => {
            let fragment = compile_name(name, cmp, gen, ctx)?;
            headers.extend(fragment.header);
            let predicate = if negated { fragment.predicate.not() } else { fragment.predicate };
            Ok((predicate, fragment.aliases))
        }
        _ => {
            let fragment = compile_path(path, cmp, negated, gen, ctx)?;
            headers.extend(fragment.headers);
            Ok((fragment.predicate, fragment.aliases))
        }
    }
}
