//! Compiles predicates on a single tag name into correlated existence checks.

use sea_query::{Alias, CommonTableExpression, DynIden, Expr, IntoIden, Query, SelectStatement, SimpleExpr};

use crate::ast::{Comparison, Name};
use crate::comparison::{case_of, comparison_branches, membership_branch};
use crate::expr_to_query::{CompileContext, CompileError};
use crate::hierarchy::{AliasGen, Ancestry, TagAliases};
use crate::sql_common::{col_of, Col, StoreTable};
use crate::value_type::TypedValue;

/// The result of compiling one name predicate
#[derive(Debug, Clone)]
pub struct NameFragment {
    /// Hierarchy CTE, present only when a comparison needed the tag's ancestors
    pub header: Option<CommonTableExpression>,
    /// Correlated on `e.id`
    pub predicate: SimpleExpr,
    pub aliases: AliasGen,
}

/// Alias of the outer entity row every name predicate correlates with
pub fn entity_alias() -> DynIden {
    Alias::new("e").into_iden()
}

/// `SELECT .. FROM entity_tag et{n}, tag_def td{n} WHERE et{n}.tag_id = td{n}.id AND td{n}.name = <tag>`
/// restricted to active facts. Callers add the column they need and further conditions.
pub(crate) fn fact_select(tag: &Name, aliases: TagAliases, ctx: &CompileContext) -> SelectStatement {
    let et = aliases.fact();
    let td = aliases.tag();
    Query::select()
        .from_as(ctx.schema.table(StoreTable::EntityTag), et.clone())
        .from_as(ctx.schema.table(StoreTable::TagDef), td.clone())
        .and_where(Expr::col(col_of(&et, Col::TagId)).equals(col_of(&td, Col::Id)))
        .and_where(Expr::col(col_of(&td, Col::Name)).eq(tag.as_str()))
        .and_where(Expr::col(col_of(&et, Col::DisabledTs)).is_null())
        .to_owned()
}

/// Adds the ancestor-set table of `ancestry` to `select` and restricts it to rows
/// for which `cmp` holds.
pub(crate) fn add_comparison(
    select: &mut SelectStatement,
    ancestry: &Ancestry,
    cmp: &Comparison,
) -> Result<(), CompileError> {
    let branches = match cmp {
        Comparison::Binary { op, value } => {
            comparison_branches(ancestry, *op, &TypedValue::from_literal(value)?)
        }
        Comparison::In(values) => {
            let values = values
                .iter()
                .map(TypedValue::list_element)
                .collect::<Result<Vec<_>, _>>()?;
            vec![membership_branch(ancestry, &values)]
        }
    };
    select
        .from_subquery(ancestry.ancestors.clone(), ancestry.aliases.ancestors())
        .and_where(case_of(branches));
    Ok(())
}

/// Compile `name` or `name <cmp>` into
/// `EXISTS (SELECT 1 FROM entity_tag et{n}, tag_def td{n}[, hq{n}] WHERE et{n}.entity_id = e.id ...)`.
pub fn compile_name(
    name: &Name,
    cmp: Option<&Comparison>,
    gen: AliasGen,
    ctx: &CompileContext,
) -> Result<NameFragment, CompileError> {
    let (aliases, gen) = gen.next();
    let mut select = fact_select(name, aliases, ctx);
    select
        .expr(Expr::val(1))
        .and_where(Expr::col(col_of(&aliases.fact(), Col::EntityId)).equals(col_of(&entity_alias(), Col::Id)));

    let header = match cmp {
        Some(cmp) => {
            let ancestry = Ancestry::resolve(name.as_str(), aliases, ctx.schema, ctx.ancestors);
            add_comparison(&mut select, &ancestry, cmp)?;
            ancestry.header
        }
        None => None,
    };

    tracing::trace!(tag = %name, alias = aliases.index(), "compiled name predicate");
    Ok(NameFragment { header, predicate: Expr::exists(select), aliases: gen })
}
