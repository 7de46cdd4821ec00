//! Compiles `a->b->c [cmp]` chains into nested reference subqueries.
//!
//! The chain is processed right to left. The rightmost segment yields the ids of
//! entities carrying `c` (and satisfying the comparison, if any). Each step to the left
//! selects the entities whose `b` fact references one of those ids, and so on, until the
//! outermost set is tested against `e.id`.

use sea_query::{CommonTableExpression, Expr, SelectStatement, SimpleExpr};

use crate::ast::{Comparison, Name, Path};
use crate::comparison::{case_of, has_ancestor, CaseBranch, BranchKind};
use crate::expr_to_query::{CompileContext, CompileError};
use crate::hierarchy::{AliasGen, Ancestry, TagAliases};
use crate::name_query::{add_comparison, entity_alias, fact_select};
use crate::sql_common::{col_of, Col};

#[derive(Debug, Clone)]
pub struct PathFragment {
    /// Hierarchy CTEs, one per segment that needed its ancestors
    pub headers: Vec<CommonTableExpression>,
    pub predicate: SimpleExpr,
    pub aliases: AliasGen,
}

fn entity_ids(tag: &Name, aliases: TagAliases, ctx: &CompileContext) -> SelectStatement {
    let mut select = fact_select(tag, aliases, ctx);
    select.column(col_of(&aliases.fact(), Col::EntityId));
    select
}

/// Ref typed facts of the segment whose value is one of the `acceptable` ids
fn follows(ancestry: &Ancestry, acceptable: SelectStatement) -> CaseBranch {
    CaseBranch {
        kind: BranchKind::Reference,
        when: has_ancestor(ancestry, "ref"),
        then: Expr::col(col_of(&ancestry.aliases.fact(), Col::ValueRef)).in_subquery(acceptable),
    }
}

/// Compile a chain of two or more segments. `negated` turns the outer test into `NOT IN`.
pub fn compile_path(
    path: &Path,
    cmp: Option<&Comparison>,
    negated: bool,
    gen: AliasGen,
    ctx: &CompileContext,
) -> Result<PathFragment, CompileError> {
    let (last, rest) = match path.segments.split_last() {
        Some((last, rest)) if !rest.is_empty() => (last, rest),
        _ => return Err(CompileError::UnsupportedPath { path: path.to_string() }),
    };

    let mut headers = Vec::new();
    let (aliases, mut gen) = gen.next();
    let mut acceptable = entity_ids(last, aliases, ctx);
    if let Some(cmp) = cmp {
        let ancestry = Ancestry::resolve(last.as_str(), aliases, ctx.schema, ctx.ancestors);
        add_comparison(&mut acceptable, &ancestry, cmp)?;
        headers.extend(ancestry.header);
    }

    for segment in rest.iter().rev() {
        let (aliases, next) = gen.next();
        gen = next;
        let ancestry = Ancestry::resolve(segment.as_str(), aliases, ctx.schema, ctx.ancestors);
        let mut step = entity_ids(segment, aliases, ctx);
        step.from_subquery(ancestry.ancestors.clone(), aliases.ancestors())
            .and_where(case_of(vec![follows(&ancestry, acceptable)]));
        headers.extend(ancestry.header);
        acceptable = step;
    }

    let entity = Expr::col(col_of(&entity_alias(), Col::Id));
    let predicate = if negated {
        entity.not_in_subquery(acceptable)
    } else {
        entity.in_subquery(acceptable)
    };
    tracing::trace!(%path, segments = path.segments.len(), "compiled path predicate");
    Ok(PathFragment { headers, predicate, aliases: gen })
}

#[cfg(test)]
mod test {
    use sea_query::{PostgresQueryBuilder, Query};

    use super::*;
    use crate::ast::{CmpOp, Literal};
    use crate::hierarchy::AncestorSource;
    use crate::lexer::TokenKind;
    use crate::sql_common::DbSchema;

    fn path(names: &[&str]) -> Path {
        Path::new(names.iter().map(|n| Name::new(*n, 0..n.len())).collect())
    }

    fn render(expr: SimpleExpr) -> String {
        Query::select().expr(expr).to_string(PostgresQueryBuilder)
    }

    fn compile(p: &Path, cmp: Option<&Comparison>, negated: bool) -> Result<PathFragment, CompileError> {
        let schema = DbSchema::new("core");
        let ctx = CompileContext::new(&schema, AncestorSource::Recursive);
        compile_path(p, cmp, negated, AliasGen::new(), &ctx)
    }

    #[test]
    fn test_single_segment_is_rejected() {
        assert!(matches!(
            compile(&path(&["site"]), None, false),
            Err(CompileError::UnsupportedPath { .. })
        ));
        assert!(matches!(
            compile(&path(&[]), None, false),
            Err(CompileError::UnsupportedPath { .. })
        ));
    }

    #[test]
    fn test_has_chain() {
        let fragment = compile(&path(&["equip", "ahu"]), None, false).unwrap();
        // only the referencing segment needs its ancestors
        assert_eq!(fragment.headers.len(), 1);
        assert_eq!(fragment.aliases.allocated(), 2);
        let sql = render(fragment.predicate);
        assert!(sql.starts_with(r#"SELECT "e"."id" IN (SELECT "et2"."entity_id" FROM"#), "{sql}");
        assert!(sql.contains(r#""td2"."name" = 'equip'"#), "{sql}");
        assert!(sql.contains(r#""hq2"."parent_id" LIKE '%,ref,%'"#), "{sql}");
        assert!(sql.contains(r#""et2"."value_ref" IN (SELECT "et1"."entity_id" FROM"#), "{sql}");
        assert!(sql.contains(r#""td1"."name" = 'ahu'"#), "{sql}");
        assert!(!sql.contains("hq1"), "{sql}");
    }

    #[test]
    fn test_chain_nesting_depth() {
        let cmp = Comparison::Binary { op: CmpOp::Eq, value: Literal::new(TokenKind::Str, "\"x\"", 0..3) };
        let with_cmp = render(compile(&path(&["a", "b", "c"]), Some(&cmp), false).unwrap().predicate);
        let without = render(compile(&path(&["a", "b", "c"]), None, false).unwrap().predicate);
        for sql in [&with_cmp, &without] {
            assert_eq!(sql.matches(r#""value_ref" IN (SELECT"#).count(), 2, "{sql}");
        }
        assert!(with_cmp.contains(r#""et1"."value_s" = 'x'"#), "{with_cmp}");
        assert!(!without.contains("value_s"), "{without}");
    }

    #[test]
    fn test_chain_with_comparison_has_header_per_segment() {
        let cmp = Comparison::Binary { op: CmpOp::Gt, value: Literal::new(TokenKind::Number, "5", 0..1) };
        let fragment = compile(&path(&["siteRef", "area"]), Some(&cmp), false).unwrap();
        assert_eq!(fragment.headers.len(), 2);
    }

    #[test]
    fn test_chain_in_list() {
        let cmp = Comparison::In(vec![Literal::new(TokenKind::ListStr, "'ok'", 0..4)]);
        let sql = render(compile(&path(&["equip", "status"]), Some(&cmp), false).unwrap().predicate);
        assert!(sql.contains(r#""et1"."value_s" IN ('ok')"#), "{sql}");
    }

    #[test]
    fn test_follow_branch_is_a_reference() {
        let schema = DbSchema::new("core");
        let (aliases, _) = AliasGen::new().next();
        let ancestry = Ancestry::resolve("equip", aliases, &schema, AncestorSource::Recursive);
        let branch = follows(&ancestry, Query::select().to_owned());
        assert_eq!(branch.kind, BranchKind::Reference);
        let sql = render(branch.when);
        assert!(sql.contains(r#""hq1"."parent_id" LIKE '%,ref,%'"#), "{sql}");
    }

    #[test]
    fn test_negated_chain() {
        let sql = render(compile(&path(&["equip", "ahu"]), None, true).unwrap().predicate);
        assert!(sql.starts_with(r#"SELECT "e"."id" NOT IN (SELECT"#), "{sql}");
    }
}
