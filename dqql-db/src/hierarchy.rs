//! Tag hierarchy resolution.
//!
//! Every tag use in a filter gets its own alias index `n`. For that index the resolver
//! produces a recursive CTE `hier_query{n}` walking the hierarchy upwards from the named
//! tag, and an ancestor-set table `hq{n}` holding one row: the ancestor names joined as
//! `,a,b,c,`, so membership is a `LIKE '%,name,%'` test.

use sea_query::{
    Alias, CommonTableExpression, DynIden, Expr, Func, IntoIden, JoinType, Query,
    SelectStatement, UnionType,
};
use serde::{Deserialize, Serialize};

use crate::sea_query_extra::{comma_bounded, string_agg, StaticTableRef};
use crate::sql_common::{col_of, Col, DbSchema, StoreTable};

/// Allocates alias indices for one compilation. It is a plain value: callers thread it
/// through and get the advanced generator back, so nothing is shared between compilations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasGen {
    next_id: u32,
}

impl Default for AliasGen {
    fn default() -> Self {
        AliasGen::new()
    }
}

impl AliasGen {
    pub fn new() -> Self {
        AliasGen { next_id: 1 }
    }

    pub fn next(self) -> (TagAliases, AliasGen) {
        (TagAliases(self.next_id), AliasGen { next_id: self.next_id + 1 })
    }

    /// How many indices were handed out so far
    pub fn allocated(&self) -> u32 {
        self.next_id - 1
    }
}

/// The table aliases belonging to one alias index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagAliases(u32);

impl TagAliases {
    pub fn index(&self) -> u32 {
        self.0
    }

    /// `et{n}`, the entity_tag row
    pub fn fact(&self) -> DynIden {
        Alias::new(format!("et{}", self.0)).into_iden()
    }

    /// `td{n}`, the tag_def row
    pub fn tag(&self) -> DynIden {
        Alias::new(format!("td{}", self.0)).into_iden()
    }

    /// `hier_query{n}`, the recursive CTE
    pub fn hierarchy(&self) -> DynIden {
        Alias::new(format!("hier_query{}", self.0)).into_iden()
    }

    /// `hq{n}`, the ancestor-set table
    pub fn ancestors(&self) -> DynIden {
        Alias::new(format!("hq{}", self.0)).into_iden()
    }
}

/// Where ancestor sets come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AncestorSource {
    /// Walk `tag_hierarchy` with an inline recursive CTE
    #[default]
    Recursive,
    /// Read the precomputed `tag_def_parents` view
    View,
}

/// The hierarchy fragments for one tag use
#[derive(Debug, Clone)]
pub struct Ancestry {
    pub aliases: TagAliases,
    /// Recursive CTE to prepend to the final query, if the source needs one
    pub header: Option<CommonTableExpression>,
    /// Single-row select of the `,`-bounded ancestor names, column `parent_id`
    pub ancestors: SelectStatement,
}

impl Ancestry {
    pub fn resolve(tag: &str, aliases: TagAliases, schema: &DbSchema, source: AncestorSource) -> Self {
        match source {
            AncestorSource::Recursive => Ancestry {
                aliases,
                header: Some(hierarchy_cte(tag, aliases, schema)),
                ancestors: ancestors_from_cte(aliases, schema),
            },
            AncestorSource::View => Ancestry {
                aliases,
                header: None,
                ancestors: ancestors_from_view(tag, aliases, schema),
            },
        }
    }

    /// `hq{n}.parent_id`
    pub fn parent_ids(&self) -> Expr {
        Expr::col(col_of(&self.aliases.ancestors(), Col::ParentId))
    }
}

/// `hier_query{n}(child_id, parent_id)`: every active edge reachable upwards from `tag`.
///
/// The recursive term is combined with `UNION` rather than `UNION ALL`, so a cyclic
/// hierarchy stops producing rows once every edge on the cycle was seen.
pub fn hierarchy_cte(tag: &str, aliases: TagAliases, schema: &DbSchema) -> CommonTableExpression {
    let th = Alias::new("th").into_iden();
    let td = aliases.tag();
    let hier = aliases.hierarchy();
    let parent = Alias::new("c").into_iden();

    let mut seed = Query::select();
    seed.column(col_of(&th, Col::ChildId))
        .column(col_of(&th, Col::ParentId))
        .from_as(schema.table(StoreTable::TagHierarchy), th.clone())
        .from_as(schema.table(StoreTable::TagDef), td.clone())
        .and_where(Expr::col(col_of(&th, Col::ChildId)).equals(col_of(&td, Col::Id)))
        .and_where(Expr::col(col_of(&td, Col::Name)).eq(tag))
        .and_where(Expr::col(col_of(&th, Col::DisabledTs)).is_null());

    let mut step = Query::select();
    step.column(col_of(&th, Col::ChildId))
        .column(col_of(&th, Col::ParentId))
        .from_as(schema.table(StoreTable::TagHierarchy), th.clone())
        .join_as(
            JoinType::InnerJoin,
            hier.clone(),
            parent.clone(),
            Expr::col(col_of(&parent, Col::ParentId)).equals(col_of(&th, Col::ChildId)),
        )
        .and_where(Expr::col(col_of(&th, Col::DisabledTs)).is_null());

    seed.union(UnionType::Distinct, step);

    CommonTableExpression::new()
        .query(seed)
        .column(Col::ChildId)
        .column(Col::ParentId)
        .table_name(hier)
        .to_owned()
}

/// `SELECT ',' || string_agg(td{n}.name, ',') || ',' AS parent_id FROM hier_query{n}, tag_def td{n} ...`
fn ancestors_from_cte(aliases: TagAliases, schema: &DbSchema) -> SelectStatement {
    let td = aliases.tag();
    let hier = StaticTableRef::Table(aliases.hierarchy());
    Query::select()
        .expr_as(
            comma_bounded(string_agg(Expr::col(col_of(&td, Col::Name)), ",")),
            Col::ParentId,
        )
        .from(hier.clone())
        .from_as(schema.table(StoreTable::TagDef), td.clone())
        .and_where(Expr::col(col_of(&td, Col::Id)).equals(hier.with_column(Col::ParentId)))
        .to_owned()
}

/// `SELECT max(tdp.parent_ids) AS parent_id FROM tag_def_parents tdp, tag_def td{n} ...`.
/// The aggregate keeps the result at exactly one row even for unknown tags.
fn ancestors_from_view(tag: &str, aliases: TagAliases, schema: &DbSchema) -> SelectStatement {
    let td = aliases.tag();
    let tdp = Alias::new("tdp").into_iden();
    Query::select()
        .expr_as(Func::max(Expr::col(col_of(&tdp, Col::ParentIds))), Col::ParentId)
        .from_as(schema.table(StoreTable::TagDefParents), tdp.clone())
        .from_as(schema.table(StoreTable::TagDef), td.clone())
        .and_where(Expr::col(col_of(&tdp, Col::TagId)).equals(col_of(&td, Col::Id)))
        .and_where(Expr::col(col_of(&td, Col::Name)).eq(tag))
        .to_owned()
}

#[cfg(test)]
mod test {
    use sea_query::{Iden, PostgresQueryBuilder, Query, QueryStatementWriter, WithClause};

    use super::*;

    fn cte_sql(cte: CommonTableExpression) -> String {
        let with = WithClause::new().recursive(true).cte(cte).to_owned();
        Query::select()
            .expr(Expr::val(1))
            .to_owned()
            .with(with)
            .to_string(PostgresQueryBuilder)
    }

    #[test]
    fn test_alias_gen_is_a_value() {
        let gen = AliasGen::new();
        let (a, gen2) = gen.next();
        let (b, gen3) = gen2.next();
        assert_eq!((a.index(), b.index()), (1, 2));
        assert_eq!(gen3.allocated(), 2);
        // `gen` itself is unchanged
        assert_eq!(gen.next().0.index(), 1);
    }

    #[test]
    fn test_aliases() {
        let (aliases, _) = AliasGen::new().next();
        assert_eq!(aliases.fact().to_string(), "et1");
        assert_eq!(aliases.tag().to_string(), "td1");
        assert_eq!(aliases.hierarchy().to_string(), "hier_query1");
        assert_eq!(aliases.ancestors().to_string(), "hq1");
    }

    #[test]
    fn test_hierarchy_cte() {
        let (aliases, _) = AliasGen::new().next();
        let sql = cte_sql(hierarchy_cte("temp", aliases, &DbSchema::new("core")));
        assert!(sql.starts_with(r#"WITH RECURSIVE "hier_query1""#), "{sql}");
        assert!(sql.contains(r#"("child_id", "parent_id")"#), "{sql}");
        assert!(sql.contains(r#"FROM "core"."tag_hierarchy" AS "th", "core"."tag_def" AS "td1""#), "{sql}");
        assert!(sql.contains(r#""td1"."name" = 'temp'"#), "{sql}");
        assert!(sql.contains(r#"INNER JOIN "hier_query1" AS "c" ON "c"."parent_id" = "th"."child_id""#), "{sql}");
        assert!(sql.contains(" UNION "), "{sql}");
        assert!(!sql.contains("UNION ALL"), "{sql}");
        assert_eq!(sql.matches(r#""th"."disabled_ts" IS NULL"#).count(), 2, "{sql}");
    }

    #[test]
    fn test_ancestors_from_cte() {
        let (aliases, _) = AliasGen::new().next().1.next();
        let ancestry = Ancestry::resolve("temp", aliases, &DbSchema::new("core"), AncestorSource::Recursive);
        assert!(ancestry.header.is_some());
        let sql = ancestry.ancestors.to_string(PostgresQueryBuilder);
        assert!(sql.contains(r#"string_agg("td2"."name", ',')"#), "{sql}");
        assert!(sql.contains(r#"AS "parent_id" FROM "hier_query2", "core"."tag_def" AS "td2""#), "{sql}");
        assert!(sql.contains(r#"WHERE "td2"."id" = "hier_query2"."parent_id""#), "{sql}");
    }

    #[test]
    fn test_ancestors_from_view() {
        let (aliases, _) = AliasGen::new().next();
        let ancestry = Ancestry::resolve("temp", aliases, &DbSchema::new("core"), AncestorSource::View);
        assert!(ancestry.header.is_none());
        let sql = ancestry.ancestors.to_string(PostgresQueryBuilder);
        assert!(sql.starts_with(
            r#"SELECT MAX("tdp"."parent_ids") AS "parent_id" FROM "core"."tag_def_parents" AS "tdp", "core"."tag_def" AS "td1" WHERE "#
        ), "{sql}");
        assert!(sql.contains(r#""tdp"."tag_id" = "td1"."id""#), "{sql}");
        assert!(sql.contains(r#""td1"."name" = 'temp'"#), "{sql}");
    }

    #[test]
    fn test_independent_indices_do_not_collide() {
        let schema = DbSchema::new("core");
        let (a, gen) = AliasGen::new().next();
        let (b, _) = gen.next();
        let first = cte_sql(hierarchy_cte("temp", a, &schema));
        let second = cte_sql(hierarchy_cte("temp", b, &schema));
        assert!(first.contains(r#""hier_query1""#) && !first.contains("hier_query2"));
        assert!(second.contains(r#""hier_query2""#) && !second.contains("hier_query1"));
    }
}
