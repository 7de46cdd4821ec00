//! Row level visibility.
//!
//! An entity or tag is visible to a user of an organization iff
//! (organization grant OR user add grant) AND NOT user revoke grant.
//! Tag grants are given on libraries: a tag belongs to the library named by its
//! `lib` meta attribute, and tag visibility is library visibility.

use sea_query::{
    Alias, ColumnRef, DynIden, Expr, IntoColumnRef, IntoIden, Query, SelectStatement, SimpleExpr,
};
use serde::{Deserialize, Serialize};

use crate::sql_common::{col_of, Col, DbSchema, StoreTable};

/// The meta attribute every tag must declare
pub const LIB_ATTRIBUTE: &str = "lib";

/// Who is asking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tenant {
    pub org_id: i64,
    pub user_id: i64,
}

impl Tenant {
    pub fn new(org_id: i64, user_id: i64) -> Self {
        Tenant { org_id, user_id }
    }
}

/// The three grant tables deciding visibility of one kind of object
#[derive(Debug, Clone, Copy)]
struct GrantTables {
    org_grant: (StoreTable, &'static str),
    user_add: (StoreTable, &'static str),
    user_revoke: (StoreTable, &'static str),
    object: Col,
}

const ENTITY_GRANTS: GrantTables = GrantTables {
    org_grant: (StoreTable::OrgEntityPermission, "oep"),
    user_add: (StoreTable::UserEntityAddPermission, "ueap"),
    user_revoke: (StoreTable::UserEntityRevPermission, "uerp"),
    object: Col::EntityId,
};

const TAG_GRANTS: GrantTables = GrantTables {
    org_grant: (StoreTable::OrgTagPermission, "otp"),
    user_add: (StoreTable::UserTagAddPermission, "utap"),
    user_revoke: (StoreTable::UserTagRevPermission, "utrp"),
    object: Col::TagId,
};

/// `EXISTS (SELECT 1 FROM <table> <alias> WHERE <alias>.<subject_col> = subject AND <alias>.<object_col> = object)`
fn grant_exists(
    schema: &DbSchema,
    (table, alias): (StoreTable, &'static str),
    subject_col: Col,
    subject: i64,
    object_col: Col,
    object: &ColumnRef,
) -> SimpleExpr {
    let alias = Alias::new(alias).into_iden();
    Expr::exists(
        Query::select()
            .expr(Expr::val(1))
            .from_as(schema.table(table), alias.clone())
            .and_where(Expr::col(col_of(&alias, subject_col)).eq(subject))
            .and_where(Expr::col(col_of(&alias, object_col)).equals(object.clone()))
            .to_owned(),
    )
}

fn visibility(schema: &DbSchema, grants: GrantTables, tenant: Tenant, object: ColumnRef) -> SimpleExpr {
    let org = grant_exists(schema, grants.org_grant, Col::OrgId, tenant.org_id, grants.object, &object);
    let add = grant_exists(schema, grants.user_add, Col::UserId, tenant.user_id, grants.object, &object);
    let revoke = grant_exists(schema, grants.user_revoke, Col::UserId, tenant.user_id, grants.object, &object);
    org.or(add).and(revoke.not())
}

/// Visibility of the entity whose id is `entity_id`
pub fn entity_visibility(schema: &DbSchema, tenant: Tenant, entity_id: impl IntoColumnRef) -> SimpleExpr {
    visibility(schema, ENTITY_GRANTS, tenant, entity_id.into_column_ref())
}

/// Visibility of the library whose id is `lib_id`
pub fn tag_visibility(schema: &DbSchema, tenant: Tenant, lib_id: impl IntoColumnRef) -> SimpleExpr {
    visibility(schema, TAG_GRANTS, tenant, lib_id.into_column_ref())
}

/// Wraps `facts`, a select producing `id` (the entity) and `tag_id` plus `columns`,
/// so that only rows visible to `tenant` remain. The result selects `id`, `columns`
/// and `value_table`, the given discriminator.
pub fn secure(
    facts: SelectStatement,
    columns: &[Col],
    value_table: &str,
    schema: &DbSchema,
    tenant: Tenant,
) -> SelectStatement {
    let a: DynIden = Alias::new("a").into_iden();
    let tm: DynIden = Alias::new("tm").into_iden();
    let lib: DynIden = Alias::new("lib").into_iden();

    let mut select = Query::select();
    select.column(col_of(&a, Col::Id));
    for col in columns {
        select.column(col_of(&a, *col));
    }
    select
        .expr_as(Expr::val(value_table), Alias::new("value_table"))
        .from_subquery(facts, a.clone())
        .from_as(schema.table(StoreTable::TagMeta), tm.clone())
        .from_as(schema.table(StoreTable::TagDef), lib.clone())
        .and_where(Expr::col(col_of(&lib, Col::Name)).eq(LIB_ATTRIBUTE))
        .and_where(Expr::col(col_of(&tm, Col::Attribute)).equals(col_of(&lib, Col::Id)))
        .and_where(Expr::col(col_of(&tm, Col::TagId)).equals(col_of(&a, Col::TagId)))
        .and_where(Expr::col(col_of(&tm, Col::DisabledTs)).is_null())
        .and_where(entity_visibility(schema, tenant, col_of(&a, Col::Id)))
        .and_where(tag_visibility(schema, tenant, col_of(&tm, Col::Value)));
    select
}

/// Active tags that declare no `lib` attribute. Such tags are invisible to every
/// filter, so tag creation should reject them.
pub fn missing_lib_tags(schema: &DbSchema) -> SelectStatement {
    let td: DynIden = Alias::new("td").into_iden();
    Query::select()
        .column(col_of(&td, Col::Id))
        .column(col_of(&td, Col::Name))
        .from_as(schema.table(StoreTable::TagDef), td.clone())
        .and_where(Expr::col(col_of(&td, Col::DisabledTs)).is_null())
        .and_where(lib_declared(schema, Expr::col(col_of(&td, Col::Id))).not())
        .to_owned()
}

/// `SELECT EXISTS (...)` for a single tag id
pub fn tag_declares_lib(schema: &DbSchema, tag_id: i64) -> SelectStatement {
    Query::select()
        .expr_as(lib_declared(schema, Expr::val(tag_id)), Alias::new("declares_lib"))
        .to_owned()
}

fn lib_declared(schema: &DbSchema, tag_id: impl Into<SimpleExpr>) -> SimpleExpr {
    let tm: DynIden = Alias::new("tm").into_iden();
    let lib: DynIden = Alias::new("lib").into_iden();
    Expr::exists(
        Query::select()
            .expr(Expr::val(1))
            .from_as(schema.table(StoreTable::TagMeta), tm.clone())
            .from_as(schema.table(StoreTable::TagDef), lib.clone())
            .and_where(Expr::col(col_of(&lib, Col::Name)).eq(LIB_ATTRIBUTE))
            .and_where(Expr::col(col_of(&tm, Col::Attribute)).equals(col_of(&lib, Col::Id)))
            .and_where(Expr::col(col_of(&tm, Col::TagId)).eq(tag_id))
            .and_where(Expr::col(col_of(&tm, Col::DisabledTs)).is_null())
            .to_owned(),
    )
}

#[cfg(test)]
mod test {
    use sea_query::{BinOper, PostgresQueryBuilder, Query, UnOper};

    use super::*;

    fn render(expr: SimpleExpr) -> String {
        Query::select().expr(expr).to_string(PostgresQueryBuilder)
    }

    fn facts() -> SelectStatement {
        Query::select()
            .column(Alias::new("id"))
            .column(Alias::new("tag_id"))
            .from(Alias::new("facts"))
            .to_owned()
    }

    #[test]
    fn test_entity_visibility() {
        let schema = DbSchema::new("core");
        let sql = render(entity_visibility(&schema, Tenant::new(1, 7), (Alias::new("a"), Alias::new("id"))));
        assert!(sql.contains(r#"FROM "core"."org_entity_permission" AS "oep" WHERE "oep"."org_id" = 1"#), "{sql}");
        assert!(sql.contains(r#""oep"."entity_id" = "a"."id""#), "{sql}");
        assert!(sql.contains(r#"FROM "core"."user_entity_add_permission" AS "ueap" WHERE "ueap"."user_id" = 7"#), "{sql}");
        assert!(sql.contains(r#"FROM "core"."user_entity_rev_permission" AS "uerp" WHERE "uerp"."user_id" = 7"#), "{sql}");
        assert_eq!(sql.matches("EXISTS").count(), 3, "{sql}");
        assert_eq!(sql.matches("NOT ").count(), 1, "{sql}");
    }

    #[test]
    fn test_revoke_dominates_both_grants() {
        // `(org OR add) AND NOT revoke`, never `org OR (add AND NOT revoke)`
        let schema = DbSchema::new("core");
        match entity_visibility(&schema, Tenant::new(1, 7), (Alias::new("a"), Alias::new("id"))) {
            SimpleExpr::Binary(grants, BinOper::And, revoke) => {
                assert!(matches!(*grants, SimpleExpr::Binary(_, BinOper::Or, _)));
                assert!(matches!(*revoke, SimpleExpr::Unary(UnOper::Not, _)));
                assert!(render(*revoke).contains("user_entity_rev_permission"));
            }
            other => panic!("unexpected visibility shape {other:?}"),
        }
    }

    #[test]
    fn test_tag_visibility_uses_library() {
        let schema = DbSchema::new("core");
        let sql = secure(facts(), &[], "org_1_values", &schema, Tenant::new(1, 7)).to_string(PostgresQueryBuilder);
        assert!(sql.starts_with(r#"SELECT "a"."id", 'org_1_values' AS "value_table" FROM (SELECT "id", "tag_id" FROM "facts") AS "a", "core"."tag_meta" AS "tm", "core"."tag_def" AS "lib""#), "{sql}");
        assert!(sql.contains(r#""lib"."name" = 'lib'"#), "{sql}");
        assert!(sql.contains(r#""tm"."tag_id" = "a"."tag_id""#), "{sql}");
        assert!(sql.contains(r#""otp"."tag_id" = "tm"."value""#), "{sql}");
        assert!(sql.contains(r#""utrp"."tag_id" = "tm"."value""#), "{sql}");
        assert!(sql.contains(r#""oep"."entity_id" = "a"."id""#), "{sql}");
    }

    #[test]
    fn test_secure_projects_columns() {
        let schema = DbSchema::new("core");
        let sql = secure(facts(), &[Col::TagId, Col::ValueN], "t", &schema, Tenant::new(1, 7))
            .to_string(PostgresQueryBuilder);
        assert!(sql.starts_with(r#"SELECT "a"."id", "a"."tag_id", "a"."value_n", 't' AS "value_table""#), "{sql}");
    }

    #[test]
    fn test_missing_lib_tags() {
        let sql = missing_lib_tags(&DbSchema::new("core")).to_string(PostgresQueryBuilder);
        assert!(sql.starts_with(r#"SELECT "td"."id", "td"."name" FROM "core"."tag_def" AS "td" WHERE"#), "{sql}");
        assert!(sql.contains("NOT "), "{sql}");
        assert!(sql.contains(r#""tm"."tag_id" = "td"."id""#), "{sql}");
    }

    #[test]
    fn test_tag_declares_lib() {
        let (sql, values) = tag_declares_lib(&DbSchema::new("core"), 12).build(PostgresQueryBuilder);
        assert!(sql.ends_with(r#" AS "declares_lib""#), "{sql}");
        assert!(values.0.contains(&12i64.into()));
        assert!(values.0.contains(&"lib".into()));
    }
}
