//! Small additions to the sea_query crate used while assembling filter queries.

use sea_query::{
    extension::postgres::PgBinOper, Alias, BinOper, ColumnRef, DynIden, Func, IntoIden,
    IntoTableRef, SimpleExpr, TableRef,
};

/// Unlike TableRef, this contains only types that can be adjoined to a column to produce a ColumnRef
#[derive(Debug, Clone, PartialEq)]
pub enum StaticTableRef {
    /// A table reference based on an indentifier
    Table(DynIden),
    /// A table reference based on a schema and an identifier
    SchemaTable(DynIden, DynIden),
}

impl IntoTableRef for StaticTableRef {
    fn into_table_ref(self) -> TableRef {
        match self {
            StaticTableRef::Table(t) => TableRef::Table(t),
            StaticTableRef::SchemaTable(s, t) => TableRef::SchemaTable(s, t),
        }
    }
}

impl StaticTableRef {
    /// Append the column to this table reference to create a fully expanded column reference
    pub fn with_column(self, col: impl IntoIden) -> ColumnRef {
        match self {
            StaticTableRef::Table(t) => ColumnRef::TableColumn(t, col.into_iden()),
            StaticTableRef::SchemaTable(s, t) => {
                ColumnRef::SchemaTableColumn(s, t, col.into_iden())
            }
        }
    }
}

/// `left || right`
pub fn concat(left: impl Into<SimpleExpr>, right: impl Into<SimpleExpr>) -> SimpleExpr {
    left.into()
        .binary(BinOper::PgOperator(PgBinOper::Concatenate), right.into())
}

/// `string_agg(expr, sep)`
pub fn string_agg(expr: impl Into<SimpleExpr>, sep: &str) -> SimpleExpr {
    Func::cust(Alias::new("string_agg"))
        .arg(expr.into())
        .arg(sep)
        .into()
}

/// Wraps a `,`-joined aggregate in leading and trailing commas so that
/// membership can be tested with `LIKE '%,name,%'`.
pub fn comma_bounded(joined: SimpleExpr) -> SimpleExpr {
    concat(concat(",", joined), ",")
}

/// Pattern matching a `,`-bounded list that contains `name`
pub fn member_pattern(name: &str) -> String {
    format!("%,{},%", name)
}
