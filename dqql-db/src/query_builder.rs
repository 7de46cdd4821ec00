use std::convert::Infallible;
use std::fmt::Write;
use std::str::FromStr;

use miette::Diagnostic;
use sea_query::{
    Alias, CommonTableExpression, DynIden, Expr, IntoIden, JoinType, PostgresQueryBuilder, Query,
    QueryBuilder, SelectStatement, SimpleExpr, SqlWriter, SqlWriterValues, Values,
};
use smol_str::SmolStr;
use thiserror::Error;

use crate::ast::Filter;
use crate::config::CompilerConfig;
use crate::expr_to_query::{compile_filter, CompileContext, CompileError, CompiledFilter};
use crate::name_query::entity_alias;
use crate::parser::{parse, ParseError};
use crate::security::{secure, Tenant};
use crate::sql_common::{col_of, Col, StoreTable, FACT_COLUMNS};

/// Which facts of a matched entity the query returns besides its id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TagProjection {
    /// Entity ids only, one row per entity
    #[default]
    None,
    /// Every active fact
    All,
    /// Active facts whose tag name is listed
    Only(Vec<SmolStr>),
}

impl TagProjection {
    /// A list containing `*` projects everything, an empty one nothing
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        let names: Vec<SmolStr> = names.into_iter().map(Into::into).collect();
        if names.iter().any(|n| n == "*") {
            TagProjection::All
        } else if names.is_empty() {
            TagProjection::None
        } else {
            TagProjection::Only(names)
        }
    }

    /// Grouping columns added to the output
    pub fn columns(&self) -> &'static [Col] {
        match self {
            TagProjection::None => &[],
            TagProjection::All | TagProjection::Only(_) => &FACT_COLUMNS,
        }
    }
}

/// Comma separated tag names, `*` for all
impl FromStr for TagProjection {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(TagProjection::from_names(
            s.split(',').map(str::trim).filter(|n| !n.is_empty()),
        ))
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum QueryBuilderError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),
    #[error("no value table is registered for organization {0}")]
    #[diagnostic(code(dqql::unknown_organization))]
    UnknownOrganization(i64),
}

/// Coarse classification of a failed compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Type,
    UnsupportedPath,
    UnknownOperator,
    UnknownOrganization,
}

impl QueryBuilderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryBuilderError::Parse(ParseError::Syntax { .. }) => ErrorKind::Syntax,
            QueryBuilderError::Parse(ParseError::UnknownOperator { .. }) => ErrorKind::UnknownOperator,
            QueryBuilderError::Parse(ParseError::UnsupportedPath { .. }) => ErrorKind::UnsupportedPath,
            QueryBuilderError::Compile(CompileError::Type(_)) => ErrorKind::Type,
            QueryBuilderError::Compile(CompileError::UnsupportedPath { .. }) => ErrorKind::UnsupportedPath,
            QueryBuilderError::UnknownOrganization(_) => ErrorKind::UnknownOrganization,
        }
    }
}

type Result<T> = std::result::Result<T, QueryBuilderError>;

/// A compiled filter, ready to be rendered
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    headers: Vec<CommonTableExpression>,
    select: SelectStatement,
    columns: Vec<SmolStr>,
}

impl CompiledQuery {
    /// Output column names in select order
    pub fn columns(&self) -> &[SmolStr] {
        &self.columns
    }

    /// The outermost select, without the hierarchy CTEs
    pub fn get_select_statement(&self) -> &SelectStatement {
        &self.select
    }

    /// Hierarchy CTEs in alias order, empty when the filter needs no ancestors
    pub fn headers(&self) -> &[CommonTableExpression] {
        &self.headers
    }

    /// Render with `$n` placeholders and the values to bind to them
    pub fn build_with<T: QueryBuilder>(&self, builder: T) -> (String, Values) {
        let (placeholder, numbered) = builder.placeholder();
        let mut sql = SqlWriterValues::new(placeholder, numbered);
        self.write_into(&builder, &mut sql);
        sql.into_parts()
    }

    pub fn build(&self) -> (String, Values) {
        self.build_with(PostgresQueryBuilder)
    }

    /// Render with every value inlined
    pub fn to_string<T: QueryBuilder>(&self, builder: T) -> String {
        let mut sql = String::with_capacity(1024);
        self.write_into(&builder, &mut sql);
        sql
    }

    pub fn to_string_postgres(&self) -> String {
        self.to_string(PostgresQueryBuilder)
    }

    /// `WITH RECURSIVE h1 (..) AS (..), h2 (..) AS (..) SELECT ...`
    ///
    /// sea-query renders a recursive `WITH` of a single CTE only, so the prefix is written one
    /// header at a time into the writer the select goes to. Placeholders stay numbered across
    /// the whole statement.
    fn write_into(&self, builder: &dyn QueryBuilder, sql: &mut dyn SqlWriter) {
        if !self.headers.is_empty() {
            // in-memory writers never fail
            let _ = sql.write_str("WITH RECURSIVE ");
            for (i, header) in self.headers.iter().enumerate() {
                if i > 0 {
                    let _ = sql.write_str(", ");
                }
                builder.prepare_with_query_clause_common_table(header, sql);
            }
        }
        self.select.build_collect_any_into(builder, sql);
    }
}

/// Compiles filter expressions into entity queries for one deployment
#[derive(Debug, Clone, Copy)]
pub struct FilterQueryBuilder<'c> {
    config: &'c CompilerConfig,
}

impl<'c> FilterQueryBuilder<'c> {
    pub fn new(config: &'c CompilerConfig) -> Self {
        FilterQueryBuilder { config }
    }

    pub fn compile(&self, filter: &str, tenant: Tenant, projection: &TagProjection) -> Result<CompiledQuery> {
        let filter = parse(filter)?;
        self.compile_parsed(&filter, tenant, projection)
    }

    /// Compile an already parsed filter. The visibility layer is always applied.
    pub fn compile_parsed(
        &self,
        filter: &Filter,
        tenant: Tenant,
        projection: &TagProjection,
    ) -> Result<CompiledQuery> {
        let value_table = self
            .config
            .registry
            .get(tenant.org_id)
            .ok_or(QueryBuilderError::UnknownOrganization(tenant.org_id))?;
        let ctx = CompileContext::new(&self.config.schema, self.config.ancestors);
        let CompiledFilter { headers, predicate, aliases } = compile_filter(filter, &ctx)?;

        tracing::debug!(
            %filter,
            org_id = tenant.org_id,
            user_id = tenant.user_id,
            aliases = aliases.allocated(),
            tag_uses = filter.tag_uses(),
            headers = headers.len(),
            "compiled filter"
        );

        let columns = projection.columns();
        let facts = self.facts_of(self.matched_entities(predicate), projection);
        let secured = secure(facts, columns, value_table.name.as_str(), &self.config.schema, tenant);
        let (select, output) = group_per_entity(secured, columns);

        Ok(CompiledQuery { headers, select, columns: output })
    }

    /// `SELECT e.id FROM entity e WHERE <active> AND <predicate>`
    fn matched_entities(&self, predicate: SimpleExpr) -> SelectStatement {
        let e = entity_alias();
        Query::select()
            .column(col_of(&e, Col::Id))
            .from_as(self.config.schema.table(StoreTable::Entity), e.clone())
            .and_where(Expr::col(col_of(&e, Col::DisabledTs)).is_null())
            .and_where(predicate)
            .to_owned()
    }

    /// Active facts of the matched entities, as `id`, `tag_id` and the projected value columns.
    /// `tag_id` is always there: the visibility layer checks the fact's tag.
    fn facts_of(&self, entities: SelectStatement, projection: &TagProjection) -> SelectStatement {
        let schema = &self.config.schema;
        let et: DynIden = Alias::new("et").into_iden();
        let td: DynIden = Alias::new("td").into_iden();

        let mut facts = Query::select();
        facts
            .expr_as(Expr::col(col_of(&et, Col::EntityId)), Alias::new("id"))
            .column(col_of(&et, Col::TagId));
        for col in projection.columns().iter().filter(|c| **c != Col::TagId) {
            facts.column(col_of(&et, *col));
        }
        facts
            .from_as(schema.table(StoreTable::EntityTag), et.clone())
            .join_as(
                JoinType::InnerJoin,
                schema.table(StoreTable::TagDef),
                td.clone(),
                Expr::col(col_of(&et, Col::TagId)).equals(col_of(&td, Col::Id)),
            )
            .and_where(Expr::col(col_of(&et, Col::EntityId)).in_subquery(entities))
            .and_where(Expr::col(col_of(&et, Col::DisabledTs)).is_null());
        if let TagProjection::Only(names) = projection {
            facts.and_where(Expr::col(col_of(&td, Col::Name)).is_in(names.iter().map(SmolStr::as_str)));
        }
        facts
    }
}

/// `SELECT root.id AS entity_id, root.<cols>, root.value_table FROM (<secured>) root GROUP BY ...`
fn group_per_entity(secured: SelectStatement, columns: &[Col]) -> (SelectStatement, Vec<SmolStr>) {
    let root: DynIden = Alias::new("root").into_iden();
    let value_table = Alias::new("value_table");

    let mut output = vec![SmolStr::new_inline("entity_id")];
    let mut select = Query::select();
    select.expr_as(Expr::col(col_of(&root, Col::Id)), Alias::new("entity_id"));
    for col in columns {
        select.column(col_of(&root, *col));
        output.push(SmolStr::new_inline(col.as_str()));
    }
    select
        .column((root.clone(), value_table.clone()))
        .from_subquery(secured, root.clone())
        .group_by_col(col_of(&root, Col::Id));
    for col in columns {
        select.group_by_col(col_of(&root, *col));
    }
    select.group_by_col((root, value_table));
    output.push(SmolStr::new_inline("value_table"));
    (select, output)
}
